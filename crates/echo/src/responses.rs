//! Ready-made response sequences for common test scenarios.

use crate::proto::{
    Agent, ParseComplete, ParseResponse, ProvisionComplete, ProvisionResponse, Resource, agent,
    parse_response, provision_response,
};

/// An empty parse completion.
pub fn parse_complete() -> Vec<ParseResponse> {
    vec![ParseResponse {
        r#type: Some(parse_response::Type::Complete(ParseComplete::default())),
    }]
}

/// An empty provision completion.
pub fn provision_complete() -> Vec<ProvisionResponse> {
    vec![ProvisionResponse {
        r#type: Some(provision_response::Type::Complete(
            ProvisionComplete::default(),
        )),
    }]
}

/// A provision that completes with an error.
pub fn provision_failed() -> Vec<ProvisionResponse> {
    vec![ProvisionResponse {
        r#type: Some(provision_response::Type::Complete(ProvisionComplete {
            error: "failed!".to_string(),
            ..Default::default()
        })),
    }]
}

/// A provision that creates a fake `aws_instance` with one agent
/// authenticated by `auth_token`.
pub fn provision_apply_with_agent(auth_token: &str) -> Vec<ProvisionResponse> {
    vec![ProvisionResponse {
        r#type: Some(provision_response::Type::Complete(ProvisionComplete {
            resources: vec![Resource {
                name: "example".to_string(),
                r#type: "aws_instance".to_string(),
                agents: vec![Agent {
                    id: uuid::Uuid::new_v4().to_string(),
                    name: "example".to_string(),
                    auth: Some(agent::Auth::Token(auth_token.to_string())),
                }],
            }],
            ..Default::default()
        })),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_gets_token_and_fresh_id() {
        let first = provision_apply_with_agent("secret");
        let second = provision_apply_with_agent("secret");

        let agent_of = |responses: &[ProvisionResponse]| match &responses[0].r#type {
            Some(provision_response::Type::Complete(complete)) => {
                complete.resources[0].agents[0].clone()
            }
            other => panic!("unexpected response: {other:?}"),
        };
        let a = agent_of(&first);
        let b = agent_of(&second);
        assert_eq!(a.auth, Some(agent::Auth::Token("secret".to_string())));
        assert_ne!(a.id, b.id);
        assert!(uuid::Uuid::parse_str(&a.id).is_ok());
    }

    #[test]
    fn failed_carries_error() {
        match &provision_failed()[0].r#type {
            Some(provision_response::Type::Complete(complete)) => {
                assert_eq!(complete.error, "failed!");
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }
}
