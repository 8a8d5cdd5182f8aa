//! Provisioner protocol messages.
//!
//! These are declared by hand with prost derives rather than generated from a
//! `.proto` file, so building the workspace does not need `protoc`. Field tags
//! are part of the recorded format: every `*.protobuf` entry in a replay
//! directory is one of [`ParseResponse`] or [`ProvisionResponse`] encoded with
//! these tags.

#![allow(missing_docs)]

/// Empty message, used as the Shutdown request and acknowledgment.
#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct Empty {}

/// Severity of a streamed log line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum LogLevel {
    Trace = 0,
    Debug = 1,
    Info = 2,
    Warn = 3,
    Error = 4,
}

impl LogLevel {
    /// The protocol name of this level, e.g. `"WARN"`.
    pub fn as_str_name(&self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }

    /// Look up a level by its protocol name. Names are case-sensitive.
    pub fn from_str_name(value: &str) -> Option<Self> {
        match value {
            "TRACE" => Some(Self::Trace),
            "DEBUG" => Some(Self::Debug),
            "INFO" => Some(Self::Info),
            "WARN" => Some(Self::Warn),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Lifecycle direction of the workspace build being provisioned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum WorkspaceTransition {
    Start = 0,
    Stop = 1,
    Destroy = 2,
}

impl WorkspaceTransition {
    /// All transitions, in wire order.
    pub const ALL: [Self; 3] = [Self::Start, Self::Stop, Self::Destroy];

    /// The protocol name of this transition, e.g. `"DESTROY"`.
    pub fn as_str_name(&self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::Stop => "STOP",
            Self::Destroy => "DESTROY",
        }
    }

    /// Look up a transition by its protocol name. Names are case-sensitive.
    pub fn from_str_name(value: &str) -> Option<Self> {
        match value {
            "START" => Some(Self::Start),
            "STOP" => Some(Self::Stop),
            "DESTROY" => Some(Self::Destroy),
            _ => None,
        }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Log {
    #[prost(enumeration = "LogLevel", tag = "1")]
    pub level: i32,
    #[prost(string, tag = "2")]
    pub output: ::prost::alloc::string::String,
}

// Parse

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ParseRequest {
    #[prost(string, tag = "1")]
    pub directory: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ParseComplete {
    #[prost(string, tag = "1")]
    pub error: ::prost::alloc::string::String,
    #[prost(bytes = "vec", tag = "2")]
    pub readme: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ParseResponse {
    #[prost(oneof = "parse_response::Type", tags = "1, 2")]
    pub r#type: ::core::option::Option<parse_response::Type>,
}

/// Nested message and enum types in `ParseResponse`.
pub mod parse_response {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Type {
        #[prost(message, tag = "1")]
        Log(super::Log),
        #[prost(message, tag = "2")]
        Complete(super::ParseComplete),
    }
}

// Provision

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Metadata {
    #[prost(string, tag = "1")]
    pub coder_url: ::prost::alloc::string::String,
    #[prost(enumeration = "WorkspaceTransition", tag = "2")]
    pub workspace_transition: i32,
    #[prost(string, tag = "3")]
    pub workspace_name: ::prost::alloc::string::String,
    #[prost(string, tag = "4")]
    pub workspace_owner: ::prost::alloc::string::String,
    #[prost(string, tag = "5")]
    pub workspace_id: ::prost::alloc::string::String,
    #[prost(string, tag = "6")]
    pub workspace_owner_id: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProvisionConfig {
    #[prost(string, tag = "1")]
    pub directory: ::prost::alloc::string::String,
    #[prost(bytes = "vec", tag = "2")]
    pub state: ::prost::alloc::vec::Vec<u8>,
    #[prost(message, optional, tag = "3")]
    pub metadata: ::core::option::Option<Metadata>,
    #[prost(string, tag = "4")]
    pub provisioner_log_level: ::prost::alloc::string::String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProvisionPlan {
    #[prost(message, optional, tag = "1")]
    pub config: ::core::option::Option<ProvisionConfig>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProvisionApply {
    #[prost(message, optional, tag = "1")]
    pub config: ::core::option::Option<ProvisionConfig>,
    #[prost(bytes = "vec", tag = "2")]
    pub plan: ::prost::alloc::vec::Vec<u8>,
}

#[derive(Clone, Copy, PartialEq, ::prost::Message)]
pub struct ProvisionCancel {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProvisionRequest {
    #[prost(oneof = "provision_request::Type", tags = "1, 2, 3")]
    pub r#type: ::core::option::Option<provision_request::Type>,
}

/// Nested message and enum types in `ProvisionRequest`.
pub mod provision_request {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Type {
        #[prost(message, tag = "1")]
        Plan(super::ProvisionPlan),
        #[prost(message, tag = "2")]
        Apply(super::ProvisionApply),
        #[prost(message, tag = "3")]
        Cancel(super::ProvisionCancel),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Agent {
    #[prost(string, tag = "1")]
    pub id: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub name: ::prost::alloc::string::String,
    #[prost(oneof = "agent::Auth", tags = "3, 4")]
    pub auth: ::core::option::Option<agent::Auth>,
}

/// Nested message and enum types in `Agent`.
pub mod agent {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Auth {
        #[prost(string, tag = "3")]
        Token(::prost::alloc::string::String),
        #[prost(string, tag = "4")]
        InstanceId(::prost::alloc::string::String),
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Resource {
    #[prost(string, tag = "1")]
    pub name: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub r#type: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "3")]
    pub agents: ::prost::alloc::vec::Vec<Agent>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProvisionComplete {
    #[prost(bytes = "vec", tag = "1")]
    pub state: ::prost::alloc::vec::Vec<u8>,
    #[prost(string, tag = "2")]
    pub error: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "3")]
    pub resources: ::prost::alloc::vec::Vec<Resource>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ProvisionResponse {
    #[prost(oneof = "provision_response::Type", tags = "1, 2")]
    pub r#type: ::core::option::Option<provision_response::Type>,
}

/// Nested message and enum types in `ProvisionResponse`.
pub mod provision_response {
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum Type {
        #[prost(message, tag = "1")]
        Log(super::Log),
        #[prost(message, tag = "2")]
        Complete(super::ProvisionComplete),
    }
}

impl ProvisionRequest {
    /// The config carried by a plan or apply request.
    ///
    /// Returns `None` for anything else (a cancel, or an empty request).
    pub fn config(&self) -> Option<&ProvisionConfig> {
        match &self.r#type {
            Some(provision_request::Type::Plan(plan)) => plan.config.as_ref(),
            Some(provision_request::Type::Apply(apply)) => apply.config.as_ref(),
            _ => None,
        }
    }
}

impl ProvisionConfig {
    /// The transition this config provisions for.
    ///
    /// A config without metadata, or with an out-of-range value, reads as
    /// the enum's zero value (`START`).
    pub fn transition(&self) -> WorkspaceTransition {
        self.metadata
            .as_ref()
            .and_then(|m| WorkspaceTransition::try_from(m.workspace_transition).ok())
            .unwrap_or(WorkspaceTransition::Start)
    }
}

/// A response type that can be recorded to, and replayed from, storage.
///
/// Replay never looks inside a recorded message except to find out whether
/// it is a log line and, if so, at which level.
pub trait RecordedMessage: ::prost::Message + Default + Send + 'static {
    /// The raw severity if this response is a log line.
    fn log_level(&self) -> Option<i32>;
}

impl RecordedMessage for ParseResponse {
    fn log_level(&self) -> Option<i32> {
        match &self.r#type {
            Some(parse_response::Type::Log(log)) => Some(log.level),
            _ => None,
        }
    }
}

impl RecordedMessage for ProvisionResponse {
    fn log_level(&self) -> Option<i32> {
        match &self.r#type {
            Some(provision_response::Type::Log(log)) => Some(log.level),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_defaults_to_start_without_metadata() {
        let config = ProvisionConfig::default();
        assert_eq!(config.transition(), WorkspaceTransition::Start);

        let config = ProvisionConfig {
            metadata: Some(Metadata {
                workspace_transition: WorkspaceTransition::Destroy.into(),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(config.transition(), WorkspaceTransition::Destroy);
    }

    #[test]
    fn cancel_request_has_no_config() {
        let request = ProvisionRequest {
            r#type: Some(provision_request::Type::Cancel(ProvisionCancel {})),
        };
        assert!(request.config().is_none());
    }

    #[test]
    fn level_names_round_trip() {
        for level in [
            LogLevel::Trace,
            LogLevel::Debug,
            LogLevel::Info,
            LogLevel::Warn,
            LogLevel::Error,
        ] {
            assert_eq!(LogLevel::from_str_name(level.as_str_name()), Some(level));
        }
        assert_eq!(LogLevel::from_str_name("warn"), None);
    }
}
