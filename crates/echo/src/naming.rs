//! Entry naming convention shared by the archive codec and the message store.
//!
//! ```text
//! {index}.parse.protobuf
//! {index}.provision.apply.protobuf
//! {index}.provision.plan.protobuf
//! {index}.{transition}.provision.apply.protobuf
//! {index}.{transition}.provision.plan.protobuf
//! ```
//!
//! `{transition}` is the lower-cased protocol name (`start`, `stop`,
//! `destroy`). Parsing accepts any case.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::proto::WorkspaceTransition;

const SUFFIX: &str = ".protobuf";

/// The independent response sequences a directory can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Responses to a Parse call
    Parse,
    /// Responses to a Provision call opened with an apply request
    Apply,
    /// Responses to a Provision call opened with a plan request
    Plan,
}

impl Operation {
    fn stem(self) -> &'static str {
        match self {
            Self::Parse => "parse",
            Self::Apply => "provision.apply",
            Self::Plan => "provision.plan",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.stem())
    }
}

/// Name of a single recorded response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryName {
    /// Which sequence the entry belongs to
    pub operation: Operation,
    /// Transition override, `None` for the default sequence
    pub transition: Option<WorkspaceTransition>,
    /// Position in the sequence, starting at 0
    pub index: usize,
}

impl EntryName {
    /// Name of a parse response.
    pub fn parse(index: usize) -> Self {
        Self {
            operation: Operation::Parse,
            transition: None,
            index,
        }
    }

    /// Name of a default (transition-independent) provision response.
    pub fn provision(operation: Operation, index: usize) -> Self {
        Self {
            operation,
            transition: None,
            index,
        }
    }

    /// Name of a transition-specific provision response.
    pub fn transition(
        operation: Operation,
        transition: WorkspaceTransition,
        index: usize,
    ) -> Self {
        Self {
            operation,
            transition: Some(transition),
            index,
        }
    }
}

impl fmt::Display for EntryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.", self.index)?;
        if let Some(transition) = self.transition {
            write!(f, "{}.", transition.as_str_name().to_ascii_lowercase())?;
        }
        write!(f, "{}{SUFFIX}", self.operation)
    }
}

/// Error returned when a name does not follow the entry naming convention.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("not a recorded response name: {0:?}")]
pub struct InvalidName(pub String);

impl FromStr for EntryName {
    type Err = InvalidName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidName(s.to_string());

        let rest = s.strip_suffix(SUFFIX).ok_or_else(invalid)?;
        let (index, rest) = rest.split_once('.').ok_or_else(invalid)?;
        if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let index = index.parse().map_err(|_| invalid())?;

        if rest == Operation::Parse.stem() {
            return Ok(Self::parse(index));
        }

        let (transition, stem) = match rest.split_once(".provision.") {
            Some((transition, op)) => {
                let transition =
                    WorkspaceTransition::from_str_name(&transition.to_ascii_uppercase())
                        .ok_or_else(invalid)?;
                (Some(transition), op)
            }
            None => (None, rest.strip_prefix("provision.").ok_or_else(invalid)?),
        };
        let operation = match stem {
            "apply" => Operation::Apply,
            "plan" => Operation::Plan,
            _ => return Err(invalid()),
        };
        Ok(Self {
            operation,
            transition,
            index,
        })
    }
}

/// Join a request directory with an entry name.
pub fn entry_path(directory: &str, name: &EntryName) -> String {
    file_path(directory, &name.to_string())
}

/// Join a request directory with a file name as listed.
pub(crate) fn file_path(directory: &str, file_name: &str) -> String {
    if directory.is_empty() {
        file_name.to_string()
    } else {
        format!("{}/{file_name}", directory.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_names() {
        assert_eq!(EntryName::parse(0).to_string(), "0.parse.protobuf");
        assert_eq!(
            EntryName::provision(Operation::Apply, 3).to_string(),
            "3.provision.apply.protobuf"
        );
        assert_eq!(
            EntryName::transition(Operation::Plan, WorkspaceTransition::Destroy, 1).to_string(),
            "1.destroy.provision.plan.protobuf"
        );
    }

    #[test]
    fn parses_names() {
        assert_eq!(
            "12.parse.protobuf".parse::<EntryName>(),
            Ok(EntryName::parse(12))
        );
        assert_eq!(
            "0.provision.plan.protobuf".parse::<EntryName>(),
            Ok(EntryName::provision(Operation::Plan, 0))
        );
        assert_eq!(
            "2.STOP.provision.apply.protobuf".parse::<EntryName>(),
            Ok(EntryName::transition(
                Operation::Apply,
                WorkspaceTransition::Stop,
                2
            ))
        );
    }

    #[test]
    fn rejects_foreign_names() {
        for name in [
            "parse.protobuf",
            "x.parse.protobuf",
            "-1.parse.protobuf",
            "0.parse.json",
            "0.provision.destroy.protobuf",
            "0.restart.provision.apply.protobuf",
            "0.start.parse.protobuf",
            "README.md",
        ] {
            assert!(name.parse::<EntryName>().is_err(), "{name} should not parse");
        }
    }

    #[test]
    fn joins_paths() {
        let name = EntryName::parse(0);
        assert_eq!(entry_path("", &name), "0.parse.protobuf");
        assert_eq!(entry_path("/tmp/t/", &name), "/tmp/t/0.parse.protobuf");
        assert_eq!(entry_path("t", &name), "t/0.parse.protobuf");
    }
}
