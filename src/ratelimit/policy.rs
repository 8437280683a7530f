//! Store interaction modes and failure policies for the window limiter.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How the limiter talks to the counter store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsistencyMode {
    /// Read the count, then create or increment in a second call.
    ///
    /// Concurrent requests for the same identity may both pass the read and
    /// admit slightly more than the limit.
    #[default]
    ReadThenWrite,
    /// A single conditional create-or-increment executed atomically by the store.
    Atomic,
}

/// What `check_and_consume` yields when the counter store fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Surface the store error to the caller.
    #[default]
    Error,
    /// Fail open: admit the request.
    Allow,
    /// Fail closed: reject the request.
    Deny,
}

impl FromStr for ConsistencyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read_then_write" | "read-then-write" => Ok(ConsistencyMode::ReadThenWrite),
            "atomic" => Ok(ConsistencyMode::Atomic),
            other => Err(format!(
                "unknown consistency mode '{}', expected read_then_write or atomic",
                other
            )),
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "error" => Ok(FailurePolicy::Error),
            "allow" => Ok(FailurePolicy::Allow),
            "deny" => Ok(FailurePolicy::Deny),
            other => Err(format!(
                "unknown failure policy '{}', expected error, allow or deny",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        assert_eq!(ConsistencyMode::default(), ConsistencyMode::ReadThenWrite);
        assert_eq!(FailurePolicy::default(), FailurePolicy::Error);
    }

    #[test]
    fn test_snake_case_names() {
        let mode: ConsistencyMode = serde_yaml::from_str("read_then_write").unwrap();
        assert_eq!(mode, ConsistencyMode::ReadThenWrite);
        let mode: ConsistencyMode = serde_yaml::from_str("atomic").unwrap();
        assert_eq!(mode, ConsistencyMode::Atomic);

        let policy: FailurePolicy = serde_yaml::from_str("deny").unwrap();
        assert_eq!(policy, FailurePolicy::Deny);
        assert!(serde_yaml::from_str::<FailurePolicy>("maybe").is_err());
    }

    #[test]
    fn test_from_str() {
        assert_eq!("read-then-write".parse::<ConsistencyMode>(), Ok(ConsistencyMode::ReadThenWrite));
        assert_eq!("atomic".parse::<ConsistencyMode>(), Ok(ConsistencyMode::Atomic));
        assert!("eventual".parse::<ConsistencyMode>().is_err());

        assert_eq!("allow".parse::<FailurePolicy>(), Ok(FailurePolicy::Allow));
        assert_eq!("error".parse::<FailurePolicy>(), Ok(FailurePolicy::Error));
        assert!("open".parse::<FailurePolicy>().is_err());
    }
}
