//! Lifecycle actions on an existing instance

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Action to perform on a provisioned instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InstanceAction {
    /// Power on a stopped instance
    Start,
    /// Power off a running instance
    Stop,
    /// Permanently delete the instance
    Terminate,
}

impl InstanceAction {
    /// Provider-side action name
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceAction::Start => "START",
            InstanceAction::Stop => "STOP",
            InstanceAction::Terminate => "TERMINATE",
        }
    }
}

impl std::fmt::Display for InstanceAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceAction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "START" => Ok(InstanceAction::Start),
            "STOP" => Ok(InstanceAction::Stop),
            "TERMINATE" => Ok(InstanceAction::Terminate),
            other => Err(format!("unknown instance action: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_action_case_insensitive() {
        assert_eq!("start".parse::<InstanceAction>(), Ok(InstanceAction::Start));
        assert_eq!(" Stop ".parse::<InstanceAction>(), Ok(InstanceAction::Stop));
        assert_eq!(
            "TERMINATE".parse::<InstanceAction>(),
            Ok(InstanceAction::Terminate)
        );
        assert!("reboot".parse::<InstanceAction>().is_err());
    }
}
