//! 802.1D port states.

use crate::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The five 802.1D port states.
///
/// `Disabled` means the port is not operationally up; the remaining four are
/// the classic spanning tree progression. The string forms are the ones
/// published to the state database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PortState {
    #[default]
    Disabled,
    Blocking,
    Listening,
    Learning,
    Forwarding,
}

impl PortState {
    /// Database string form.
    pub const fn as_str(&self) -> &'static str {
        match self {
            PortState::Disabled => "DISABLED",
            PortState::Blocking => "BLOCKING",
            PortState::Listening => "LISTENING",
            PortState::Learning => "LEARNING",
            PortState::Forwarding => "FORWARDING",
        }
    }

    /// True for the states in which the kernel bridge port must forward.
    pub const fn is_forwarding(&self) -> bool {
        matches!(self, PortState::Forwarding)
    }
}

impl fmt::Display for PortState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PortState {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DISABLED" => Ok(PortState::Disabled),
            "BLOCKING" => Ok(PortState::Blocking),
            "LISTENING" => Ok(PortState::Listening),
            "LEARNING" => Ok(PortState::Learning),
            "FORWARDING" => Ok(PortState::Forwarding),
            _ => Err(ParseError::InvalidPortState(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_round_trip_strings() {
        for state in [
            PortState::Disabled,
            PortState::Blocking,
            PortState::Listening,
            PortState::Learning,
            PortState::Forwarding,
        ] {
            assert_eq!(state.as_str().parse::<PortState>().unwrap(), state);
        }
    }

    #[test]
    fn test_only_forwarding_forwards() {
        assert!(PortState::Forwarding.is_forwarding());
        assert!(!PortState::Learning.is_forwarding());
        assert!(!PortState::Blocking.is_forwarding());
    }
}
