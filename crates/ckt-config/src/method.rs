use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Implicit integration method selector.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationMethod {
    /// Trapezoidal rule (order 1 falls back to backward Euler).
    #[default]
    Trapezoidal,
    /// Variable-order Gear (backward differentiation), orders 1..=6.
    Gear,
}

impl IntegrationMethod {
    /// Highest order the method supports.
    pub fn max_order(self) -> usize {
        match self {
            IntegrationMethod::Trapezoidal => 2,
            IntegrationMethod::Gear => 6,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            IntegrationMethod::Trapezoidal => "trap",
            IntegrationMethod::Gear => "gear",
        }
    }
}

impl fmt::Display for IntegrationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IntegrationMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trap" | "trapezoidal" => Ok(IntegrationMethod::Trapezoidal),
            "gear" => Ok(IntegrationMethod::Gear),
            _ => Err(ConfigError::Method {
                name: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_known_methods() {
        assert_eq!(
            "TRAP".parse::<IntegrationMethod>().unwrap(),
            IntegrationMethod::Trapezoidal
        );
        assert_eq!(
            " gear ".parse::<IntegrationMethod>().unwrap(),
            IntegrationMethod::Gear
        );
    }

    #[test]
    fn unknown_method_is_rejected() {
        let err = "euler".parse::<IntegrationMethod>().unwrap_err();
        assert!(matches!(err, ConfigError::Method { .. }));
    }

    #[test]
    fn max_order_per_method() {
        assert_eq!(IntegrationMethod::Trapezoidal.max_order(), 2);
        assert_eq!(IntegrationMethod::Gear.max_order(), 6);
    }
}
