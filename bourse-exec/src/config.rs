//! Matching configuration.

use bourse_engine::EqualPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What an order settles against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchingMode {
    /// Buys draw from exchange inventory, sells liquidate into it
    #[default]
    Inventory,
    /// Orders settle against a complementary opposite-side order
    OrderToOrder,
}

impl MatchingMode {
    /// Config code
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchingMode::Inventory => "inventory",
            MatchingMode::OrderToOrder => "order_to_order",
        }
    }
}

impl FromStr for MatchingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "inventory" => Ok(MatchingMode::Inventory),
            "order_to_order" | "order-to-order" => Ok(MatchingMode::OrderToOrder),
            other => Err(format!("unknown matching mode '{}'", other)),
        }
    }
}

impl fmt::Display for MatchingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Matching behaviour shared by the finder, executor and passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// Counterparty source
    pub mode: MatchingMode,
    /// Evaluation of the `Equal` condition
    pub equal_policy: EqualPolicy,
}

impl MatchingConfig {
    /// Inventory matching
    pub fn inventory() -> Self {
        Self { mode: MatchingMode::Inventory, ..Default::default() }
    }

    /// Order-to-order matching
    pub fn order_to_order() -> Self {
        Self { mode: MatchingMode::OrderToOrder, ..Default::default() }
    }

    /// Replace the `Equal` policy
    pub fn with_equal_policy(mut self, equal_policy: EqualPolicy) -> Self {
        self.equal_policy = equal_policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MatchingConfig::default();
        assert_eq!(config.mode, MatchingMode::Inventory);
        assert_eq!(config.equal_policy, EqualPolicy::AtOrAbove);
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("order_to_order".parse::<MatchingMode>().unwrap(), MatchingMode::OrderToOrder);
        assert_eq!("Inventory".parse::<MatchingMode>().unwrap(), MatchingMode::Inventory);
        assert!("book".parse::<MatchingMode>().is_err());
    }
}
