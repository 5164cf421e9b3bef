//! Matching predicate evaluation.
//!
//! Decides whether an order is executable at a reference price, and whether
//! two opposite-side orders are complementary.

use bourse_domain::{ActivationCondition, Order, OrderKind, Price, Quantity};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// =============================================================================
// Equal Policy
// =============================================================================

/// How the `Equal` activation condition is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EqualPolicy {
    /// `Equal` fires while the limit is at or above the reference (legacy behaviour)
    #[default]
    AtOrAbove,
    /// `Equal` requires the limit price to equal the reference price
    Exact,
}

impl EqualPolicy {
    /// Config code
    pub fn as_str(&self) -> &'static str {
        match self {
            EqualPolicy::AtOrAbove => "at_or_above",
            EqualPolicy::Exact => "exact",
        }
    }
}

impl FromStr for EqualPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "at_or_above" => Ok(EqualPolicy::AtOrAbove),
            "exact" => Ok(EqualPolicy::Exact),
            other => Err(format!("unknown equal policy '{}'", other)),
        }
    }
}

impl fmt::Display for EqualPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Counter Liquidity
// =============================================================================

/// Quantity available on the other side of a prospective trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterLiquidity {
    /// No upper bound (sells liquidating into exchange inventory)
    Unbounded,
    /// At most this many units
    Finite(u64),
}

impl CounterLiquidity {
    /// Check if `quantity` units can be absorbed
    pub fn covers(&self, quantity: Quantity) -> bool {
        match self {
            CounterLiquidity::Unbounded => true,
            CounterLiquidity::Finite(available) => quantity.get() <= *available,
        }
    }

    /// Whether anything at all is available
    pub fn is_positive(&self) -> bool {
        match self {
            CounterLiquidity::Unbounded => true,
            CounterLiquidity::Finite(available) => *available > 0,
        }
    }
}

// =============================================================================
// Evaluator
// =============================================================================

/// Evaluate an activation condition of `limit_price` against `reference`.
///
/// The condition names where the reference price must stand relative to the
/// limit: `GreaterOrEqual` at 20 fires once the reference reaches 20.
/// `Equal` under `AtOrAbove` fires while the limit is at or above the
/// reference.
pub fn condition_holds(
    condition: ActivationCondition,
    limit_price: Price,
    reference: Price,
    policy: EqualPolicy,
) -> bool {
    let limit = limit_price.as_decimal();
    let reference = reference.as_decimal();
    match condition {
        ActivationCondition::GreaterOrEqual => reference >= limit,
        ActivationCondition::LessOrEqual => reference <= limit,
        ActivationCondition::GreaterThan => reference > limit,
        ActivationCondition::LessThan => reference < limit,
        ActivationCondition::Equal => match policy {
            EqualPolicy::AtOrAbove => limit >= reference,
            EqualPolicy::Exact => limit == reference,
        },
    }
}

/// Matching predicate evaluator.
#[derive(Debug, Clone, Copy, Default)]
pub struct Evaluator {
    policy: EqualPolicy,
}

impl Evaluator {
    /// Create an evaluator with the given `Equal` policy
    pub fn new(policy: EqualPolicy) -> Self {
        Self { policy }
    }

    /// The configured `Equal` policy
    pub fn policy(&self) -> EqualPolicy {
        self.policy
    }

    /// Price test only: market orders always pass, limit orders pass when
    /// their activation condition holds.
    pub fn price_test(&self, order: &Order, reference: Price) -> bool {
        match order.kind {
            OrderKind::Market => true,
            OrderKind::Limit { limit_price, condition } => {
                condition_holds(condition, limit_price, reference, self.policy)
            },
        }
    }

    /// Check if `order` can execute now.
    ///
    /// Requires an active order, enough counter liquidity, and a passing
    /// price test.
    pub fn is_executable(
        &self,
        order: &Order,
        reference: Price,
        liquidity: CounterLiquidity,
    ) -> bool {
        order.is_active() && liquidity.covers(order.quantity) && self.price_test(order, reference)
    }

    /// Check if `counter` can settle against `subject` in one trade.
    ///
    /// Both must be active, opposite sides, same investment, equal quantity,
    /// and from different portfolios. Two limit orders must carry mirrored
    /// conditions that both hold at `reference`. When either side is a
    /// market order, the other side only needs its own price test to pass.
    pub fn are_complementary(&self, subject: &Order, counter: &Order, reference: Price) -> bool {
        if !subject.is_active() || !counter.is_active() {
            return false;
        }
        if subject.side == counter.side
            || subject.investment_id != counter.investment_id
            || subject.quantity != counter.quantity
            || subject.portfolio_id == counter.portfolio_id
        {
            return false;
        }

        match (subject.condition(), counter.condition()) {
            (Some(mine), Some(theirs)) => {
                theirs == mine.mirror()
                    && self.price_test(subject, reference)
                    && self.price_test(counter, reference)
            },
            _ => self.price_test(subject, reference) && self.price_test(counter, reference),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
