use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Per-leader sizing configuration: how the follower's SOL amount for a
/// replicated trade is derived from the leader's own trade amount.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum SizingRule {
    /// Always trade a fixed SOL amount, regardless of the leader's size.
    Fixed { amount_sol: Decimal },
    /// Trade a percentage of the leader's amount (0.0-100.0).
    Percentage { percent: Decimal },
    /// Mirror the leader's amount exactly.
    Mirror,
}

impl SizingRule {
    /// Computes the follower's SOL amount for a leader trade of
    /// `leader_amount_sol`, clamped to `max_position_size`.
    pub fn compute(&self, leader_amount_sol: Decimal, max_position_size: Decimal) -> Decimal {
        let raw = match self {
            SizingRule::Fixed { amount_sol } => *amount_sol,
            SizingRule::Percentage { percent } => {
                leader_amount_sol * (*percent / Decimal::ONE_HUNDRED)
            }
            SizingRule::Mirror => leader_amount_sol,
        };
        raw.min(max_position_size).max(Decimal::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn fixed_ignores_leader_amount() {
        let rule = SizingRule::Fixed {
            amount_sol: Decimal::from_str("0.25").unwrap(),
        };
        let result = rule.compute(Decimal::from_str("10").unwrap(), Decimal::from_str("5").unwrap());
        assert_eq!(result, Decimal::from_str("0.25").unwrap());
    }

    #[test]
    fn percentage_scales_leader_amount() {
        let rule = SizingRule::Percentage {
            percent: Decimal::from_str("50").unwrap(),
        };
        let result = rule.compute(Decimal::from_str("1").unwrap(), Decimal::from_str("10").unwrap());
        assert_eq!(result, Decimal::from_str("0.5").unwrap());
    }

    #[test]
    fn mirror_matches_leader_amount() {
        let rule = SizingRule::Mirror;
        let result = rule.compute(Decimal::from_str("0.5").unwrap(), Decimal::from_str("10").unwrap());
        assert_eq!(result, Decimal::from_str("0.5").unwrap());
    }

    #[test]
    fn clamps_to_max_position_size() {
        let rule = SizingRule::Mirror;
        let result = rule.compute(Decimal::from_str("5").unwrap(), Decimal::from_str("1").unwrap());
        assert_eq!(result, Decimal::from_str("1").unwrap());
    }
}
