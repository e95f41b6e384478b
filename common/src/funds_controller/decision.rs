use crate::config::TopUpPolicy;
use alloy::primitives::{Address, U256};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FundingCheck {
    pub address: Address,
    pub balance: U256,
    pub threshold: U256,
    pub should_fund: bool,
    pub amount: U256,
}

/// Funding is monotonic in the balance: at or above `threshold` nothing is deposited.
pub fn evaluate_funding(
    address: Address,
    balance: U256,
    threshold: U256,
    policy: TopUpPolicy,
) -> FundingCheck {
    let should_fund = balance < threshold;
    let amount = if !should_fund {
        U256::ZERO
    } else {
        match policy {
            TopUpPolicy::Deficit { margin } => (threshold - balance).saturating_add(margin),
            TopUpPolicy::Fixed(amount) => amount,
        }
    };
    FundingCheck {
        address,
        balance,
        threshold,
        should_fund: should_fund && !amount.is_zero(),
        amount,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    const ACCOUNT: Address = address!("0x1234567890123456789012345678901234567890");
    const HALF_ETH: u128 = 500_000_000_000_000_000;
    const ONE_ETH: u128 = 1_000_000_000_000_000_000;

    #[test]
    fn test_half_balance_gets_at_least_the_deficit() {
        let check = evaluate_funding(
            ACCOUNT,
            U256::from(HALF_ETH),
            U256::from(ONE_ETH),
            TopUpPolicy::default(),
        );
        assert!(check.should_fund);
        assert!(check.amount >= U256::from(HALF_ETH));
    }

    #[test]
    fn test_balance_above_threshold_is_left_alone() {
        let check = evaluate_funding(
            ACCOUNT,
            U256::from(1_200_000_000_000_000_000u128),
            U256::from(ONE_ETH),
            TopUpPolicy::Fixed(U256::from(ONE_ETH)),
        );
        assert!(!check.should_fund);
        assert_eq!(check.amount, U256::ZERO);
    }

    #[test]
    fn test_decision_is_monotonic_around_threshold() {
        let threshold = U256::from(1_000);
        for balance in [0u64, 1, 500, 999, 1_000, 1_001, 10_000] {
            let check = evaluate_funding(
                ACCOUNT,
                U256::from(balance),
                threshold,
                TopUpPolicy::Deficit {
                    margin: U256::from(10),
                },
            );
            assert_eq!(check.should_fund, U256::from(balance) < threshold);
            if check.should_fund {
                assert_eq!(check.amount, threshold - U256::from(balance) + U256::from(10));
            }
        }
    }

    #[test]
    fn test_zero_threshold_never_funds() {
        let check = evaluate_funding(ACCOUNT, U256::ZERO, U256::ZERO, TopUpPolicy::default());
        assert!(!check.should_fund);
    }
}
