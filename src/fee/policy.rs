//! Fee assessment policy.

use crate::config::FeeConfig;
use rust_decimal::Decimal;

/// Fee charged for one concluded transfer.
///
/// The default policy is the flat minimum fee. With a basis-point rate
/// configured the fee is proportional to the transfer amount, with the
/// minimum as the floor.
///
/// # Example
/// ```
/// use ledgerlink::fee::FeePolicy;
/// use rust_decimal::Decimal;
///
/// // 25 bps on 10,000.00 is 25.00; on 100.00 the 2.00 minimum floors it.
/// let policy = FeePolicy::new(Decimal::new(200, 2), Some(25));
/// assert_eq!(policy.assess(Decimal::new(1_000_000, 2)), Decimal::new(2500, 2));
/// assert_eq!(policy.assess(Decimal::new(10_000, 2)), Decimal::new(200, 2));
/// ```
#[derive(Debug, Clone)]
pub struct FeePolicy {
    minimum_fee: Decimal,
    rate_bps: Option<u32>,
}

impl FeePolicy {
    pub fn new(minimum_fee: Decimal, rate_bps: Option<u32>) -> Self {
        Self {
            minimum_fee,
            rate_bps,
        }
    }

    pub fn from_config(config: &FeeConfig) -> Self {
        Self::new(config.minimum_fee, config.rate_bps)
    }

    pub fn assess(&self, transfer_amount: Decimal) -> Decimal {
        match self.rate_bps {
            None => self.minimum_fee,
            Some(bps) => {
                let proportional = (transfer_amount * Decimal::from(bps)
                    / Decimal::from(10_000u32))
                .round_dp(2);
                proportional.max(self.minimum_fee)
            }
        }
    }
}
