//! Service fee split for collected rent.

use crate::money::Amount;
use serde::Serialize;

/// 7.5%
pub const DEFAULT_SERVICE_FEE_BPS: u32 = 750;
const BPS_DENOMINATOR: i128 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeeSplit {
    pub gross: Amount,
    pub service_fee: Amount,
    pub net: Amount,
}

/// Splits a gross rent amount into the platform fee and the landlord's share.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeSplitter {
    rate_bps: u32,
}

impl Default for FeeSplitter {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE_FEE_BPS)
    }
}

impl FeeSplitter {
    /// Rates above 100% are clamped to 100%.
    pub fn new(rate_bps: u32) -> Self {
        Self {
            rate_bps: rate_bps.min(BPS_DENOMINATOR as u32),
        }
    }

    pub fn rate_bps(&self) -> u32 {
        self.rate_bps
    }

    /// `fee = round_half_up(gross * rate)`, `net = gross - fee`.
    ///
    /// Computed on minor units in i128, so `fee + net == gross` holds exactly
    /// and `0 <= fee <= gross` for every non-negative gross.
    pub fn split(&self, gross: Amount) -> FeeSplit {
        let scaled = i128::from(gross.minor()) * i128::from(self.rate_bps);
        let fee = (scaled + BPS_DENOMINATOR / 2).div_euclid(BPS_DENOMINATOR);
        // fee <= gross because rate_bps <= 10_000, so it fits back into i64
        let fee = Amount::from_minor(fee as i64);
        FeeSplit {
            gross,
            service_fee: fee,
            net: Amount::from_minor(gross.minor() - fee.minor()),
        }
    }
}
