//! Relayer fee calculation
//!
//! ```text
//! expense     = GAS_ESTIMATE × gasPrices.fast (gwei → wei)
//! service     = amount × relayerServiceFee / 100
//! native fee  = expense + service
//! token fee   = (expense + refund) × 10^decimals / ethPrices[currency] + service
//! ```
//!
//! The service fee percentage keeps the precision written by the relayer: the
//! digits after its decimal point set the scale. Parsing is exact.

use std::str::FromStr;

use num_bigint::BigUint;
use num_traits::{Num, Zero};
use shaker_config::NATIVE_CURRENCY;
use shaker_privacy::from_decimals;

use crate::error::{Error, Result};
use crate::relayer::RelayerStatus;

/// Gas budget assumed for a relayed withdrawal
pub const GAS_ESTIMATE: u64 = 500_000;

const GWEI_DECIMALS: u32 = 9;

/// A non-negative decimal percentage held as `mantissa / 10^scale`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceFee {
    pub mantissa: BigUint,
    pub scale: u32,
}

impl FromStr for ServiceFee {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let invalid = || Error::InvalidRequest(format!("invalid relayer service fee '{s}'"));

        let (whole, fraction) = s.split_once('.').unwrap_or((s, ""));
        if whole.is_empty() && fraction.is_empty() {
            return Err(invalid());
        }
        if !whole.chars().chain(fraction.chars()).all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        let digits = format!("{whole}{fraction}");
        let mantissa = BigUint::from_str_radix(&digits, 10).map_err(|_| invalid())?;
        Ok(Self {
            mantissa,
            scale: fraction.len() as u32,
        })
    }
}

impl ServiceFee {
    /// `amount × fee%`, rounded down
    pub fn apply(&self, amount: &BigUint) -> BigUint {
        let denominator = BigUint::from(10u32).pow(self.scale) * 100u32;
        amount * &self.mantissa / denominator
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeQuote {
    /// Total fee in the pool's currency units
    pub fee: BigUint,
    /// Gas cost in wei
    pub expense: BigUint,
    /// Percentage part in the pool's currency units
    pub service: BigUint,
}

#[derive(Debug, Clone, Copy)]
pub struct FeeCalculator {
    pub gas_estimate: u64,
}

impl Default for FeeCalculator {
    fn default() -> Self {
        Self {
            gas_estimate: GAS_ESTIMATE,
        }
    }
}

impl FeeCalculator {
    /// Quote the relayer fee for withdrawing `amount` (base units)
    ///
    /// Fails with `FeeTooHigh` unless the fee is strictly below `amount`.
    pub fn quote(
        &self,
        status: &RelayerStatus,
        currency: &str,
        amount: &BigUint,
        refund: &BigUint,
        decimals: u32,
    ) -> Result<FeeQuote> {
        let relayer_error = |payload: String| Error::Relayer {
            relayer: status.relayer_address.clone(),
            status: None,
            payload,
        };

        let fast = status
            .gas_prices
            .get("fast")
            .ok_or_else(|| relayer_error("status carries no fast gas price".into()))?;
        let gas_price = from_decimals(&fast.to_string(), GWEI_DECIMALS)
            .map_err(|e| relayer_error(format!("gas price: {e}")))?;
        let expense = gas_price * self.gas_estimate;

        let service = status
            .relayer_service_fee
            .to_string()
            .parse::<ServiceFee>()
            .map_err(|e| relayer_error(e.to_string()))?
            .apply(amount);

        let fee = if currency.eq_ignore_ascii_case(NATIVE_CURRENCY) {
            &expense + &service
        } else {
            let price = status
                .eth_prices
                .get(&currency.to_ascii_lowercase())
                .ok_or_else(|| relayer_error(format!("no price quoted for {currency}")))?;
            let price = BigUint::from_str_radix(&price.to_string(), 10)
                .map_err(|_| relayer_error(format!("invalid price for {currency}: {price}")))?;
            if price.is_zero() {
                return Err(relayer_error(format!("zero price quoted for {currency}")));
            }

            (&expense + refund) * BigUint::from(10u32).pow(decimals) / price + &service
        };

        if &fee >= amount {
            return Err(Error::FeeTooHigh {
                fee,
                amount: amount.clone(),
            });
        }

        Ok(FeeQuote {
            fee,
            expense,
            service,
        })
    }
}
