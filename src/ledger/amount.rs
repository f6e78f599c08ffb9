use rust_decimal::Decimal;
use std::str::FromStr;
use thiserror::Error;

/// Fixed-point precision used for monetary values on the ledger.
pub const LEDGER_DECIMALS: u32 = 18;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("'{0}' is not a valid decimal amount")]
    Invalid(String),

    #[error("amount must not be negative")]
    Negative,

    #[error("amount has {scale} decimal places, ledger precision is {decimals}")]
    PrecisionLoss { scale: u32, decimals: u32 },

    #[error("amount does not fit the ledger's integer representation")]
    Overflow,
}

/// Convert a human-readable decimal string into the chain's fixed-point
/// integer representation. Conversion is exact: digits beyond the configured
/// precision are an error, never silently truncated.
pub fn parse_units(amount: &str, decimals: u32) -> Result<u128, AmountError> {
    let parsed =
        Decimal::from_str(amount.trim()).map_err(|_| AmountError::Invalid(amount.to_string()))?;

    if parsed.is_sign_negative() {
        return Err(AmountError::Negative);
    }
    if parsed.scale() > decimals {
        return Err(AmountError::PrecisionLoss {
            scale: parsed.scale(),
            decimals,
        });
    }

    let mantissa = parsed.mantissa();
    debug_assert!(mantissa >= 0);
    let scale_factor = 10u128
        .checked_pow(decimals - parsed.scale())
        .ok_or(AmountError::Overflow)?;
    (mantissa as u128)
        .checked_mul(scale_factor)
        .ok_or(AmountError::Overflow)
}

/// Render a fixed-point integer back as a decimal string at full precision.
pub fn format_units(value: u128, decimals: u32) -> String {
    if decimals == 0 {
        return value.to_string();
    }
    let divisor = 10u128.pow(decimals);
    let whole = value / divisor;
    let frac = value % divisor;
    format!("{whole}.{frac:0width$}", width = decimals as usize)
}
