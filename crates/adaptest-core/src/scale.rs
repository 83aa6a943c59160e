//! Conversions between the linear difficulty scale, logits and error percentages.
//!
//! A level on `[low, high]` maps to the log-odds of its position on the scale.
//! The boundaries map to `-inf` and `+inf`, which are valid logits here:
//! stepping from a boundary saturates back to the same boundary.

use crate::error::DomainError;

/// Convert a linear level on `[low, high]` to a logit.
///
/// Returns `-inf` at `low` and `+inf` at `high`.
pub fn linear_to_logit(level: f64, low: f64, high: f64) -> f64 {
    let fraction = (level - low) / (high - low);
    (fraction / (1.0 - fraction)).ln()
}

/// Convert a logit back onto the linear scale `[low, high]`.
pub fn logit_to_linear(logit: f64, low: f64, high: f64) -> f64 {
    (high - low) * sigmoid(logit) + low
}

/// Convert an error fraction in `[0, 0.5)` to a logit width.
///
/// `percent_to_logit(0.05)` is roughly `0.2`.
pub fn percent_to_logit(fraction: f64) -> Result<f64, DomainError> {
    if !(0.0..0.5).contains(&fraction) {
        return Err(DomainError::PercentOutOfRange(fraction));
    }
    Ok(4.0 * fraction.atanh())
}

/// Convert a non-negative logit width back to an error fraction.
pub fn logit_to_percent(logit: f64) -> Result<f64, DomainError> {
    // NaN fails this comparison too.
    if !(logit >= 0.0) {
        return Err(DomainError::NegativeLogit(logit));
    }
    Ok((logit / 4.0).tanh())
}

/// Standard logistic function, saturating to 0 and 1 at the infinities.
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Round to `places` decimals, halves away from zero.
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}
