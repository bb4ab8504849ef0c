//! Technical indicator math over daily close/volume series.
//!
//! Every series function returns an output aligned 1:1 with its input:
//! positions whose window is incomplete hold `f64::NAN`. Callers test
//! definedness with [`is_defined`]; comparisons against thresholds
//! short-circuit false when either operand is NaN.

pub mod bollinger;
pub mod cross;
pub mod macd;
pub mod moving_average;
pub mod rsi;
pub mod volume;

pub use bollinger::{bollinger_bands, Bollinger};
pub use cross::{death_cross_at_latest, golden_cross_at_latest};
pub use macd::{macd, Macd};
pub use moving_average::{ema, sma};
pub use rsi::rsi;
pub use volume::volume_spikes;

/// True when an indicator value is defined (not NaN).
#[inline]
pub fn is_defined(value: f64) -> bool {
    !value.is_nan()
}
