pub mod bnf;
pub mod indicators;
pub mod signal;

pub use bnf::{BnfStrategy, IndicatorSnapshot, RuleOutcome};
pub use signal::{SignalGenerator, TradingSignal};
