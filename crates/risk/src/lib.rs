pub mod manager;

pub use manager::{
    RiskAction, RiskCheckResult, RiskConfig, RiskManager, TrailingStop,
    DEFAULT_RISK_PER_TRADE_PCT,
};
