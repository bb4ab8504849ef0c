use serde::{Deserialize, Serialize};
use tracing::info;

/// User-configurable risk parameters.
///
/// Percentages are expressed the way traders quote them: `stop_loss_pct`
/// is negative (a loss), `take_profit_pct` positive, amounts in KRW.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Loss on a single position that forces an exit (e.g. -5.0 = -5%).
    pub stop_loss_pct: f64,
    /// Gain on a single position that takes profit (e.g. 10.0 = +10%).
    pub take_profit_pct: f64,
    pub trailing_stop_enabled: bool,
    /// Distance of the trailing stop below the highest observed price.
    pub trailing_stop_pct: f64,
    /// Maximum KRW notional committed to any single stock.
    pub max_investment_per_stock: f64,
    /// Maximum number of simultaneously held stocks.
    pub max_stocks: usize,
    /// Daily P&L that halts all new entries for the day (e.g. -10.0).
    pub daily_loss_limit: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            stop_loss_pct: -5.0,
            take_profit_pct: 10.0,
            trailing_stop_enabled: false,
            trailing_stop_pct: 5.0,
            max_investment_per_stock: 1_000_000.0,
            max_stocks: 10,
            daily_loss_limit: -10.0,
        }
    }
}

impl RiskConfig {
    /// Load from a TOML file. Exits process on error.
    pub fn load(path: &str) -> Self {
        let content = std::fs::read_to_string(path)
            .unwrap_or_else(|e| panic!("Failed to read risk config at '{path}': {e}"));
        toml::from_str(&content)
            .unwrap_or_else(|e| panic!("Failed to parse risk config at '{path}': {e}"))
    }
}

/// Action decided by a position risk check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskAction {
    Hold,
    StopLoss,
    TakeProfit,
    TrailingStop,
}

impl RiskAction {
    /// True for any action that forces an exit.
    pub fn is_exit(&self) -> bool {
        !matches!(self, RiskAction::Hold)
    }
}

/// Result of a position risk check.
#[derive(Debug, Clone)]
pub struct RiskCheckResult {
    pub action: RiskAction,
    pub reason: String,
    pub current_profit_pct: f64,
    /// Price level that tripped the action, when one applies.
    pub trigger_price: Option<f64>,
}

/// Upward-ratcheting stop that follows the highest observed price.
///
/// `stop_price = highest_price · (1 − trailing_pct/100)`; both only ever
/// increase. Created on first observation of a position, destroyed on a
/// successful sell.
#[derive(Debug, Clone)]
pub struct TrailingStop {
    pub entry_price: f64,
    pub trailing_pct: f64,
    pub highest_price: f64,
    pub stop_price: f64,
}

impl TrailingStop {
    pub fn new(entry_price: f64, trailing_pct: f64) -> Self {
        Self {
            entry_price,
            trailing_pct,
            highest_price: entry_price,
            stop_price: entry_price * (1.0 - trailing_pct / 100.0),
        }
    }

    /// Ratchet the stop upward if the price made a new high.
    pub fn update_price(&mut self, current_price: f64) {
        if current_price > self.highest_price {
            self.highest_price = current_price;
            self.stop_price = current_price * (1.0 - self.trailing_pct / 100.0);
        }
    }

    pub fn is_triggered(&self, current_price: f64) -> bool {
        current_price <= self.stop_price
    }
}

/// Stateless rule evaluation over positions and entries.
///
/// Check priority: stop-loss, then take-profit, then trailing stop. When a
/// bar satisfies both exit thresholds at once, stop-loss wins — capital
/// preservation over profit taking.
#[derive(Debug, Clone, Default)]
pub struct RiskManager {
    config: RiskConfig,
}

impl RiskManager {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Evaluate one position against the exit rules.
    pub fn check_position(
        &self,
        entry_price: f64,
        current_price: f64,
        trailing: Option<&TrailingStop>,
    ) -> RiskCheckResult {
        if entry_price == 0.0 {
            return RiskCheckResult {
                action: RiskAction::Hold,
                reason: "invalid entry price".to_string(),
                current_profit_pct: 0.0,
                trigger_price: None,
            };
        }

        let profit_pct = (current_price - entry_price) / entry_price * 100.0;

        if profit_pct <= self.config.stop_loss_pct {
            return RiskCheckResult {
                action: RiskAction::StopLoss,
                reason: format!(
                    "stop loss triggered: loss {:.2}% reached the {:.1}% line",
                    profit_pct, self.config.stop_loss_pct
                ),
                current_profit_pct: profit_pct,
                trigger_price: Some(entry_price * (1.0 + self.config.stop_loss_pct / 100.0)),
            };
        }

        if profit_pct >= self.config.take_profit_pct {
            return RiskCheckResult {
                action: RiskAction::TakeProfit,
                reason: format!(
                    "take profit triggered: gain {:.2}% reached the {:.1}% line",
                    profit_pct, self.config.take_profit_pct
                ),
                current_profit_pct: profit_pct,
                trigger_price: Some(entry_price * (1.0 + self.config.take_profit_pct / 100.0)),
            };
        }

        if self.config.trailing_stop_enabled {
            if let Some(ts) = trailing {
                if ts.is_triggered(current_price) {
                    return RiskCheckResult {
                        action: RiskAction::TrailingStop,
                        reason: format!(
                            "trailing stop triggered: price {:.0} at or below stop {:.0}",
                            current_price, ts.stop_price
                        ),
                        current_profit_pct: profit_pct,
                        trigger_price: Some(ts.stop_price),
                    };
                }
            }
        }

        RiskCheckResult {
            action: RiskAction::Hold,
            reason: "no risk condition met - holding position".to_string(),
            current_profit_pct: profit_pct,
            trigger_price: None,
        }
    }

    /// Gate a new entry against the daily halt, the per-stock cap, and the
    /// position-count cap, in that order.
    pub fn can_open_position(
        &self,
        investment_amount: f64,
        current_positions_count: usize,
        daily_pnl_pct: f64,
    ) -> (bool, String) {
        if daily_pnl_pct <= self.config.daily_loss_limit {
            return (
                false,
                format!(
                    "daily loss limit hit: {:.2}% is at or past the {:.1}% limit, trading halted",
                    daily_pnl_pct, self.config.daily_loss_limit
                ),
            );
        }

        if investment_amount > self.config.max_investment_per_stock {
            return (
                false,
                format!(
                    "investment {:.0} exceeds the per-stock cap of {:.0}",
                    investment_amount, self.config.max_investment_per_stock
                ),
            );
        }

        if current_positions_count >= self.config.max_stocks {
            return (
                false,
                format!(
                    "holding {} stocks, already at the cap of {}",
                    current_positions_count, self.config.max_stocks
                ),
            );
        }

        (true, String::new())
    }

    /// Risk-based position sizing, in whole shares.
    ///
    /// Risks `risk_per_trade_pct` of available capital per trade: the
    /// notional is sized so a stop-loss exit loses exactly that amount,
    /// then capped by the per-stock investment limit.
    pub fn calculate_position_size(
        &self,
        available_capital: f64,
        stock_price: f64,
        risk_per_trade_pct: f64,
    ) -> u32 {
        if stock_price <= 0.0 || available_capital <= 0.0 {
            return 0;
        }

        let risk_amount = available_capital * risk_per_trade_pct / 100.0;

        let mut stop_ratio = self.config.stop_loss_pct.abs() / 100.0;
        if stop_ratio == 0.0 {
            stop_ratio = 0.05;
        }

        let max_investment_by_risk = risk_amount / stop_ratio;
        let max_investment = max_investment_by_risk.min(self.config.max_investment_per_stock);

        let quantity = (max_investment / stock_price).floor();
        if quantity <= 0.0 {
            0
        } else {
            info!(
                stock_price,
                max_investment,
                quantity,
                "position size calculated"
            );
            quantity as u32
        }
    }
}

/// Default risk fraction of capital committed per trade.
pub const DEFAULT_RISK_PER_TRADE_PCT: f64 = 2.0;

// ─── Tests ────────────────────────────────────────────────────────────────────
