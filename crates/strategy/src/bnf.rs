//! BNF-style contrarian rules: buy extremes down, sell extremes up,
//! confirmed by volume and volatility-band breakouts.

use serde::Serialize;

use crate::indicators::is_defined;

/// Scalar indicator readings at a single point in time.
///
/// Float fields hold NaN when the underlying window was incomplete; the
/// boolean fields already fold undefined inputs to `false`.
#[derive(Debug, Clone, Serialize)]
pub struct IndicatorSnapshot {
    pub rsi: f64,
    pub macd_line: f64,
    pub macd_signal: f64,
    pub macd_histogram: f64,
    pub bollinger_upper: f64,
    pub bollinger_middle: f64,
    pub bollinger_lower: f64,
    pub below_lower_band: bool,
    pub above_upper_band: bool,
    pub volume_spike: bool,
    pub golden_cross: bool,
    pub death_cross: bool,
    pub current_price: f64,
}

impl Default for IndicatorSnapshot {
    fn default() -> Self {
        Self {
            rsi: f64::NAN,
            macd_line: f64::NAN,
            macd_signal: f64::NAN,
            macd_histogram: f64::NAN,
            bollinger_upper: f64::NAN,
            bollinger_middle: f64::NAN,
            bollinger_lower: f64::NAN,
            below_lower_band: false,
            above_upper_band: false,
            volume_spike: false,
            golden_cross: false,
            death_cross: false,
            current_price: 0.0,
        }
    }
}

/// One side's rule evaluation.
#[derive(Debug, Clone)]
pub struct RuleOutcome {
    pub triggered: bool,
    pub confidence: f64,
    pub reason: String,
}

/// The contrarian rule evaluator. Pure: same snapshot, same outcome.
#[derive(Debug, Clone, Default)]
pub struct BnfStrategy;

impl BnfStrategy {
    pub const RSI_OVERSOLD: f64 = 30.0;
    pub const RSI_OVERBOUGHT: f64 = 70.0;

    // Confidence weights; they sum to 1.0.
    const RSI_WEIGHT: f64 = 0.35;
    const VOLUME_WEIGHT: f64 = 0.25;
    const BOLLINGER_WEIGHT: f64 = 0.25;
    const CROSS_WEIGHT: f64 = 0.15;

    /// Minimum confidence reported once a rule triggers.
    const TRIGGER_FLOOR: f64 = 0.5;

    /// Contrarian entry: RSI oversold AND (volume spike OR below lower band).
    pub fn check_buy(&self, ind: &IndicatorSnapshot) -> RuleOutcome {
        if !is_defined(ind.rsi) {
            return RuleOutcome {
                triggered: false,
                confidence: 0.0,
                reason: "RSI is not available".to_string(),
            };
        }

        let mut conditions: Vec<String> = Vec::new();
        let mut confidence = 0.0;

        let rsi_oversold = ind.rsi < Self::RSI_OVERSOLD;
        if rsi_oversold {
            // Deeper oversold scores higher, boosted 1.5x and capped at 1.
            let score = ((Self::RSI_OVERSOLD - ind.rsi) / Self::RSI_OVERSOLD * 1.5).min(1.0);
            confidence += Self::RSI_WEIGHT * score;
            conditions.push(format!("RSI oversold ({:.1})", ind.rsi));
        }

        if ind.volume_spike {
            confidence += Self::VOLUME_WEIGHT;
            conditions.push("volume spike detected".to_string());
        }

        if ind.below_lower_band {
            confidence += Self::BOLLINGER_WEIGHT;
            conditions.push("below Bollinger lower band".to_string());
        }

        if ind.golden_cross {
            confidence += Self::CROSS_WEIGHT;
            conditions.push("golden cross confirmed".to_string());
        }

        let triggered = rsi_oversold && (ind.volume_spike || ind.below_lower_band);
        let confidence = Self::finalize_confidence(confidence, triggered);

        RuleOutcome {
            triggered,
            confidence,
            reason: Self::reason("BUY", &conditions),
        }
    }

    /// Contrarian exit: RSI overbought AND (volume decrease OR above upper
    /// band). "Volume decrease" here means no spike on the current bar.
    pub fn check_sell(&self, ind: &IndicatorSnapshot) -> RuleOutcome {
        if !is_defined(ind.rsi) {
            return RuleOutcome {
                triggered: false,
                confidence: 0.0,
                reason: "RSI is not available".to_string(),
            };
        }

        let mut conditions: Vec<String> = Vec::new();
        let mut confidence = 0.0;

        let rsi_overbought = ind.rsi > Self::RSI_OVERBOUGHT;
        if rsi_overbought {
            let score =
                ((ind.rsi - Self::RSI_OVERBOUGHT) / (100.0 - Self::RSI_OVERBOUGHT) * 1.5).min(1.0);
            confidence += Self::RSI_WEIGHT * score;
            conditions.push(format!("RSI overbought ({:.1})", ind.rsi));
        }

        let volume_decrease = !ind.volume_spike;
        if volume_decrease {
            confidence += Self::VOLUME_WEIGHT;
            conditions.push("volume decreasing".to_string());
        }

        if ind.above_upper_band {
            confidence += Self::BOLLINGER_WEIGHT;
            conditions.push("above Bollinger upper band".to_string());
        }

        if ind.death_cross {
            confidence += Self::CROSS_WEIGHT;
            conditions.push("death cross confirmed".to_string());
        }

        let triggered = rsi_overbought && (volume_decrease || ind.above_upper_band);
        let confidence = Self::finalize_confidence(confidence, triggered);

        RuleOutcome {
            triggered,
            confidence,
            reason: Self::reason("SELL", &conditions),
        }
    }

    fn finalize_confidence(raw: f64, triggered: bool) -> f64 {
        let max = Self::RSI_WEIGHT + Self::VOLUME_WEIGHT + Self::BOLLINGER_WEIGHT + Self::CROSS_WEIGHT;
        let mut confidence = (raw / max).min(1.0);
        if triggered && confidence < Self::TRIGGER_FLOOR {
            confidence = Self::TRIGGER_FLOOR;
        }
        confidence
    }

    fn reason(side: &str, conditions: &[String]) -> String {
        if conditions.is_empty() {
            format!("no {} conditions met", side.to_lowercase())
        } else {
            format!("{side} signal: {}", conditions.join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> IndicatorSnapshot {
        IndicatorSnapshot { rsi: 50.0, current_price: 10_000.0, ..Default::default() }
    }

    #[test]
    fn undefined_rsi_blocks_both_sides() {
        let strategy = BnfStrategy;
        let ind = IndicatorSnapshot::default();
        let buy = strategy.check_buy(&ind);
        let sell = strategy.check_sell(&ind);
        assert!(!buy.triggered);
        assert_eq!(buy.confidence, 0.0);
        assert_eq!(buy.reason, "RSI is not available");
        assert!(!sell.triggered);
        assert_eq!(sell.confidence, 0.0);
    }

    #[test]
    fn oversold_alone_does_not_trigger_buy() {
        let strategy = BnfStrategy;
        let ind = IndicatorSnapshot { rsi: 25.0, ..snapshot() };
        let out = strategy.check_buy(&ind);
        assert!(!out.triggered, "needs volume spike or band breach too");
        assert!(out.confidence < 0.5);
    }

    #[test]
    fn oversold_with_volume_spike_triggers_buy_with_floor() {
        let strategy = BnfStrategy;
        let ind = IndicatorSnapshot { rsi: 29.0, volume_spike: true, ..snapshot() };
        let out = strategy.check_buy(&ind);
        assert!(out.triggered);
        // Marginal RSI + volume alone sums below 0.5; the floor applies.
        assert!((out.confidence - 0.5).abs() < 1e-12);
        assert!(out.reason.contains("RSI oversold"));
        assert!(out.reason.contains("volume spike"));
    }

    #[test]
    fn deeply_oversold_full_house_scores_high() {
        let strategy = BnfStrategy;
        let ind = IndicatorSnapshot {
            rsi: 5.0,
            volume_spike: true,
            below_lower_band: true,
            golden_cross: true,
            ..snapshot()
        };
        let out = strategy.check_buy(&ind);
        assert!(out.triggered);
        assert!(out.confidence > 0.9, "got {}", out.confidence);
        assert!(out.reason.contains("golden cross confirmed"));
    }

    #[test]
    fn overbought_with_quiet_volume_triggers_sell() {
        let strategy = BnfStrategy;
        let ind = IndicatorSnapshot { rsi: 75.0, volume_spike: false, ..snapshot() };
        let out = strategy.check_sell(&ind);
        assert!(out.triggered);
        assert!(out.confidence >= 0.5);
        assert!(out.reason.contains("volume decreasing"));
    }

    #[test]
    fn overbought_with_spike_needs_band_breach_to_sell() {
        let strategy = BnfStrategy;
        let quiet = IndicatorSnapshot { rsi: 80.0, volume_spike: true, ..snapshot() };
        assert!(!strategy.check_sell(&quiet).triggered);

        let breached = IndicatorSnapshot { above_upper_band: true, ..quiet };
        assert!(strategy.check_sell(&breached).triggered);
    }

    #[test]
    fn confidence_never_exceeds_one() {
        let strategy = BnfStrategy;
        let ind = IndicatorSnapshot {
            rsi: 0.0,
            volume_spike: true,
            below_lower_band: true,
            golden_cross: true,
            ..snapshot()
        };
        let out = strategy.check_buy(&ind);
        assert!(out.confidence <= 1.0);
    }
}
