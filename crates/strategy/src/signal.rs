use common::SignalKind;
use serde::Serialize;
use tracing::debug;

use crate::bnf::{BnfStrategy, IndicatorSnapshot};
use crate::indicators::{
    bollinger_bands, death_cross_at_latest, golden_cross_at_latest, is_defined, macd, rsi,
    volume_spikes,
};

/// A generated trading signal with its supporting indicator snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct TradingSignal {
    pub kind: SignalKind,
    /// Strategy-reported strength in [0, 1]. Not a probability.
    pub confidence: f64,
    pub reason: String,
    pub indicators: IndicatorSnapshot,
}

impl TradingSignal {
    fn hold(confidence: f64, reason: &str, indicators: IndicatorSnapshot) -> Self {
        Self { kind: SignalKind::Hold, confidence, reason: reason.to_string(), indicators }
    }
}

/// Builds the indicator snapshot from raw close/volume history and resolves
/// the BNF rules into one signal. Deterministic: no clock, no randomness.
#[derive(Debug, Clone, Default)]
pub struct SignalGenerator {
    strategy: BnfStrategy,
}

impl SignalGenerator {
    /// Minimum history length for stable indicators.
    pub const MIN_DATA_POINTS: usize = 30;

    const RSI_PERIOD: usize = 14;
    const MACD_FAST: usize = 12;
    const MACD_SLOW: usize = 26;
    const MACD_SIGNAL: usize = 9;
    const BOLLINGER_PERIOD: usize = 20;
    const BOLLINGER_K: f64 = 2.0;
    const VOLUME_THRESHOLD: f64 = 2.0;
    const VOLUME_LOOKBACK: usize = 20;
    const SHORT_MA: usize = 5;
    const LONG_MA: usize = 20;

    pub fn new() -> Self {
        Self { strategy: BnfStrategy }
    }

    /// Generate a signal from close prices and volumes, oldest to newest.
    ///
    /// The shorter input truncates the longer; an empty volume series is
    /// treated as all-zero. Fewer than [`Self::MIN_DATA_POINTS`] bars yield
    /// HOLD with zero confidence.
    pub fn generate(&self, prices: &[f64], volumes: &[f64]) -> TradingSignal {
        let len =
            if volumes.is_empty() { prices.len() } else { prices.len().min(volumes.len()) };

        if len < Self::MIN_DATA_POINTS {
            return TradingSignal::hold(
                0.0,
                "insufficient data for signal generation",
                IndicatorSnapshot::default(),
            );
        }

        let prices = &prices[..len];
        let zero_volumes;
        let volumes = if volumes.is_empty() {
            zero_volumes = vec![0.0; len];
            &zero_volumes[..]
        } else {
            &volumes[..len]
        };

        let indicators = self.snapshot_at_latest(prices, volumes);

        let buy = self.strategy.check_buy(&indicators);
        let sell = self.strategy.check_sell(&indicators);

        debug!(
            buy = buy.triggered,
            sell = sell.triggered,
            buy_conf = buy.confidence,
            sell_conf = sell.confidence,
            "BNF rules evaluated"
        );

        match (buy.triggered, sell.triggered) {
            (true, false) => TradingSignal {
                kind: SignalKind::Buy,
                confidence: buy.confidence,
                reason: buy.reason,
                indicators,
            },
            (false, true) => TradingSignal {
                kind: SignalKind::Sell,
                confidence: sell.confidence,
                reason: sell.reason,
                indicators,
            },
            (true, true) => {
                // Conflicting rules: the stronger side wins at a penalty.
                if buy.confidence > sell.confidence {
                    TradingSignal {
                        kind: SignalKind::Buy,
                        confidence: buy.confidence * 0.8,
                        reason: format!("{} (conflicting sell signal)", buy.reason),
                        indicators,
                    }
                } else if sell.confidence > buy.confidence {
                    TradingSignal {
                        kind: SignalKind::Sell,
                        confidence: sell.confidence * 0.8,
                        reason: format!("{} (conflicting buy signal)", sell.reason),
                        indicators,
                    }
                } else {
                    TradingSignal::hold(
                        0.5,
                        "conflicting buy/sell signals with equal strength",
                        indicators,
                    )
                }
            }
            (false, false) => {
                TradingSignal::hold(0.5, "market conditions neutral - no clear signal", indicators)
            }
        }
    }

    fn snapshot_at_latest(&self, prices: &[f64], volumes: &[f64]) -> IndicatorSnapshot {
        let last = prices.len() - 1;
        let current_price = prices[last];

        let rsi_series = rsi(prices, Self::RSI_PERIOD);
        let macd_series = macd(prices, Self::MACD_FAST, Self::MACD_SLOW, Self::MACD_SIGNAL);
        let bands = bollinger_bands(prices, Self::BOLLINGER_PERIOD, Self::BOLLINGER_K);
        let spikes = volume_spikes(volumes, Self::VOLUME_THRESHOLD, Self::VOLUME_LOOKBACK);

        let lower = bands.lower[last];
        let upper = bands.upper[last];

        IndicatorSnapshot {
            rsi: rsi_series[last],
            macd_line: macd_series.line[last],
            macd_signal: macd_series.signal[last],
            macd_histogram: macd_series.histogram[last],
            bollinger_upper: upper,
            bollinger_middle: bands.middle[last],
            bollinger_lower: lower,
            // Band comparisons fold undefined to false.
            below_lower_band: is_defined(lower) && current_price < lower,
            above_upper_band: is_defined(upper) && current_price > upper,
            volume_spike: spikes[last],
            golden_cross: golden_cross_at_latest(prices, Self::SHORT_MA, Self::LONG_MA),
            death_cross: death_cross_at_latest(prices, Self::SHORT_MA, Self::LONG_MA),
            current_price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declining_market() -> (Vec<f64>, Vec<f64>) {
        // Strict decline from 100 with a volume blowout on the final bar.
        let prices: Vec<f64> = (0..50).map(|i| 100.0 - 2.0 * i as f64).collect();
        let mut volumes = vec![1_000_000.0; 49];
        volumes.push(3_000_000.0);
        (prices, volumes)
    }

    #[test]
    fn short_history_holds_with_zero_confidence() {
        let generator = SignalGenerator::new();
        let prices = vec![100.0; 29];
        let volumes = vec![1_000_000.0; 29];
        let signal = generator.generate(&prices, &volumes);
        assert_eq!(signal.kind, SignalKind::Hold);
        assert_eq!(signal.confidence, 0.0);
        assert!(signal.reason.contains("insufficient data"));
    }

    #[test]
    fn flat_market_holds_neutral() {
        let generator = SignalGenerator::new();
        let signal = generator.generate(&[100.0; 60], &[1_000_000.0; 60]);
        assert_eq!(signal.kind, SignalKind::Hold);
        assert!(signal.confidence <= 0.5);
    }

    #[test]
    fn oversold_crash_with_volume_spike_buys() {
        let generator = SignalGenerator::new();
        let (prices, volumes) = declining_market();
        let signal = generator.generate(&prices, &volumes);
        assert_eq!(signal.kind, SignalKind::Buy);
        assert!(signal.confidence >= 0.5);
        assert!(signal.reason.contains("RSI oversold"));
        assert!(signal.indicators.rsi < 30.0);
        assert!(signal.indicators.volume_spike);
    }

    #[test]
    fn overbought_melt_up_sells() {
        let generator = SignalGenerator::new();
        let prices: Vec<f64> = (0..50).map(|i| 50.0 + 2.0 * i as f64).collect();
        let volumes = vec![1_000_000.0; 50];
        let signal = generator.generate(&prices, &volumes);
        assert_eq!(signal.kind, SignalKind::Sell);
        assert!(signal.confidence >= 0.5);
        assert!(signal.indicators.rsi > 70.0);
    }

    #[test]
    fn mismatched_lengths_truncate_to_shorter() {
        let generator = SignalGenerator::new();
        let (prices, _) = declining_market();
        // Only 35 volume bars; truncation must not panic and still signals.
        let volumes = vec![1_000_000.0; 35];
        let signal = generator.generate(&prices, &volumes);
        assert!(matches!(signal.kind, SignalKind::Buy | SignalKind::Hold));
    }

    #[test]
    fn empty_volumes_default_to_zero() {
        let generator = SignalGenerator::new();
        let prices: Vec<f64> = (0..40).map(|i| 100.0 + (i as f64 * 0.5).sin()).collect();
        let signal = generator.generate(&prices, &[]);
        // Zero volume never spikes; the generator must not panic.
        assert!(!signal.indicators.volume_spike);
    }

    #[test]
    fn identical_inputs_produce_identical_signals() {
        let generator = SignalGenerator::new();
        let (prices, volumes) = declining_market();
        let a = generator.generate(&prices, &volumes);
        let b = generator.generate(&prices, &volumes);
        assert_eq!(a.kind, b.kind);
        assert_eq!(a.confidence.to_bits(), b.confidence.to_bits());
        assert_eq!(a.reason, b.reason);
    }
}
