/// Relative Strength Index with Wilder's smoothing.
///
/// The first defined value sits at position `period`, computed from simple
/// means of the first `period` gains and losses; later positions chain
/// Wilder's smoothing: `avg = ((period−1)·avg_prev + current) / period`.
///
/// When the average loss is zero but gains exist, RSI saturates at 100.
/// When both averages are zero (a flat window) the value is undefined (NaN)
/// — the strategy treats that as "no reading", never as neutral-50.
///
/// # Panics
/// Panics if `period == 0`.
pub fn rsi(prices: &[f64], period: usize) -> Vec<f64> {
    assert!(period > 0, "RSI period must be positive");

    let len = prices.len();
    let mut result = Vec::with_capacity(len);
    if len == 0 {
        return result;
    }

    // Per-bar gains and losses; position 0 has no delta.
    let mut gains = Vec::with_capacity(len);
    let mut losses = Vec::with_capacity(len);
    gains.push(0.0);
    losses.push(0.0);
    for i in 1..len {
        let delta = prices[i] - prices[i - 1];
        gains.push(delta.max(0.0));
        losses.push((-delta).max(0.0));
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;

    for i in 0..len {
        if i < period {
            result.push(f64::NAN);
            continue;
        }
        if i == period {
            avg_gain = gains[1..=period].iter().sum::<f64>() / period as f64;
            avg_loss = losses[1..=period].iter().sum::<f64>() / period as f64;
        } else {
            avg_gain = (avg_gain * (period as f64 - 1.0) + gains[i]) / period as f64;
            avg_loss = (avg_loss * (period as f64 - 1.0) + losses[i]) / period as f64;
        }
        result.push(rsi_value(avg_gain, avg_loss));
    }

    result
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        if avg_gain == 0.0 {
            f64::NAN
        } else {
            100.0
        }
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsi_empty_input_yields_empty_output() {
        assert!(rsi(&[], 14).is_empty());
    }

    #[test]
    fn rsi_is_undefined_before_period_plus_one_values() {
        let prices: Vec<f64> = (0..14).map(|i| 100.0 + i as f64).collect();
        let out = rsi(&prices, 14);
        assert_eq!(out.len(), 14);
        assert!(out.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn rsi_all_gains_is_100() {
        let prices: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let out = rsi(&prices, 14);
        for &v in &out[14..] {
            assert!((v - 100.0).abs() < 1e-9, "expected 100, got {v}");
        }
    }

    #[test]
    fn rsi_all_losses_is_0() {
        let prices: Vec<f64> = (0..30).map(|i| 100.0 - i as f64).collect();
        let out = rsi(&prices, 14);
        for &v in &out[14..] {
            assert!(v.abs() < 1e-9, "expected 0, got {v}");
        }
    }

    #[test]
    fn rsi_flat_series_is_undefined_not_neutral() {
        let out = rsi(&[100.0; 40], 14);
        assert!(out.iter().all(|v| v.is_nan()));
    }

    #[test]
    fn rsi_stays_within_bounds_on_mixed_series() {
        let prices = [
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08, 45.89, 46.03,
            44.18, 44.22, 44.57, 43.42, 42.66, 43.13,
        ];
        let out = rsi(&prices, 14);
        for &v in out.iter().filter(|v| !v.is_nan()) {
            assert!((0.0..=100.0).contains(&v), "RSI {v} out of range");
        }
    }
}
