/// Simple Moving Average.
///
/// Positions `0..period-1` are NaN; from `period-1` onward each element is
/// the arithmetic mean of the trailing `period`-wide window.
///
/// # Panics
/// Panics if `period == 0`.
pub fn sma(prices: &[f64], period: usize) -> Vec<f64> {
    assert!(period > 0, "SMA period must be positive");

    let mut result = Vec::with_capacity(prices.len());
    let mut window_sum = 0.0;

    for (i, &price) in prices.iter().enumerate() {
        window_sum += price;
        if i >= period {
            window_sum -= prices[i - period];
        }
        if i + 1 < period {
            result.push(f64::NAN);
        } else {
            result.push(window_sum / period as f64);
        }
    }

    result
}

/// Exponential Moving Average.
///
/// Seeded at position `period-1` with the SMA of the first `period` values,
/// then extended with `EMA[i] = α·x[i] + (1−α)·EMA[i−1]`, `α = 2/(period+1)`.
///
/// # Panics
/// Panics if `period == 0`.
pub fn ema(prices: &[f64], period: usize) -> Vec<f64> {
    assert!(period > 0, "EMA period must be positive");

    let mut result = Vec::with_capacity(prices.len());
    let alpha = 2.0 / (period as f64 + 1.0);

    for (i, &price) in prices.iter().enumerate() {
        if i + 1 < period {
            result.push(f64::NAN);
        } else if i + 1 == period {
            let seed = prices[..period].iter().sum::<f64>() / period as f64;
            result.push(seed);
        } else {
            let prev = result[i - 1];
            result.push(price * alpha + prev * (1.0 - alpha));
        }
    }

    result
}
