use super::moving_average::ema;

/// MACD series: line, signal line, and histogram, all aligned with the input.
#[derive(Debug, Clone)]
pub struct Macd {
    pub line: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

/// Moving Average Convergence/Divergence.
///
/// `line[i] = EMA(fast)[i] − EMA(slow)[i]`, undefined where either EMA is.
/// The signal line seeds at position `slow−1 + signal_period−1` with the SMA
/// of the first `signal_period` defined MACD values, then EMA-extends with
/// `α = 2/(signal_period+1)`. The histogram is their difference where both
/// are defined.
///
/// # Panics
/// Panics if any period is zero or `fast >= slow`.
pub fn macd(prices: &[f64], fast: usize, slow: usize, signal_period: usize) -> Macd {
    assert!(fast > 0 && slow > 0 && signal_period > 0, "MACD periods must be positive");
    assert!(fast < slow, "MACD fast period must be less than slow period");

    let len = prices.len();
    let fast_ema = ema(prices, fast);
    let slow_ema = ema(prices, slow);

    let mut line = Vec::with_capacity(len);
    for i in 0..len {
        if fast_ema[i].is_nan() || slow_ema[i].is_nan() {
            line.push(f64::NAN);
        } else {
            line.push(fast_ema[i] - slow_ema[i]);
        }
    }

    // First defined MACD value sits at slow-1; the signal line needs
    // signal_period of them before it seeds.
    let first_line = slow - 1;
    let first_signal = first_line + signal_period - 1;
    let alpha = 2.0 / (signal_period as f64 + 1.0);

    let mut signal = Vec::with_capacity(len);
    for i in 0..len {
        if i < first_signal {
            signal.push(f64::NAN);
        } else if i == first_signal {
            let seed =
                line[first_line..=first_signal].iter().sum::<f64>() / signal_period as f64;
            signal.push(seed);
        } else {
            let prev = signal[i - 1];
            if prev.is_nan() || line[i].is_nan() {
                signal.push(f64::NAN);
            } else {
                signal.push(line[i] * alpha + prev * (1.0 - alpha));
            }
        }
    }

    let histogram = line
        .iter()
        .zip(&signal)
        .map(|(&l, &s)| if l.is_nan() || s.is_nan() { f64::NAN } else { l - s })
        .collect();

    Macd { line, signal, histogram }
}
