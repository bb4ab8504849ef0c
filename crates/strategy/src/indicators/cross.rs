use super::moving_average::sma;

/// Golden cross on the most recent bar: SMA(short) crossed above SMA(long)
/// between the previous bar and the latest one. Requires all four values
/// defined; returns false otherwise.
pub fn golden_cross_at_latest(prices: &[f64], short_period: usize, long_period: usize) -> bool {
    cross_at_latest(prices, short_period, long_period, true)
}

/// Death cross on the most recent bar: SMA(short) crossed below SMA(long).
pub fn death_cross_at_latest(prices: &[f64], short_period: usize, long_period: usize) -> bool {
    cross_at_latest(prices, short_period, long_period, false)
}

fn cross_at_latest(prices: &[f64], short_period: usize, long_period: usize, golden: bool) -> bool {
    if prices.len() < long_period + 1 {
        return false;
    }

    let short_ma = sma(prices, short_period);
    let long_ma = sma(prices, long_period);

    let curr = prices.len() - 1;
    let prev = curr - 1;

    let values = [short_ma[curr], long_ma[curr], short_ma[prev], long_ma[prev]];
    if values.iter().any(|v| v.is_nan()) {
        return false;
    }

    if golden {
        short_ma[curr] > long_ma[curr] && short_ma[prev] <= long_ma[prev]
    } else {
        short_ma[curr] < long_ma[curr] && short_ma[prev] >= long_ma[prev]
    }
}
