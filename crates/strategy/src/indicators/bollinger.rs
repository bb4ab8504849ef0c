use super::moving_average::sma;

/// Bollinger band series aligned with the input.
#[derive(Debug, Clone)]
pub struct Bollinger {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

/// Bollinger Bands: middle = SMA(period), upper/lower = middle ± k·σ.
///
/// σ is the population standard deviation over the same window (divisor n,
/// not n−1).
///
/// # Panics
/// Panics if `period == 0`.
pub fn bollinger_bands(prices: &[f64], period: usize, k: f64) -> Bollinger {
    assert!(period > 0, "Bollinger period must be positive");

    let middle = sma(prices, period);
    let mut upper = Vec::with_capacity(prices.len());
    let mut lower = Vec::with_capacity(prices.len());

    for i in 0..prices.len() {
        if i + 1 < period {
            upper.push(f64::NAN);
            lower.push(f64::NAN);
        } else {
            let window = &prices[i + 1 - period..=i];
            let mean = middle[i];
            let variance =
                window.iter().map(|p| (p - mean) * (p - mean)).sum::<f64>() / period as f64;
            let sigma = variance.sqrt();
            upper.push(mean + k * sigma);
            lower.push(mean - k * sigma);
        }
    }

    Bollinger { upper, middle, lower }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bands_align_and_lead_with_nan() {
        let prices: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        let b = bollinger_bands(&prices, 20, 2.0);
        assert_eq!(b.upper.len(), 30);
        assert!(b.upper[18].is_nan());
        assert!(b.lower[18].is_nan());
        assert!(!b.upper[19].is_nan());
    }

    #[test]
    fn bands_collapse_on_constant_series() {
        let b = bollinger_bands(&[42.0; 25], 20, 2.0);
        let i = 24;
        assert!((b.upper[i] - 42.0).abs() < 1e-12);
        assert!((b.middle[i] - 42.0).abs() < 1e-12);
        assert!((b.lower[i] - 42.0).abs() < 1e-12);
    }

    #[test]
    fn bands_are_ordered_when_defined() {
        let prices: Vec<f64> = (0..50).map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0).collect();
        let b = bollinger_bands(&prices, 20, 2.0);
        for i in 19..50 {
            assert!(b.lower[i] <= b.middle[i] && b.middle[i] <= b.upper[i]);
        }
    }

    #[test]
    fn sigma_uses_population_divisor() {
        // Window [1, 2, 3]: mean 2, population variance 2/3.
        let b = bollinger_bands(&[1.0, 2.0, 3.0], 3, 1.0);
        let sigma = (2.0f64 / 3.0).sqrt();
        assert!((b.upper[2] - (2.0 + sigma)).abs() < 1e-12);
        assert!((b.lower[2] - (2.0 - sigma)).abs() < 1e-12);
    }
}
