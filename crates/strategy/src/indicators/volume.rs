/// Volume spike detection.
///
/// Position `i` is true iff `volume[i] >= threshold · μ`, where μ is the
/// mean of the volumes strictly before `i`, over at most `lookback−1` prior
/// elements. Position 0 is always false (no history to compare against).
///
/// # Panics
/// Panics if `lookback == 0`.
pub fn volume_spikes(volumes: &[f64], threshold: f64, lookback: usize) -> Vec<bool> {
    assert!(lookback > 0, "volume lookback must be positive");

    let mut result = Vec::with_capacity(volumes.len());

    for i in 0..volumes.len() {
        if i == 0 {
            result.push(false);
            continue;
        }
        let start = i.saturating_sub(lookback - 1);
        let prior = &volumes[start..i];
        let mean = prior.iter().sum::<f64>() / prior.len() as f64;
        result.push(volumes[i] >= threshold * mean);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_position_is_never_a_spike() {
        let out = volume_spikes(&[1_000_000.0], 2.0, 20);
        assert_eq!(out, vec![false]);
    }

    #[test]
    fn steady_volume_has_no_spikes() {
        let out = volume_spikes(&[1_000_000.0; 30], 2.0, 20);
        assert!(out.iter().all(|&s| !s));
    }

    #[test]
    fn doubled_volume_triggers_at_threshold() {
        let mut vols = vec![1_000_000.0; 25];
        vols.push(2_000_000.0);
        let out = volume_spikes(&vols, 2.0, 20);
        assert!(out[25], "2x the trailing mean should count as a spike");
    }

    #[test]
    fn mean_uses_only_prior_bars() {
        // A spike bar must not inflate the baseline used to judge itself.
        let vols = [100.0, 100.0, 100.0, 300.0];
        let out = volume_spikes(&vols, 2.0, 20);
        assert!(out[3]); // 300 >= 2 * mean(100, 100, 100)
    }

    #[test]
    fn lookback_window_is_bounded() {
        // With lookback 3, only the 2 bars before i are averaged.
        let vols = [1000.0, 10.0, 10.0, 25.0];
        let out = volume_spikes(&vols, 2.0, 3);
        // mean(10, 10) = 10; 25 >= 20 → spike, despite the old 1000 bar.
        assert!(out[3]);
    }
}
