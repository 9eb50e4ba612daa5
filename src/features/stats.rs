//! Welford running mean/variance with removal, so window eviction stays O(1)
//! amortised. Removing a value that dominates the spread loses precision; the
//! caller rebuilds from the retained values when [`RunningStats::remove`] says so.

/// Removals whose subtracted term exceeds the remaining spread by this factor
/// leave too much cancellation error to keep.
const CANCELLATION_RATIO: f64 = 1e6;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    pub fn add(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    /// Build from scratch.
    pub fn from_values(values: impl IntoIterator<Item = f64>) -> Self {
        let mut s = Self::default();
        values.into_iter().for_each(|x| s.add(x));
        s
    }

    /// Remove a value previously added. Order of removal does not matter.
    ///
    /// Returns `false` when the result is no longer trustworthy (the removed value
    /// dominated the mean or the spread) and must be rebuilt with
    /// [`RunningStats::from_values`].
    #[must_use]
    pub fn remove(&mut self, x: f64) -> bool {
        if self.count <= 1 {
            *self = Self::default();
            return true;
        }
        let n = self.count as f64;
        let mean_without = (n * self.mean - x) / (n - 1.0);
        let removed = (x - self.mean) * (x - mean_without);
        let m2_before = self.m2;
        self.m2 = (self.m2 - removed).max(0.0);
        self.mean = mean_without;
        self.count -= 1;
        let spread_lost = m2_before > self.m2 * CANCELLATION_RATIO;
        let mean_lost = x.abs() > mean_without.abs().max(1.0) * CANCELLATION_RATIO;
        !(spread_lost || mean_lost)
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Population variance.
    pub fn variance(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.m2 / self.count as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(xs: &[f64]) -> (f64, f64) {
        let n = xs.len() as f64;
        let mean = xs.iter().sum::<f64>() / n;
        let var = xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        (mean, var)
    }

    #[test]
    fn add_matches_batch() {
        let xs = [12.0, 7.5, 300.0, 0.0, 42.42, 42.42];
        let mut s = RunningStats::default();
        xs.iter().for_each(|&x| s.add(x));
        let (mean, var) = batch(&xs);
        assert!((s.mean() - mean).abs() < 1e-9);
        assert!((s.variance() - var).abs() < 1e-6);
    }

    #[test]
    fn remove_from_front_matches_batch_of_remainder() {
        let xs = [5.0, 18.0, 2.5, 1000.0, 31.0];
        let mut s = RunningStats::default();
        xs.iter().for_each(|&x| s.add(x));
        assert!(s.remove(5.0));
        assert!(s.remove(18.0));
        let (mean, var) = batch(&xs[2..]);
        assert_eq!(s.count(), 3);
        assert!((s.mean() - mean).abs() < 1e-9);
        assert!((s.variance() - var).abs() < 1e-6);
    }

    #[test]
    fn removing_a_dominant_outlier_asks_for_rebuild() {
        let mut s = RunningStats::from_values([1e9, 1.0, 2.0, 3.0]);
        assert!(!s.remove(1e9));
        let rebuilt = RunningStats::from_values([1.0, 2.0, 3.0]);
        let (mean, var) = batch(&[1.0, 2.0, 3.0]);
        assert!((rebuilt.mean() - mean).abs() < 1e-12);
        assert!((rebuilt.variance() - var).abs() < 1e-12);
    }

    #[test]
    fn identical_remainder_after_removal_is_flagged() {
        let mut s = RunningStats::from_values([50.0, 7.0, 7.0]);
        assert!(!s.remove(50.0), "all spread came from the removed value");
        let mut s = RunningStats::from_values([7.0, 7.0, 7.0]);
        assert!(s.remove(7.0), "nothing to lose");
    }

    #[test]
    fn removing_last_value_resets() {
        let mut s = RunningStats::default();
        s.add(9.0);
        assert!(s.remove(9.0));
        assert_eq!(s, RunningStats::default());
        assert_eq!(s.variance(), 0.0);
    }
}
