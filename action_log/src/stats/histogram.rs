use crate::errors::StatsError;

/// Fixed-bucket counter over caller-supplied finite boundaries.
///
/// Boundaries are deduplicated and sorted once at construction; implicit
/// -inf/+inf sentinels bound the outer buckets. Bucket `i` covers
/// `[bounds[i-1], bounds[i])`.
#[derive(Debug, Clone)]
pub struct HistogramCounter {
    bounds: Vec<f64>,
    counts: Vec<u64>,
}

impl HistogramCounter {
    pub fn new(bounds: &[f64]) -> Result<Self, StatsError> {
        if bounds.is_empty() {
            return Err(StatsError::NoBounds);
        }
        let mut sorted = Vec::with_capacity(bounds.len());
        for &bound in bounds {
            if !bound.is_finite() {
                return Err(StatsError::InvalidBound(bound));
            }
            sorted.push(bound);
        }
        sorted.sort_by(f64::total_cmp);
        sorted.dedup();
        let counts = vec![0; sorted.len() + 1];
        Ok(Self {
            bounds: sorted,
            counts,
        })
    }

    pub fn add(&mut self, value: f64) {
        let bucket = self.bounds.partition_point(|&bound| bound <= value);
        self.counts[bucket] += 1;
    }

    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Bucket edges and counts, in ascending order. `None` edges are the
    /// -inf/+inf sentinels.
    pub fn buckets(&self) -> impl Iterator<Item = (Option<f64>, Option<f64>, u64)> + '_ {
        self.counts.iter().enumerate().map(move |(i, &count)| {
            let lower = if i == 0 { None } else { Some(self.bounds[i - 1]) };
            let upper = self.bounds.get(i).copied();
            (lower, upper, count)
        })
    }

    pub fn bucket_count(&self) -> usize {
        self.counts.len()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn nan_bounds_are_rejected() {
        match HistogramCounter::new(&[1.0, f64::NAN]) {
            Err(StatsError::InvalidBound(b)) => assert!(b.is_nan()),
            other => panic!("expected InvalidBound, got {other:?}"),
        }
        assert_eq!(
            Err(StatsError::InvalidBound(f64::INFINITY)),
            HistogramCounter::new(&[f64::INFINITY]).map(|_| ())
        );
        assert_eq!(Err(StatsError::NoBounds), HistogramCounter::new(&[]).map(|_| ()));
    }

    #[test]
    fn bounds_are_deduplicated_and_sorted() {
        let hist = HistogramCounter::new(&[10.0, 1.0, 10.0, 5.0]).expect("finite bounds");
        assert_eq!(4, hist.bucket_count());
        let edges: Vec<_> = hist.buckets().map(|(lo, hi, _)| (lo, hi)).collect();
        assert_eq!(
            vec![
                (None, Some(1.0)),
                (Some(1.0), Some(5.0)),
                (Some(5.0), Some(10.0)),
                (Some(10.0), None),
            ],
            edges
        );
    }

    #[test]
    fn values_land_in_half_open_buckets() {
        let mut hist = HistogramCounter::new(&[0.0, 10.0]).expect("finite bounds");
        hist.add(-3.0); // below all bounds
        hist.add(0.0); // at a bound: belongs to the bucket it opens
        hist.add(5.0);
        hist.add(10.0);
        hist.add(250.0);
        let counts: Vec<u64> = hist.buckets().map(|(_, _, c)| c).collect();
        assert_eq!(vec![1, 2, 2], counts);
        assert_eq!(5, hist.total());
    }
}
