//! Chain summary statistics: streaming moments and the split-R̂
//! convergence diagnostic.
//!
//! [`ChainStats`] accumulates mean and variance one sample at a time, so a
//! convergence predicate (see [`crate::driver::sample_until`]) can watch a
//! run without buffering it twice. [`split_rhat`] compares within- and
//! between-half variances across finished chains.

use ndarray::{Array1, Array2, ArrayView1, Axis};
use ndarray_stats::QuantileExt;

use crate::error::{Error, Result};

/// Streaming per-dimension mean and variance (Welford's update).
#[derive(Debug, Clone, PartialEq)]
pub struct ChainStats {
    n: usize,
    mean: Array1<f64>,
    m2: Array1<f64>,
}

impl ChainStats {
    pub fn new(dim: usize) -> Self {
        Self {
            n: 0,
            mean: Array1::zeros(dim),
            m2: Array1::zeros(dim),
        }
    }

    /// Folds one sample into the running moments.
    pub fn push(&mut self, sample: &[f64]) -> Result<()> {
        if sample.len() != self.mean.len() {
            return Err(Error::InvalidArgument(format!(
                "sample dimension {} does not match tracker dimension {}",
                sample.len(),
                self.mean.len()
            )));
        }
        self.n += 1;
        let x = ArrayView1::from(sample);
        let delta = &x - &self.mean;
        self.mean = &self.mean + &delta / self.n as f64;
        let delta2 = &x - &self.mean;
        self.m2 = &self.m2 + &delta * &delta2;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }

    pub fn mean(&self) -> ArrayView1<f64> {
        self.mean.view()
    }

    /// Unbiased sample variance per dimension; zero until two samples
    /// have been seen.
    pub fn variance(&self) -> Array1<f64> {
        if self.n < 2 {
            return Array1::zeros(self.mean.len());
        }
        &self.m2 / (self.n - 1) as f64
    }
}

/// Split-R̂ per dimension over a set of equally shaped chains.
///
/// Each chain is split in half, and the potential scale reduction factor
/// is computed over the resulting `2 * chains` sequences. Values near 1
/// indicate the chains agree; values well above 1 indicate they have not
/// mixed. Requires at least four samples per chain.
pub fn split_rhat(chains: &[Array2<f64>]) -> Result<Array1<f64>> {
    let Some(first) = chains.first() else {
        return Err(Error::InvalidArgument(
            "at least one chain is required".to_string(),
        ));
    };
    let (len, dim) = first.dim();
    if len < 4 {
        return Err(Error::InvalidArgument(
            "split-rhat needs at least four samples per chain".to_string(),
        ));
    }
    if chains.iter().any(|c| c.dim() != (len, dim)) {
        return Err(Error::InvalidArgument(
            "all chains must have the same shape".to_string(),
        ));
    }

    let half = len / 2;
    let splits: Vec<_> = chains
        .iter()
        .flat_map(|chain| {
            [
                chain.slice(ndarray::s![..half, ..]),
                chain.slice(ndarray::s![len - half.., ..]),
            ]
        })
        .collect();

    let m = splits.len() as f64;
    let n = half as f64;

    let means: Vec<Array1<f64>> = splits
        .iter()
        .map(|s| s.mean_axis(Axis(0)).expect("split halves are non-empty"))
        .collect();
    let variances: Vec<Array1<f64>> = splits
        .iter()
        .zip(means.iter())
        .map(|(split, mean)| {
            let centered = split.to_owned() - mean.view().insert_axis(Axis(0));
            centered.mapv(|v| v * v).sum_axis(Axis(0)) / (n - 1.0)
        })
        .collect();

    let mut grand = Array1::<f64>::zeros(dim);
    for mean in &means {
        grand = grand + mean;
    }
    grand /= m;

    let mut between = Array1::<f64>::zeros(dim);
    for mean in &means {
        let diff = mean - &grand;
        between = between + diff.mapv(|v| v * v);
    }
    between *= n / (m - 1.0);

    let mut within = Array1::<f64>::zeros(dim);
    for variance in &variances {
        within = within + variance;
    }
    within /= m;

    let pooled = within.mapv(|w| w * (n - 1.0) / n) + between.mapv(|b| b / n);
    Ok((pooled / within).mapv(f64::sqrt))
}

/// The largest split-R̂ across dimensions, the usual scalar summary.
pub fn max_rhat(chains: &[Array2<f64>]) -> Result<f64> {
    let rhat = split_rhat(chains)?;
    let max = rhat
        .max()
        .map_err(|e| Error::Numeric(format!("split-rhat reduction failed: {e}")))?;
    Ok(*max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Axis;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};
    use rand_distr::StandardNormal;

    fn gaussian_chain(rng: &mut SmallRng, len: usize, shift: f64) -> Array2<f64> {
        let mut chain = Array2::zeros((len, 2));
        for mut row in chain.rows_mut() {
            let a: f64 = rng.sample(StandardNormal);
            let b: f64 = rng.sample(StandardNormal);
            row[0] = a + shift;
            row[1] = b - shift;
        }
        chain
    }

    #[test]
    fn running_moments_match_batch_moments() {
        let mut rng = SmallRng::seed_from_u64(3);
        let chain = gaussian_chain(&mut rng, 500, 0.7);

        let mut stats = ChainStats::new(2);
        for row in chain.rows() {
            stats.push(row.as_slice().unwrap()).unwrap();
        }
        assert_eq!(stats.len(), 500);

        let batch_mean = chain.mean_axis(Axis(0)).unwrap();
        let centered = &chain - &batch_mean.view().insert_axis(Axis(0));
        let batch_var = centered.mapv(|v| v * v).sum_axis(Axis(0)) / 499.0;

        for d in 0..2 {
            assert_abs_diff_eq!(stats.mean()[d], batch_mean[d], epsilon = 1e-10);
            assert_abs_diff_eq!(stats.variance()[d], batch_var[d], epsilon = 1e-10);
        }
    }

    #[test]
    fn dimension_mismatch_is_rejected() {
        let mut stats = ChainStats::new(3);
        assert!(matches!(
            stats.push(&[1.0, 2.0]),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn rhat_is_near_one_for_identically_distributed_chains() {
        let mut rng = SmallRng::seed_from_u64(11);
        let chains = vec![
            gaussian_chain(&mut rng, 1_000, 0.0),
            gaussian_chain(&mut rng, 1_000, 0.0),
            gaussian_chain(&mut rng, 1_000, 0.0),
        ];
        let max = max_rhat(&chains).unwrap();
        assert!(max < 1.1, "expected mixed chains, got rhat {max}");
    }

    #[test]
    fn rhat_flags_disjoint_chains() {
        let mut rng = SmallRng::seed_from_u64(13);
        let chains = vec![
            gaussian_chain(&mut rng, 1_000, 0.0),
            gaussian_chain(&mut rng, 1_000, 8.0),
        ];
        let max = max_rhat(&chains).unwrap();
        assert!(max > 1.5, "expected unmixed chains, got rhat {max}");
    }

    #[test]
    fn short_chains_are_rejected() {
        let chains = vec![Array2::<f64>::zeros((3, 1))];
        assert!(matches!(
            split_rhat(&chains),
            Err(Error::InvalidArgument(_))
        ));
    }
}
