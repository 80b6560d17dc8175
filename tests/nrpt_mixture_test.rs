//! End-to-end tempering runs on analytic targets.
//!
//! The headline check: a plain random walk started in one mode of a
//! well-separated bimodal target never finds the other mode, while the
//! tempered fleet visits both.

use rand::rngs::SmallRng;
use rand::SeedableRng;

use tempered_mcmc::core::{ChainKind, RunOptions};
use tempered_mcmc::distributions::{AnnealingPath, GaussianMixture, IsotropicGaussian};
use tempered_mcmc::driver::sample;
use tempered_mcmc::metropolis::RandomWalk;
use tempered_mcmc::tempering::{Nrpt, NrptOptions};

#[cfg(test)]
mod tests {
    use super::*;

    fn bimodal_path() -> AnnealingPath<GaussianMixture<f64>, IsotropicGaussian<f64>> {
        let target = GaussianMixture::new(vec![vec![-4.0], vec![4.0]], 1.0);
        let reference = IsotropicGaussian::new(6.0);
        AnnealingPath::new(target, reference)
    }

    #[test]
    fn nrpt_visits_both_modes_of_a_bimodal_target() {
        const SEED: u64 = 42;
        const N_SAMPLE: usize = 4_000;

        let sampler = RandomWalk::new(vec![-4.0], 1.2);
        let opts = NrptOptions::default()
            .n_tune(64)
            .n_sample(N_SAMPLE)
            .progress(Some(false));
        let nrpt = Nrpt::new(bimodal_path(), sampler, 6, opts).unwrap();
        let mut rng = SmallRng::seed_from_u64(SEED);
        let output = nrpt.run(&mut rng).unwrap();

        // One chain per rung, ordered by decreasing β, each fully sampled.
        assert_eq!(output.chains.len(), 6);
        assert_eq!(output.chains[0].0, 1.0);
        assert_eq!(output.chains[5].0, 0.0);
        for window in output.chains.windows(2) {
            assert!(window[0].0 > window[1].0);
        }
        for (beta, chain) in &output.chains {
            assert_eq!(chain.len(), N_SAMPLE);
            assert_eq!(chain.kind, ChainKind::Tempered { beta: *beta });
        }

        // The adapted ladder is still a valid ladder.
        assert_eq!(output.ladder.len(), 6);
        assert_eq!(output.ladder[0], 1.0);
        assert_eq!(output.ladder[5], 0.0);
        assert!(output.ladder.windows(2).all(|w| w[0] > w[1]));

        // The barrier estimate is finite and non-negative, as is the
        // derived replica suggestion.
        assert!(output.barrier.is_finite());
        assert!(output.barrier >= 0.0);
        assert!(output.suggested_replicas() >= 0.0);

        // Both modes show up in the target chain.
        let target_chain = output.target_chain();
        let left = target_chain
            .samples
            .column(0)
            .iter()
            .filter(|&&x| x < 0.0)
            .count();
        let right = target_chain.len() - left;
        let floor = N_SAMPLE / 50;
        assert!(left > floor, "left mode underrepresented: {left}");
        assert!(right > floor, "right mode underrepresented: {right}");
    }

    #[test]
    fn plain_random_walk_stays_in_its_starting_mode() {
        const SEED: u64 = 42;
        let path = bimodal_path();
        let mut sampler = RandomWalk::new(vec![-4.0], 1.2);
        let mut rng = SmallRng::seed_from_u64(SEED);
        let opts = RunOptions::default().progress(Some(false));

        let chain = sample(&mut rng, &path, &mut sampler, 4_000, &opts).unwrap();
        let right = chain.samples.column(0).iter().filter(|&&x| x > 0.0).count();
        assert!(
            right < chain.len() / 100,
            "an untempered walk crossed an eight-sigma valley: {right} samples"
        );
    }

    /// Three replicas, a Gaussian target, a tiny tuning budget: the
    /// smallest fully wired run of the engine.
    #[test]
    fn small_deterministic_run_fills_every_buffer() {
        const SEED: u64 = 7;
        let path = AnnealingPath::new(IsotropicGaussian::new(1.0), IsotropicGaussian::new(4.0));
        let sampler = RandomWalk::new(vec![0.5], 0.8);
        let opts = NrptOptions::default()
            .swap_every(1)
            .n_tune(4)
            .n_sample(8)
            .progress(Some(false));
        let nrpt = Nrpt::new(path, sampler, 3, opts).unwrap();
        assert_eq!(nrpt.ladder(), &[1.0, 0.5, 0.0]);

        let mut rng = SmallRng::seed_from_u64(SEED);
        let output = nrpt.run(&mut rng).unwrap();
        assert_eq!(output.chains.len(), 3);
        for (_, chain) in &output.chains {
            assert_eq!(chain.len(), 8);
            assert_eq!(chain.dim(), 1);
        }
        assert!(output.barrier.is_finite());
    }
}
