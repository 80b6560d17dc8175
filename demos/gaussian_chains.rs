//! Four independent random-walk chains on a correlated 2D Gaussian, run on
//! the thread pool and summarized with split-R̂.

use ndarray::Axis;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::error::Error;

use nalgebra::{Matrix2, Vector2};
use tempered_mcmc::core::RunOptions;
use tempered_mcmc::distributions::{AnnealingPath, Gaussian2D, IsotropicGaussian};
use tempered_mcmc::metropolis::RandomWalk;
use tempered_mcmc::parallel::sample_chains;
use tempered_mcmc::stats::max_rhat;

fn main() -> Result<(), Box<dyn Error>> {
    const N_CHAINS: usize = 4;
    const SAMPLE_SIZE: usize = 25_000;
    const BURNIN: usize = 2_500;
    const SEED: u64 = 42;

    let target = Gaussian2D {
        mean: Vector2::new(0.0, 0.0),
        cov: Matrix2::new(2.0, 1.0, 1.0, 2.0),
    };
    let path = AnnealingPath::new(target, IsotropicGaussian::new(10.0));
    let sampler = RandomWalk::new(vec![0.0, 0.0], 1.0);

    let opts = RunOptions::default()
        .discard_initial(BURNIN)
        .progress_name("gaussian");
    let mut rng = SmallRng::seed_from_u64(SEED);
    let chains = sample_chains(&mut rng, &path, &sampler, N_CHAINS, SAMPLE_SIZE, &opts)?;

    for (index, chain) in chains.iter().enumerate() {
        let mean = chain.samples.mean_axis(Axis(0)).unwrap();
        println!(
            "Chain {index}: {} samples, mean ({:.3}, {:.3}), took {:?}",
            chain.len(),
            mean[0],
            mean[1],
            chain.stats.duration
        );
    }

    let matrices: Vec<_> = chains.iter().map(|chain| chain.samples.clone()).collect();
    println!("Split-Rhat: {:.4}", max_rhat(&matrices)?);

    Ok(())
}
