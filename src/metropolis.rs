/*!
# Tempered random-walk Metropolis kernel

A random-walk Metropolis sampler over an [`AnnealingPath`]: proposals are
isotropic Gaussian perturbations, and the acceptance ratio is evaluated
under the annealed density `β·log target + (1 − β)·log reference`. At
β = 1 this is plain Metropolis–Hastings on the target; lowering β relaxes
the walk towards the reference.

The state caches both component log-densities, so a ladder update
(`set_beta`) never forces a re-evaluation of the model, and the swap
engine can read `log target − log reference` straight off the state.

# Examples

```rust
use rand::rngs::SmallRng;
use rand::SeedableRng;
use tempered_mcmc::core::{RunOptions, Sampler};
use tempered_mcmc::distributions::{AnnealingPath, IsotropicGaussian};
use tempered_mcmc::driver::sample;
use tempered_mcmc::metropolis::RandomWalk;

let path = AnnealingPath::new(IsotropicGaussian::new(1.0), IsotropicGaussian::new(5.0));
let mut sampler = RandomWalk::new(vec![0.0, 0.0], 0.8);
let mut rng = SmallRng::seed_from_u64(42);
let opts = RunOptions::default().progress(Some(false));
let chain = sample(&mut rng, &path, &mut sampler, 100, &opts).unwrap();
assert_eq!(chain.len(), 100);
```
*/

use rand::rngs::SmallRng;
use rand::Rng;
use rand_distr::StandardNormal;

use crate::core::{Chain, ChainKind, RunStats, SampleBuffer, Sampler, SamplerState, Tempered};
use crate::distributions::{AnnealingPath, TargetDistribution};
use crate::error::{Error, Result};

/// Random-walk Metropolis kernel with an isotropic Gaussian proposal.
#[derive(Debug, Clone)]
pub struct RandomWalk {
    /// Standard deviation of the proposal perturbation per coordinate.
    pub proposal_std: f64,
    beta: f64,
    initial: Vec<f64>,
}

impl RandomWalk {
    /// Creates a kernel starting at `initial` with the given proposal
    /// scale, pinned to the target (β = 1).
    pub fn new(initial: Vec<f64>, proposal_std: f64) -> Self {
        Self {
            proposal_std,
            beta: 1.0,
            initial,
        }
    }
}

impl Tempered for RandomWalk {
    fn beta(&self) -> f64 {
        self.beta
    }

    fn set_beta(&mut self, beta: f64) {
        debug_assert!((0.0..=1.0).contains(&beta), "beta must lie in [0, 1]");
        self.beta = beta;
    }
}

/// Current position of a random walk plus the cached component
/// log-densities at that position.
#[derive(Debug, Clone)]
pub struct WalkerState {
    pub position: Vec<f64>,
    pub target_lp: f64,
    pub reference_lp: f64,
}

impl WalkerState {
    fn annealed(&self, beta: f64) -> f64 {
        beta * self.target_lp + (1.0 - beta) * self.reference_lp
    }
}

impl SamplerState for WalkerState {
    /// `log target − log reference`: the quantity the swap engine
    /// differences across a replica pair.
    fn log_density(&self) -> f64 {
        self.target_lp - self.reference_lp
    }
}

impl<D, R> Sampler<AnnealingPath<D, R>> for RandomWalk
where
    D: TargetDistribution<Vec<f64>, f64>,
    R: TargetDistribution<Vec<f64>, f64>,
{
    type Sample = Vec<f64>;
    type State = WalkerState;
    type Buffer = SampleBuffer;
    type Chain = Chain;

    fn initial_step(
        &mut self,
        _rng: &mut SmallRng,
        model: &AnnealingPath<D, R>,
    ) -> Result<(Self::Sample, Self::State)> {
        let target_lp = model.target_log_prob(&self.initial);
        let reference_lp = model.reference_log_prob(&self.initial);
        if !target_lp.is_finite() || !reference_lp.is_finite() {
            return Err(Error::sampler(format!(
                "non-finite log-density at the initial point {:?}",
                self.initial
            )));
        }
        let state = WalkerState {
            position: self.initial.clone(),
            target_lp,
            reference_lp,
        };
        Ok((self.initial.clone(), state))
    }

    fn next_step(
        &mut self,
        rng: &mut SmallRng,
        model: &AnnealingPath<D, R>,
        state: Self::State,
    ) -> Result<(Self::Sample, Self::State)> {
        let proposed: Vec<f64> = state
            .position
            .iter()
            .map(|&x| {
                let z: f64 = rng.sample(StandardNormal);
                x + self.proposal_std * z
            })
            .collect();
        let target_lp = model.target_log_prob(&proposed);
        let reference_lp = model.reference_log_prob(&proposed);

        let current = state.annealed(self.beta);
        let candidate = self.beta * target_lp + (1.0 - self.beta) * reference_lp;

        // NaN candidates compare false and are rejected.
        let log_accept_ratio = candidate - current;
        let u: f64 = rng.gen();
        let next = if log_accept_ratio > u.ln() {
            WalkerState {
                position: proposed,
                target_lp,
                reference_lp,
            }
        } else {
            state
        };
        Ok((next.position.clone(), next))
    }

    fn new_buffer(
        &self,
        _model: &AnnealingPath<D, R>,
        first: &Self::Sample,
        n_hint: usize,
    ) -> Self::Buffer {
        SampleBuffer::with_capacity(first.len(), n_hint)
    }

    fn save(
        &self,
        buffer: &mut Self::Buffer,
        sample: Self::Sample,
        index: usize,
        _model: &AnnealingPath<D, R>,
        _n_hint: usize,
    ) {
        buffer.push(&sample, index);
    }

    fn bundle(
        &self,
        buffer: Self::Buffer,
        _model: &AnnealingPath<D, R>,
        _final_state: &Self::State,
        kind: ChainKind,
        stats: RunStats,
    ) -> Self::Chain {
        Chain {
            samples: buffer.into_array(),
            kind,
            stats,
        }
    }
}
