/*!
# Non-reversible parallel tempering (NRPT)

The controller owns a fleet of replicas of one tempered sampler, each
pinned to a rung of the β-ladder, and drives them through two phases:

- **Tune.** `⌊log₂ N_tune⌋` rounds; round `r` runs `r` phases, and phase
  `n` runs `2^(n−1)` DEO iterations. After every phase the per-pair
  rejection averages are folded into the communication barrier and the
  ladder is re-placed to equidistribute it
  ([`crate::ladder::update_betas`]). Nothing is recorded during tuning.
- **Sample.** `N_sample` further DEO iterations, each writing exactly one
  sample per β. At the transition the controller reports `2·Λ(1)`, the
  estimated replica count needed for efficient mixing.

One DEO iteration explores every replica sequentially (replica `i`
finishes before `i+1` starts) and then, when the global iteration count is
divisible by `swap_every`, runs one swap sweep whose parity strictly
alternates with the sweep count ([`crate::swap`]). Accepted swaps exchange
the β values of the two replicas; states never move between replica slots,
and a rank-to-slot permutation keeps the ladder addressing stable.

The whole engine is single-threaded by design: parallelism belongs to the
independent-chain drivers in [`crate::parallel`], not to the replica loop.
*/

use std::time::{Instant, SystemTime};

use rand::rngs::SmallRng;

use crate::core::{ChainKind, RunStats, Sampler, Tempered};
use crate::error::{Error, Result};
use crate::ladder::update_betas;
use crate::progress::ProgressReporter;
use crate::swap::{deo_sweep, Parity};

/// Options for one NRPT run.
#[derive(Debug, Clone)]
pub struct NrptOptions {
    /// Attempt a swap sweep every `swap_every` DEO iterations (≥ 1).
    pub swap_every: usize,
    /// Tuning budget; `⌊log₂ N_tune⌋` rounds are run (≥ 2, ideally a
    /// power of two).
    pub n_tune: usize,
    /// Number of retained samples per β (≥ 1).
    pub n_sample: usize,
    /// Per-run progress override; `None` uses the process-wide flag.
    pub progress: Option<bool>,
    /// Label shown by the progress reporter.
    pub progress_name: String,
}

impl Default for NrptOptions {
    fn default() -> Self {
        Self {
            swap_every: 1,
            n_tune: 32,
            n_sample: 1_000,
            progress: None,
            progress_name: "nrpt".to_string(),
        }
    }
}

impl NrptOptions {
    pub fn swap_every(mut self, swap_every: usize) -> Self {
        self.swap_every = swap_every;
        self
    }

    pub fn n_tune(mut self, n_tune: usize) -> Self {
        self.n_tune = n_tune;
        self
    }

    pub fn n_sample(mut self, n_sample: usize) -> Self {
        self.n_sample = n_sample;
        self
    }

    pub fn progress(mut self, progress: Option<bool>) -> Self {
        self.progress = progress;
        self
    }

    pub fn progress_name(mut self, name: impl Into<String>) -> Self {
        self.progress_name = name.into();
        self
    }

    fn validate(&self) -> Result<()> {
        if self.swap_every < 1 {
            return Err(Error::InvalidArgument("swap_every must be >= 1".to_string()));
        }
        if self.n_tune < 2 {
            return Err(Error::InvalidArgument("n_tune must be >= 2".to_string()));
        }
        if self.n_sample < 1 {
            return Err(Error::InvalidArgument("n_sample must be >= 1".to_string()));
        }
        Ok(())
    }
}

/// The chains and diagnostics produced by one NRPT run.
#[derive(Debug)]
pub struct NrptOutput<C> {
    /// One chain per β, ordered by decreasing β; the first entry is the
    /// target (β = 1).
    pub chains: Vec<(f64, C)>,
    /// The ladder after the final adaptation.
    pub ladder: Vec<f64>,
    /// Λ(1), the total communication barrier from the last tune phase.
    pub barrier: f64,
}

impl<C> NrptOutput<C> {
    /// `2·Λ(1)`: the replica count at which the barrier would
    /// equidistribute comfortably.
    pub fn suggested_replicas(&self) -> f64 {
        2.0 * self.barrier
    }

    /// The β = 1 chain.
    pub fn target_chain(&self) -> &C {
        &self.chains[0].1
    }
}

/// Non-reversible parallel tempering over a fleet of replicas of one
/// tempered sampler.
pub struct Nrpt<M, S: Sampler<M> + Tempered> {
    model: M,
    samplers: Vec<S>,
    ladder: Vec<f64>,
    /// `rank_to_slot[k]` is the replica currently holding `ladder[k]`.
    rank_to_slot: Vec<usize>,
    rejections: Vec<f64>,
    phase_sweeps: usize,
    total_sweeps: usize,
    iteration: usize,
    barrier_total: f64,
    opts: NrptOptions,
}

impl<M, S: Sampler<M> + Tempered> Nrpt<M, S> {
    /// Builds an engine with `n_replicas` replicas on the uniformly
    /// spaced ladder from 1.0 down to 0.0.
    pub fn new(model: M, sampler: S, n_replicas: usize, opts: NrptOptions) -> Result<Self> {
        if n_replicas < 2 {
            return Err(Error::InvalidArgument(
                "tempering needs at least two replicas".to_string(),
            ));
        }
        let ladder: Vec<f64> = (0..n_replicas)
            .map(|i| 1.0 - i as f64 / (n_replicas - 1) as f64)
            .collect();
        Self::with_ladder(model, sampler, ladder, opts)
    }

    /// Builds an engine on an explicit ladder, which must be strictly
    /// decreasing from 1.0 to 0.0.
    pub fn with_ladder(model: M, sampler: S, ladder: Vec<f64>, opts: NrptOptions) -> Result<Self> {
        opts.validate()?;
        if ladder.len() < 2 {
            return Err(Error::InvalidArgument(
                "tempering needs at least two replicas".to_string(),
            ));
        }
        if ladder.windows(2).any(|w| w[0] <= w[1])
            || ladder[0] != 1.0
            || ladder[ladder.len() - 1] != 0.0
        {
            return Err(Error::InvalidArgument(format!(
                "the ladder must decrease strictly from 1.0 to 0.0, got {ladder:?}"
            )));
        }

        let samplers: Vec<S> = ladder
            .iter()
            .map(|&beta| {
                let mut replica = sampler.clone();
                replica.set_beta(beta);
                replica
            })
            .collect();
        let n = ladder.len();
        Ok(Self {
            model,
            samplers,
            rank_to_slot: (0..n).collect(),
            rejections: vec![0.0; n - 1],
            phase_sweeps: 0,
            total_sweeps: 0,
            iteration: 0,
            barrier_total: 0.0,
            ladder,
            opts,
        })
    }

    /// The current ladder, by decreasing β.
    pub fn ladder(&self) -> &[f64] {
        &self.ladder
    }

    /// Runs tune and sample phases to completion and bundles one chain
    /// per β.
    pub fn run(mut self, rng: &mut SmallRng) -> Result<NrptOutput<S::Chain>> {
        let n_replicas = self.samplers.len();
        let max_round = self.opts.n_tune.ilog2() as usize;
        let tune_iterations: usize = (1..=max_round).map(|round| (1 << round) - 1).sum();
        let total = (tune_iterations + self.opts.n_sample) as u64;

        let mut progress = ProgressReporter::bounded(
            self.opts
                .progress
                .unwrap_or_else(crate::progress::progress_enabled),
            &self.opts.progress_name,
            total,
        );
        let start = SystemTime::now();
        let clock = Instant::now();

        let mut states: Vec<S::State> = Vec::with_capacity(n_replicas);
        for sampler in &mut self.samplers {
            let (_, state) = sampler.initial_step(rng, &self.model)?;
            states.push(state);
        }

        // Tune: adapt the ladder after every phase, recording nothing.
        for round in 1..=max_round {
            for phase in 1..=round {
                for _ in 0..(1usize << (phase - 1)) {
                    self.deo_iteration(rng, &mut states)?;
                    progress.update(self.iteration as u64);
                }
                self.adapt()?;
            }
        }

        progress.println(&format!(
            "communication barrier {:.4}; about {:.1} replicas needed to equidistribute",
            self.barrier_total,
            2.0 * self.barrier_total
        ));

        // Sample: one sample per β per iteration.
        let mut buffers: Vec<Option<S::Buffer>> = (0..n_replicas).map(|_| None).collect();
        for index in 1..=self.opts.n_sample {
            let mut samples: Vec<Option<S::Sample>> = self
                .deo_iteration(rng, &mut states)?
                .into_iter()
                .map(Some)
                .collect();
            for rank in 0..n_replicas {
                let slot = self.rank_to_slot[rank];
                let sample = samples[slot]
                    .take()
                    .expect("rank-to-slot permutation is a bijection");
                let sampler = &self.samplers[slot];
                let buffer = buffers[rank].get_or_insert_with(|| {
                    sampler.new_buffer(&self.model, &sample, self.opts.n_sample)
                });
                sampler.save(buffer, sample, index, &self.model, self.opts.n_sample);
            }
            progress.update((tune_iterations + index) as u64);
        }
        progress.finish();

        let stats = RunStats {
            start,
            stop: SystemTime::now(),
            duration: clock.elapsed(),
        };
        let mut chains = Vec::with_capacity(n_replicas);
        for (rank, buffer) in buffers.into_iter().enumerate() {
            let beta = self.ladder[rank];
            let slot = self.rank_to_slot[rank];
            let buffer = buffer.expect("every rank was written during sampling");
            let chain = self.samplers[slot].bundle(
                buffer,
                &self.model,
                &states[slot],
                ChainKind::Tempered { beta },
                stats,
            );
            chains.push((beta, chain));
        }

        Ok(NrptOutput {
            chains,
            ladder: self.ladder,
            barrier: self.barrier_total,
        })
    }

    /// One DEO iteration: sequential local exploration, then a swap sweep
    /// when the iteration count is divisible by `swap_every`.
    fn deo_iteration(
        &mut self,
        rng: &mut SmallRng,
        states: &mut Vec<S::State>,
    ) -> Result<Vec<S::Sample>> {
        let mut samples = Vec::with_capacity(states.len());
        let mut next_states = Vec::with_capacity(states.len());
        for (sampler, state) in self.samplers.iter_mut().zip(states.drain(..)) {
            let (sample, state) = sampler.next_step(rng, &self.model, state)?;
            samples.push(sample);
            next_states.push(state);
        }
        *states = next_states;

        self.iteration += 1;
        if self.iteration % self.opts.swap_every == 0 {
            self.total_sweeps += 1;
            self.phase_sweeps += 1;
            let parity = Parity::from_sweep(self.total_sweeps);
            let by_rank: Vec<&S::State> =
                self.rank_to_slot.iter().map(|&slot| &states[slot]).collect();
            let accepted = deo_sweep(&self.ladder, &by_rank, parity, &mut self.rejections, rng);
            for pair in accepted {
                let (a, b) = (self.rank_to_slot[pair], self.rank_to_slot[pair + 1]);
                let beta_a = self.samplers[a].beta();
                let beta_b = self.samplers[b].beta();
                self.samplers[a].set_beta(beta_b);
                self.samplers[b].set_beta(beta_a);
                self.rank_to_slot.swap(pair, pair + 1);
            }
        }
        Ok(samples)
    }

    /// Ends a tune phase: average the accumulated rejections over the
    /// phase's sweeps and re-place the ladder on the refreshed barrier.
    fn adapt(&mut self) -> Result<()> {
        if self.phase_sweeps == 0 {
            // A phase shorter than swap_every has no statistics to act on.
            return Ok(());
        }
        let averaged: Vec<f64> = self
            .rejections
            .iter()
            .map(|r| r / self.phase_sweeps as f64)
            .collect();
        self.barrier_total = averaged.iter().sum();
        let ladder = update_betas(&self.ladder, &averaged).map_err(|err| match err {
            Error::Numeric(msg) => {
                Error::Numeric(format!("{msg} (ladder at failure: {:?})", self.ladder))
            }
            other => other,
        })?;
        self.ladder = ladder;
        for (rank, &slot) in self.rank_to_slot.iter().enumerate() {
            self.samplers[slot].set_beta(self.ladder[rank]);
        }
        self.rejections.fill(0.0);
        self.phase_sweeps = 0;
        Ok(())
    }
}
