/*!
# Sampler contract

The drivers in this crate are generic over a sampler: anything that can
produce an initial `(sample, state)` pair, advance the state one transition
at a time, and collect the retained samples into a chain. The contract is
split into five operations so that drivers never look inside samples or
states:

- [`Sampler::initial_step`] / [`Sampler::next_step`] advance the chain,
- [`Sampler::new_buffer`] / [`Sampler::save`] collect retained samples,
- [`Sampler::bundle`] turns a buffer into the final chain value.

States are opaque to the drivers except for one observable: the current
log-density ([`SamplerState::log_density`]), which the replica-exchange
engine differences across adjacent temperatures. Samplers that participate
in tempering additionally expose their inverse temperature through
[`Tempered`].

[`SampleBuffer`] and [`Chain`] are the standard buffer/chain pair for
samplers whose samples are `Vec<f64>` points; custom samplers are free to
use their own associated types instead.
*/

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use ndarray::Array2;
use rand::rngs::SmallRng;

use crate::error::Result;
use crate::progress::progress_enabled;

/// The one observable drivers require of a sampler state: the log-density
/// at the state's current point, as consumed by the swap engine.
pub trait SamplerState {
    fn log_density(&self) -> f64;
}

/// Samplers whose target is annealed by an inverse temperature β ∈ [0, 1].
///
/// β = 1 is the target posterior, β = 0 the reference. Each replica owns
/// its β; the tempering controller rewrites it after every ladder update,
/// so future steps of that replica must see the new value.
pub trait Tempered {
    fn beta(&self) -> f64;
    fn set_beta(&mut self, beta: f64);
}

/// A transition kernel usable by the sequential, convergence, parallel,
/// and tempering drivers.
///
/// `Clone` is required so the parallel drivers can hand each worker a deep
/// copy. Buffers are append-only: `save` must be called with strictly
/// increasing 1-based indices, and out-of-order indices are a programmer
/// error. `bundle` may post-process (warm-up flagging, metadata) but must
/// not re-execute the chain.
pub trait Sampler<M>: Clone {
    type Sample;
    type State: SamplerState;
    type Buffer;
    type Chain;

    /// Draws the first `(sample, state)` pair.
    fn initial_step(&mut self, rng: &mut SmallRng, model: &M)
        -> Result<(Self::Sample, Self::State)>;

    /// Advances the chain by one transition.
    fn next_step(
        &mut self,
        rng: &mut SmallRng,
        model: &M,
        state: Self::State,
    ) -> Result<(Self::Sample, Self::State)>;

    /// Creates an empty buffer sized for roughly `n_hint` samples shaped
    /// like `first`.
    fn new_buffer(&self, model: &M, first: &Self::Sample, n_hint: usize) -> Self::Buffer;

    /// Appends `sample` at the 1-based `index`.
    fn save(
        &self,
        buffer: &mut Self::Buffer,
        sample: Self::Sample,
        index: usize,
        model: &M,
        n_hint: usize,
    );

    /// Turns the buffer into the final chain value.
    fn bundle(
        &self,
        buffer: Self::Buffer,
        model: &M,
        final_state: &Self::State,
        kind: ChainKind,
        stats: RunStats,
    ) -> Self::Chain;
}

/// Tag forwarded to [`Sampler::bundle`] describing what the chain holds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChainKind {
    /// Samples from the target density itself.
    Posterior,
    /// Samples from the annealed density at the given inverse temperature.
    Tempered { beta: f64 },
}

impl Default for ChainKind {
    fn default() -> Self {
        ChainKind::Posterior
    }
}

/// Wall-clock record of a single driver run, forwarded to `bundle`.
#[derive(Debug, Clone, Copy)]
pub struct RunStats {
    pub start: SystemTime,
    pub stop: SystemTime,
    pub duration: Duration,
}

/// Per-sample hook invoked by the drivers on every retained sample.
pub type Callback<M, S> = Arc<
    dyn Fn(
            &mut SmallRng,
            &M,
            &S,
            &<S as Sampler<M>>::Sample,
            &<S as Sampler<M>>::State,
            usize,
        ) -> Result<()>
        + Send
        + Sync,
>;

/// Options understood by the sequential and convergence drivers
/// (and forwarded per chain by the parallel drivers).
///
/// ```
/// use tempered_mcmc::core::RunOptions;
/// use tempered_mcmc::distributions::{AnnealingPath, IsotropicGaussian};
/// use tempered_mcmc::metropolis::RandomWalk;
///
/// type Path = AnnealingPath<IsotropicGaussian<f64>, IsotropicGaussian<f64>>;
/// let opts: RunOptions<Path, RandomWalk> = RunOptions::default()
///     .discard_initial(500)
///     .thinning(4)
///     .progress(Some(false));
/// assert_eq!(opts.thinning, 4);
/// ```
pub struct RunOptions<M, S: Sampler<M>> {
    /// Warm-up iterations dropped before the first retained sample.
    pub discard_initial: usize,
    /// Keep one sample every `thinning` post-warm-up transitions (≥ 1).
    pub thinning: usize,
    /// Per-run progress override; `None` uses the process-wide flag.
    pub progress: Option<bool>,
    /// Label shown by the progress reporter.
    pub progress_name: String,
    /// Tag forwarded to `bundle`.
    pub kind: ChainKind,
    /// Hook invoked on every retained sample; a callback error is fatal.
    pub callback: Option<Callback<M, S>>,
}

impl<M, S: Sampler<M>> Default for RunOptions<M, S> {
    fn default() -> Self {
        Self {
            discard_initial: 0,
            thinning: 1,
            progress: None,
            progress_name: "sampling".to_string(),
            kind: ChainKind::Posterior,
            callback: None,
        }
    }
}

impl<M, S: Sampler<M>> Clone for RunOptions<M, S> {
    fn clone(&self) -> Self {
        Self {
            discard_initial: self.discard_initial,
            thinning: self.thinning,
            progress: self.progress,
            progress_name: self.progress_name.clone(),
            kind: self.kind,
            callback: self.callback.clone(),
        }
    }
}

impl<M, S: Sampler<M>> RunOptions<M, S> {
    pub fn discard_initial(mut self, discard_initial: usize) -> Self {
        self.discard_initial = discard_initial;
        self
    }

    pub fn thinning(mut self, thinning: usize) -> Self {
        self.thinning = thinning;
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

    pub fn kind(mut self, kind: ChainKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn callback(mut self, callback: Callback<M, S>) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Resolves the effective progress switch for this run.
    pub(crate) fn progress_or_default(&self) -> bool {
        self.progress.unwrap_or_else(progress_enabled)
    }

    /// A copy of these options labelled for one chain of a multi-chain run.
    pub(crate) fn for_chain(&self, index: usize) -> Self {
        let mut opts = self.clone();
        opts.progress_name = format!("{} (chain {index})", self.progress_name);
        opts
    }
}

/// Append-only buffer of flat `Vec<f64>` samples.
///
/// Tracks its own count, so a partially filled buffer can still be bundled.
#[derive(Debug, Clone, Default)]
pub struct SampleBuffer {
    data: Vec<f64>,
    dim: usize,
    count: usize,
}

impl SampleBuffer {
    pub fn with_capacity(dim: usize, n_hint: usize) -> Self {
        Self {
            data: Vec::with_capacity(dim * n_hint),
            dim,
            count: 0,
        }
    }

    /// Appends `sample` at the 1-based `index`.
    pub fn push(&mut self, sample: &[f64], index: usize) {
        debug_assert_eq!(index, self.count + 1, "samples must be saved in order");
        debug_assert_eq!(sample.len(), self.dim, "sample dimension changed");
        self.data.extend_from_slice(sample);
        self.count += 1;
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// The collected samples as a `count × dim` matrix.
    pub fn into_array(self) -> Array2<f64> {
        Array2::from_shape_vec((self.count, self.dim), self.data)
            .expect("buffer length is count * dim by construction")
    }
}

/// A finished chain: retained samples (rows) by dimension (columns),
/// plus the kind tag and the wall-clock stats of the run that produced it.
#[derive(Debug, Clone)]
pub struct Chain {
    pub samples: Array2<f64>,
    pub kind: ChainKind,
    pub stats: RunStats,
}

impl Chain {
    /// Number of retained samples.
    pub fn len(&self) -> usize {
        self.samples.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.nrows() == 0
    }

    /// Dimensionality of each sample.
    pub fn dim(&self) -> usize {
        self.samples.ncols()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_collects_in_order() {
        let mut buffer = SampleBuffer::with_capacity(2, 3);
        buffer.push(&[1.0, 2.0], 1);
        buffer.push(&[3.0, 4.0], 2);
        assert_eq!(buffer.len(), 2);
        let arr = buffer.into_array();
        assert_eq!(arr.shape(), &[2, 2]);
        assert_eq!(arr[[1, 0]], 3.0);
    }

    #[test]
    #[should_panic(expected = "saved in order")]
    fn buffer_rejects_out_of_order_indices() {
        let mut buffer = SampleBuffer::with_capacity(1, 2);
        buffer.push(&[1.0], 1);
        buffer.push(&[2.0], 3);
    }

    #[test]
    fn empty_buffer_bundles_to_empty_matrix() {
        let buffer = SampleBuffer::with_capacity(3, 0);
        let arr = buffer.into_array();
        assert_eq!(arr.shape(), &[0, 3]);
    }

    #[test]
    fn chain_kind_defaults_to_posterior() {
        assert_eq!(ChainKind::default(), ChainKind::Posterior);
    }
}
