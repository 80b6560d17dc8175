/*!
# Parallel drivers for independent chains

Three execution substrates share one contract: draw `nchains` seeds from
the parent rng *before* dispatch, run `nchains` independent invocations of
[`crate::driver::sample`] — each with a freshly seeded rng and deep copies
of the model and sampler — and collect the chains in index order. Because
the seeds are drawn up front, a given parent seed produces the same
per-chain seeds (and therefore the same chains) on every substrate.

- [`sample_chains`]: rayon-backed thread pool, bounded by the number of
  hardware threads. Each task owns its copies; results land in disjoint
  slots, so the hot path takes no locks.
- [`sample_chains_on_pool`]: an explicit worker pool over scoped OS
  threads. Per-seed jobs flow through a job channel; completion pings are
  funnelled through a bounded channel to a single progress updater.
- [`sample_chains_serial`]: a plain loop, useful as a baseline and for
  debugging.

A failing chain never cancels its siblings: every dispatched worker runs
to completion before the first error propagates.
*/

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::core::{RunOptions, Sampler};
use crate::driver::sample;
use crate::error::{Error, Result};
use crate::progress::ProgressReporter;

/// Draws one seed per chain from the parent rng.
///
/// Always called exactly once, before any dispatch, so the mapping from
/// parent seed to per-chain seeds does not depend on the substrate.
fn chain_seeds(rng: &mut SmallRng, nchains: usize) -> Vec<u64> {
    (0..nchains).map(|_| rng.gen()).collect()
}

fn validate(nchains: usize, n: usize) -> Result<()> {
    if nchains < 1 {
        return Err(Error::InvalidArgument(
            "the number of chains must be >= 1".to_string(),
        ));
    }
    if nchains > n {
        eprintln!("Warning: running more chains ({nchains}) than samples per chain ({n}).");
    }
    Ok(())
}

fn hardware_workers() -> usize {
    match thread::available_parallelism() {
        Ok(v) => v.get(),
        Err(_) => {
            eprintln!("Warning: could not determine the number of hardware threads; assuming 1.");
            1
        }
    }
}

/// Runs `nchains` independent chains on the rayon thread pool.
pub fn sample_chains<M, S>(
    rng: &mut SmallRng,
    model: &M,
    sampler: &S,
    nchains: usize,
    n: usize,
    opts: &RunOptions<M, S>,
) -> Result<Vec<S::Chain>>
where
    M: Clone + Sync,
    S: Sampler<M> + Sync,
    S::Chain: Send,
{
    validate(nchains, n)?;
    if hardware_workers() == 1 {
        eprintln!("Warning: only one worker thread is available; chains will run sequentially.");
    }
    let seeds = chain_seeds(rng, nchains);

    let results: Vec<Result<S::Chain>> = seeds
        .par_iter()
        .enumerate()
        .map(|(index, &seed)| {
            let mut rng = SmallRng::seed_from_u64(seed);
            let model = model.clone();
            let mut sampler = sampler.clone();
            let opts = opts.for_chain(index);
            sample(&mut rng, &model, &mut sampler, n, &opts)
        })
        .collect();

    // Every chain has settled; now surface the first failure, if any.
    results.into_iter().collect()
}

/// Runs `nchains` independent chains on an explicit pool of `workers`
/// OS threads.
///
/// Workers receive `(index, seed)` jobs, reseed, run the sequential
/// driver, and report completion through a bounded channel; the
/// dispatching thread is the only progress updater. Worker panics are
/// reported as [`Error::Worker`] after the pool has drained.
pub fn sample_chains_on_pool<M, S>(
    rng: &mut SmallRng,
    model: &M,
    sampler: &S,
    nchains: usize,
    n: usize,
    workers: usize,
    opts: &RunOptions<M, S>,
) -> Result<Vec<S::Chain>>
where
    M: Clone + Sync,
    S: Sampler<M> + Sync,
    S::Chain: Send,
{
    validate(nchains, n)?;
    let workers = workers.clamp(1, nchains);
    if workers == 1 {
        eprintln!("Warning: only one worker thread is available; chains will run sequentially.");
    }
    let seeds = chain_seeds(rng, nchains);

    let mut slots: Vec<Option<S::Chain>> = (0..nchains).map(|_| None).collect();
    let mut first_err: Option<Error> = None;
    let mut progress = ProgressReporter::bounded(
        opts.progress_or_default(),
        &opts.progress_name,
        nchains as u64,
    );

    thread::scope(|scope| {
        let (job_tx, job_rx) = mpsc::channel::<(usize, u64)>();
        let job_rx = Arc::new(Mutex::new(job_rx));
        // Completion pings; bounded by the worker count.
        let (done_tx, done_rx) = mpsc::sync_channel::<(usize, Result<S::Chain>)>(workers);

        for _ in 0..workers {
            let job_rx = Arc::clone(&job_rx);
            let done_tx = done_tx.clone();
            scope.spawn(move || loop {
                let job = match job_rx.lock() {
                    Ok(receiver) => receiver.recv().ok(),
                    Err(_) => None,
                };
                let Some((index, seed)) = job else { break };
                // A panic must not escape the scope; report it as a
                // completed-with-failure chain instead.
                let result = catch_unwind(AssertUnwindSafe(|| {
                    let mut rng = SmallRng::seed_from_u64(seed);
                    let model = model.clone();
                    let mut sampler = sampler.clone();
                    let mut opts = opts.for_chain(index);
                    opts.progress = Some(false);
                    sample(&mut rng, &model, &mut sampler, n, &opts)
                }))
                .unwrap_or_else(|_| {
                    Err(Error::Worker(format!(
                        "a worker panicked while sampling chain {index}"
                    )))
                });
                if done_tx.send((index, result)).is_err() {
                    break;
                }
            });
        }
        drop(done_tx);

        for (index, seed) in seeds.into_iter().enumerate() {
            // Workers only exit once this sender is dropped.
            let _ = job_tx.send((index, seed));
        }
        drop(job_tx);

        let mut completed = 0u64;
        while completed < nchains as u64 {
            match done_rx.recv() {
                Ok((index, Ok(chain))) => {
                    slots[index] = Some(chain);
                    completed += 1;
                    progress.update(completed);
                }
                Ok((_, Err(err))) => {
                    if first_err.is_none() {
                        first_err = Some(err);
                    }
                    completed += 1;
                    progress.update(completed);
                }
                Err(_) => {
                    // Defensive: every worker hung up before delivering
                    // all chains.
                    if first_err.is_none() {
                        first_err = Some(Error::Worker(
                            "a worker exited before completing its chains".to_string(),
                        ));
                    }
                    break;
                }
            }
        }
        progress.finish();
    });

    if let Some(err) = first_err {
        return Err(err);
    }
    slots
        .into_iter()
        .map(|slot| slot.ok_or_else(|| Error::Worker("a chain result went missing".to_string())))
        .collect()
}

/// Runs `nchains` independent chains one after another on the calling
/// thread.
pub fn sample_chains_serial<M, S>(
    rng: &mut SmallRng,
    model: &M,
    sampler: &S,
    nchains: usize,
    n: usize,
    opts: &RunOptions<M, S>,
) -> Result<Vec<S::Chain>>
where
    M: Clone,
    S: Sampler<M>,
{
    validate(nchains, n)?;
    let seeds = chain_seeds(rng, nchains);

    let mut chains = Vec::with_capacity(nchains);
    for (index, seed) in seeds.into_iter().enumerate() {
        let mut rng = SmallRng::seed_from_u64(seed);
        let model = model.clone();
        let mut sampler = sampler.clone();
        let opts = opts.for_chain(index);
        chains.push(sample(&mut rng, &model, &mut sampler, n, &opts)?);
    }
    Ok(chains)
}
