/*!
# Sequential drivers

[`sample`] runs one chain for a fixed number of retained samples;
[`sample_until`] runs until a caller-supplied predicate signals completion.
Both follow the same schedule: one initial step, `discard_initial` unsaved
warm-up transitions, then `thinning` transitions per retained sample. The
total transition count for a fixed-length run is

```text
n_total = thinning * (n - 1) + discard_initial + 1
```

and progress is reported against that total at roughly 0.5% granularity.
Argument validation happens before the first sampler call, so invalid
options never touch the model.
*/

use std::time::{Instant, SystemTime};

use rand::rngs::SmallRng;

use crate::core::{RunOptions, RunStats, Sampler};
use crate::error::{Error, Result};
use crate::progress::ProgressReporter;

/// Runs one chain for exactly `n` retained samples and bundles the result.
///
/// The callback, if any, sees every retained sample (1-based index); a
/// callback error aborts the run. Fails with
/// [`Error::InvalidArgument`] when `n < 1` or `thinning < 1`.
pub fn sample<M, S: Sampler<M>>(
    rng: &mut SmallRng,
    model: &M,
    sampler: &mut S,
    n: usize,
    opts: &RunOptions<M, S>,
) -> Result<S::Chain> {
    validate(opts)?;
    if n < 1 {
        return Err(Error::InvalidArgument(
            "the number of samples must be >= 1".to_string(),
        ));
    }

    let n_total = opts.thinning * (n - 1) + opts.discard_initial + 1;
    let mut progress = ProgressReporter::bounded(
        opts.progress_or_default(),
        &opts.progress_name,
        n_total as u64,
    );
    let start = SystemTime::now();
    let clock = Instant::now();

    // Warm-up: the initial step plus `discard_initial` unsaved transitions.
    let (mut sample, mut state) = sampler.initial_step(rng, model)?;
    let mut itotal = 1u64;
    for _ in 0..opts.discard_initial {
        let (s, st) = sampler.next_step(rng, model, state)?;
        sample = s;
        state = st;
        itotal += 1;
        progress.update(itotal);
    }

    if let Some(callback) = opts.callback.as_deref() {
        callback(rng, model, &*sampler, &sample, &state, 1)?;
    }
    let mut buffer = sampler.new_buffer(model, &sample, n);
    sampler.save(&mut buffer, sample, 1, model, n);

    for i in 2..=n {
        for _ in 0..opts.thinning - 1 {
            let (_, st) = sampler.next_step(rng, model, state)?;
            state = st;
            itotal += 1;
            progress.update(itotal);
        }
        let (s, st) = sampler.next_step(rng, model, state)?;
        state = st;
        itotal += 1;
        progress.update(itotal);

        if let Some(callback) = opts.callback.as_deref() {
            callback(rng, model, &*sampler, &s, &state, i)?;
        }
        sampler.save(&mut buffer, s, i, model, n);
    }

    progress.finish();
    let stats = RunStats {
        start,
        stop: SystemTime::now(),
        duration: clock.elapsed(),
    };
    Ok(sampler.bundle(buffer, model, &state, opts.kind, stats))
}

/// Runs one chain until `isdone` returns true.
///
/// The predicate is evaluated after every retained sample (including the
/// first) on the buffer collected so far; `discard_initial` and `thinning`
/// behave exactly as in [`sample`]. Progress is best-effort since the
/// total is unknown.
pub fn sample_until<M, S, F>(
    rng: &mut SmallRng,
    model: &M,
    sampler: &mut S,
    mut isdone: F,
    opts: &RunOptions<M, S>,
) -> Result<S::Chain>
where
    S: Sampler<M>,
    F: FnMut(&mut SmallRng, &M, &S, &S::Buffer, &S::State, usize) -> Result<bool>,
{
    validate(opts)?;

    let mut progress = ProgressReporter::unbounded(opts.progress_or_default(), &opts.progress_name);
    let start = SystemTime::now();
    let clock = Instant::now();

    let (mut sample, mut state) = sampler.initial_step(rng, model)?;
    let mut itotal = 1u64;
    for _ in 0..opts.discard_initial {
        let (s, st) = sampler.next_step(rng, model, state)?;
        sample = s;
        state = st;
        itotal += 1;
        progress.update(itotal);
    }

    if let Some(callback) = opts.callback.as_deref() {
        callback(rng, model, &*sampler, &sample, &state, 1)?;
    }
    let mut buffer = sampler.new_buffer(model, &sample, 0);
    sampler.save(&mut buffer, sample, 1, model, 0);

    let mut i = 1usize;
    while !isdone(rng, model, &*sampler, &buffer, &state, i)? {
        i += 1;
        for _ in 0..opts.thinning - 1 {
            let (_, st) = sampler.next_step(rng, model, state)?;
            state = st;
            itotal += 1;
            progress.update(itotal);
        }
        let (s, st) = sampler.next_step(rng, model, state)?;
        state = st;
        itotal += 1;
        progress.update(itotal);

        if let Some(callback) = opts.callback.as_deref() {
            callback(rng, model, &*sampler, &s, &state, i)?;
        }
        sampler.save(&mut buffer, s, i, model, 0);
    }

    progress.finish();
    let stats = RunStats {
        start,
        stop: SystemTime::now(),
        duration: clock.elapsed(),
    };
    Ok(sampler.bundle(buffer, model, &state, opts.kind, stats))
}

fn validate<M, S: Sampler<M>>(opts: &RunOptions<M, S>) -> Result<()> {
    if opts.thinning < 1 {
        return Err(Error::InvalidArgument("thinning must be >= 1".to_string()));
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::core::{ChainKind, RunStats, SamplerState};
    use rand::SeedableRng;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Test double that emits the running transition count as its sample,
    /// so driver arithmetic (warm-up, thinning) is directly observable.
    #[derive(Clone)]
    pub(crate) struct CountingSampler {
        pub steps: Arc<AtomicUsize>,
    }

    impl CountingSampler {
        pub(crate) fn new() -> Self {
            Self {
                steps: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    pub(crate) struct CountingState {
        pub iteration: usize,
    }

    impl SamplerState for CountingState {
        fn log_density(&self) -> f64 {
            0.0
        }
    }

    impl Sampler<()> for CountingSampler {
        type Sample = usize;
        type State = CountingState;
        type Buffer = Vec<usize>;
        type Chain = Vec<usize>;

        fn initial_step(
            &mut self,
            _rng: &mut SmallRng,
            _model: &(),
        ) -> Result<(usize, CountingState)> {
            self.steps.fetch_add(1, Ordering::Relaxed);
            Ok((1, CountingState { iteration: 1 }))
        }

        fn next_step(
            &mut self,
            _rng: &mut SmallRng,
            _model: &(),
            state: CountingState,
        ) -> Result<(usize, CountingState)> {
            self.steps.fetch_add(1, Ordering::Relaxed);
            let iteration = state.iteration + 1;
            Ok((iteration, CountingState { iteration }))
        }

        fn new_buffer(&self, _model: &(), _first: &usize, n_hint: usize) -> Vec<usize> {
            Vec::with_capacity(n_hint)
        }

        fn save(
            &self,
            buffer: &mut Vec<usize>,
            sample: usize,
            index: usize,
            _model: &(),
            _n_hint: usize,
        ) {
            debug_assert_eq!(index, buffer.len() + 1);
            buffer.push(sample);
        }

        fn bundle(
            &self,
            buffer: Vec<usize>,
            _model: &(),
            _final_state: &CountingState,
            _kind: ChainKind,
            _stats: RunStats,
        ) -> Vec<usize> {
            buffer
        }
    }

    fn quiet() -> RunOptions<(), CountingSampler> {
        RunOptions::default().progress(Some(false))
    }

    #[test]
    fn returns_exactly_n_samples_with_warmup_and_thinning() {
        let mut sampler = CountingSampler::new();
        let mut rng = SmallRng::seed_from_u64(0);
        let opts = quiet().discard_initial(2).thinning(3);
        let chain = sample(&mut rng, &(), &mut sampler, 5, &opts).unwrap();
        // First retained transition is discard_initial + 1, then every 3rd.
        assert_eq!(chain, vec![3, 6, 9, 12, 15]);
        // n_total = 3 * 4 + 2 + 1
        assert_eq!(sampler.steps.load(Ordering::Relaxed), 15);
    }

    #[test]
    fn defaults_keep_every_transition() {
        let mut sampler = CountingSampler::new();
        let mut rng = SmallRng::seed_from_u64(0);
        let chain = sample(&mut rng, &(), &mut sampler, 4, &quiet()).unwrap();
        assert_eq!(chain, vec![1, 2, 3, 4]);
    }

    #[test]
    fn n_one_runs_only_warmup() {
        let mut sampler = CountingSampler::new();
        let mut rng = SmallRng::seed_from_u64(0);
        let opts = quiet().discard_initial(3);
        let chain = sample(&mut rng, &(), &mut sampler, 1, &opts).unwrap();
        assert_eq!(chain, vec![4]);
        assert_eq!(sampler.steps.load(Ordering::Relaxed), 4);
    }

    #[test]
    fn zero_samples_is_rejected_before_any_sampler_call() {
        let mut sampler = CountingSampler::new();
        let mut rng = SmallRng::seed_from_u64(0);
        let err = sample(&mut rng, &(), &mut sampler, 0, &quiet()).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(sampler.steps.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn zero_thinning_is_rejected_before_any_sampler_call() {
        let mut sampler = CountingSampler::new();
        let mut rng = SmallRng::seed_from_u64(0);
        let opts = quiet().thinning(0);
        let err = sample(&mut rng, &(), &mut sampler, 10, &opts).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(sampler.steps.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn callback_sees_every_retained_sample_in_order() {
        let seen: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_in_cb = Arc::clone(&seen);
        let mut sampler = CountingSampler::new();
        let mut rng = SmallRng::seed_from_u64(0);
        let opts = quiet().callback(Arc::new(move |_rng, _model, _sampler, _sample, _state, i| {
            seen_in_cb.lock().unwrap().push(i);
            Ok(())
        }));
        sample(&mut rng, &(), &mut sampler, 6, &opts).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn callback_errors_are_fatal() {
        let mut sampler = CountingSampler::new();
        let mut rng = SmallRng::seed_from_u64(0);
        let opts = quiet().callback(Arc::new(|_rng, _model, _sampler, _sample, _state, i| {
            if i == 3 {
                Err(Error::sampler("callback gave up"))
            } else {
                Ok(())
            }
        }));
        let err = sample(&mut rng, &(), &mut sampler, 10, &opts).unwrap_err();
        assert!(matches!(err, Error::Sampler(_)));
    }

    #[test]
    fn sample_until_stops_when_the_predicate_fires() {
        let mut sampler = CountingSampler::new();
        let mut rng = SmallRng::seed_from_u64(0);
        let chain = sample_until(
            &mut rng,
            &(),
            &mut sampler,
            |_rng, _model, _sampler, buffer: &Vec<usize>, _state, i| {
                assert_eq!(buffer.len(), i);
                Ok(i >= 50)
            },
            &quiet(),
        )
        .unwrap();
        assert_eq!(chain.len(), 50);
        // No transitions beyond the 50th: one initial step plus 49 more.
        assert_eq!(sampler.steps.load(Ordering::Relaxed), 50);
    }

    #[test]
    fn sample_until_honours_warmup_and_thinning() {
        let mut sampler = CountingSampler::new();
        let mut rng = SmallRng::seed_from_u64(0);
        let opts = quiet().discard_initial(4).thinning(2);
        let chain = sample_until(
            &mut rng,
            &(),
            &mut sampler,
            |_rng, _model, _sampler, buffer: &Vec<usize>, _state, _i| Ok(buffer.len() >= 3),
            &opts,
        )
        .unwrap();
        assert_eq!(chain, vec![5, 7, 9]);
    }
}
