/*!
# Communication barrier and ladder adaptation

The average rejection of each adjacent replica pair, accumulated over a
tuning phase, defines the *communication barrier*: a monotone
non-decreasing function Λ on [0, 1] with Λ(0) = 0 and Λ(1) equal to the
total cumulative rejection. Λ(1) estimates how hard states find it to
travel the full ladder, and 2·Λ(1) approximates the number of replicas
needed for efficient mixing.

[`update_betas`] inverts Λ to place the interior β values so that the
barrier is equidistributed: Λ(βₖ) = Λ(1)·k/(N−1) along the increasing
axis. Because the cumulative rejections are non-decreasing, a monotone
cubic Hermite interpolant (Fritsch–Carlson tangents) keeps Λ invertible,
and a bisection with a bracket tightened by the previously placed value
solves each interior equation.
*/

use crate::error::{Error, Result};

const BISECT_TOL: f64 = 1e-8;

/// Monotone cubic Hermite interpolant through `(x, y)` knots.
///
/// Tangents follow the Fritsch–Carlson rule: secant averages, zeroed on
/// flat or direction-changing segments, and clamped so no cubic segment
/// overshoots its endpoints. For monotone data the interpolant is monotone.
#[derive(Debug, Clone)]
pub struct MonotoneCubic {
    x: Vec<f64>,
    y: Vec<f64>,
    tangents: Vec<f64>,
}

impl MonotoneCubic {
    /// Fits the interpolant. `x` must be strictly increasing and `y`
    /// non-decreasing; both must be finite and of equal length ≥ 2.
    pub fn fit(x: Vec<f64>, y: Vec<f64>) -> Result<Self> {
        if x.len() != y.len() {
            return Err(Error::InvalidArgument(format!(
                "knot count mismatch: {} x values, {} y values",
                x.len(),
                y.len()
            )));
        }
        if x.len() < 2 {
            return Err(Error::InvalidArgument(
                "at least two knots are required".to_string(),
            ));
        }
        if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
            return Err(Error::Numeric("non-finite interpolation knot".to_string()));
        }
        if x.windows(2).any(|w| w[0] >= w[1]) {
            return Err(Error::InvalidArgument(
                "x knots must be strictly increasing".to_string(),
            ));
        }
        if y.windows(2).any(|w| w[0] > w[1]) {
            return Err(Error::Numeric(
                "cumulative rejections must be non-decreasing".to_string(),
            ));
        }

        let n = x.len();
        let secants: Vec<f64> = (0..n - 1)
            .map(|k| (y[k + 1] - y[k]) / (x[k + 1] - x[k]))
            .collect();

        let mut tangents = vec![0.0; n];
        tangents[0] = secants[0];
        tangents[n - 1] = secants[n - 2];
        for k in 1..n - 1 {
            tangents[k] = if secants[k - 1] * secants[k] <= 0.0 {
                0.0
            } else {
                0.5 * (secants[k - 1] + secants[k])
            };
        }

        // Clamp tangents so no segment overshoots (Fritsch–Carlson).
        for k in 0..n - 1 {
            if secants[k] == 0.0 {
                tangents[k] = 0.0;
                tangents[k + 1] = 0.0;
                continue;
            }
            let a = tangents[k] / secants[k];
            let b = tangents[k + 1] / secants[k];
            let radius = a * a + b * b;
            if radius > 9.0 {
                let scale = 3.0 / radius.sqrt();
                tangents[k] = scale * a * secants[k];
                tangents[k + 1] = scale * b * secants[k];
            }
        }

        Ok(Self { x, y, tangents })
    }

    /// Evaluates the interpolant at `t`, clamped to the knot range.
    pub fn eval(&self, t: f64) -> f64 {
        let n = self.x.len();
        if t <= self.x[0] {
            return self.y[0];
        }
        if t >= self.x[n - 1] {
            return self.y[n - 1];
        }
        let k = self.x.partition_point(|&knot| knot <= t) - 1;

        let h = self.x[k + 1] - self.x[k];
        let s = (t - self.x[k]) / h;
        let h00 = (1.0 + 2.0 * s) * (1.0 - s) * (1.0 - s);
        let h10 = s * (1.0 - s) * (1.0 - s);
        let h01 = s * s * (3.0 - 2.0 * s);
        let h11 = s * s * (s - 1.0);
        h00 * self.y[k]
            + h10 * h * self.tangents[k]
            + h01 * self.y[k + 1]
            + h11 * h * self.tangents[k + 1]
    }
}

fn validate_ladder(ladder: &[f64]) -> Result<()> {
    if ladder.len() < 2 {
        return Err(Error::InvalidArgument(
            "a ladder needs at least two rungs".to_string(),
        ));
    }
    if ladder.windows(2).any(|w| w[0] <= w[1]) {
        return Err(Error::InvalidArgument(
            "the ladder must be strictly decreasing".to_string(),
        ));
    }
    let (first, last) = (ladder[0], ladder[ladder.len() - 1]);
    if first != 1.0 || last != 0.0 {
        return Err(Error::InvalidArgument(format!(
            "the ladder must run from 1.0 to 0.0, got {first} to {last}"
        )));
    }
    Ok(())
}

/// Builds the communication barrier Λ from the current ladder and the
/// per-pair average rejections (`rejections[i]` belongs to the pair whose
/// hotter end is `ladder[i + 1]`).
///
/// The knots are the reversed ladder on the increasing axis paired with
/// the cumulative rejection prefix, so Λ(0) = 0 and Λ(1) = Σ rejections.
pub fn communication_barrier(ladder: &[f64], rejections: &[f64]) -> Result<MonotoneCubic> {
    validate_ladder(ladder)?;
    if rejections.len() + 1 != ladder.len() {
        return Err(Error::InvalidArgument(format!(
            "expected {} rejection entries for a ladder of {} rungs, got {}",
            ladder.len() - 1,
            ladder.len(),
            rejections.len()
        )));
    }
    if rejections.iter().any(|&r| r < 0.0) {
        return Err(Error::InvalidArgument(
            "rejection rates cannot be negative".to_string(),
        ));
    }

    let x: Vec<f64> = ladder.iter().rev().copied().collect();
    let mut y = Vec::with_capacity(ladder.len());
    y.push(0.0);
    let mut acc = 0.0;
    for &r in rejections {
        acc += r;
        y.push(acc);
    }
    MonotoneCubic::fit(x, y)
}

/// Solves for the ladder that equidistributes the communication barrier.
///
/// Returns the input unchanged when the barrier is identically zero. The
/// endpoints stay pinned at 1.0 and 0.0; interior rungs are placed by
/// bisection so that Λ(βₖ) = Λ(1)·k/(N−1) along the increasing axis, with
/// each bracket's lower edge tightened to just below the previous
/// solution to keep the sweep monotone.
///
/// ```
/// use tempered_mcmc::ladder::update_betas;
///
/// // Equidistributed rejections leave a uniform ladder untouched.
/// let ladder = vec![1.0, 0.5, 0.0];
/// let updated = update_betas(&ladder, &[0.3, 0.3]).unwrap();
/// assert!((updated[1] - 0.5).abs() < 1e-6);
/// ```
pub fn update_betas(ladder: &[f64], rejections: &[f64]) -> Result<Vec<f64>> {
    let barrier = communication_barrier(ladder, rejections)?;
    let total = barrier.eval(1.0);
    if !total.is_finite() {
        return Err(Error::Numeric(format!(
            "cumulative rejection is not finite: {total}"
        )));
    }
    if total == 0.0 {
        return Ok(ladder.to_vec());
    }

    let n = ladder.len();
    let mut grid = vec![0.0; n];
    grid[n - 1] = 1.0;
    let mut previous: f64 = 0.0;
    for k in 1..n - 1 {
        let target = total * k as f64 / (n - 1) as f64;
        let lower = (previous - 0.1).max(0.0);
        let root = bisect(&barrier, target, lower, 1.0)?;
        grid[k] = root;
        previous = root;
    }
    Ok(grid.into_iter().rev().collect())
}

/// Bisection for Λ(t) = target on a monotone Λ.
fn bisect(barrier: &MonotoneCubic, target: f64, mut lo: f64, mut hi: f64) -> Result<f64> {
    if barrier.eval(lo) > target || barrier.eval(hi) < target {
        return Err(Error::Numeric(format!(
            "bisection bracket [{lo}, {hi}] does not contain the barrier target {target}"
        )));
    }
    while hi - lo > BISECT_TOL {
        let mid = 0.5 * (lo + hi);
        if barrier.eval(mid) < target {
            lo = mid;
        } else {
            hi = mid;
        }
    }
    Ok(0.5 * (lo + hi))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn barrier_interpolates_endpoints_and_stays_monotone() {
        let ladder = [1.0, 0.7, 0.4, 0.2, 0.0];
        let rejections = [0.1, 0.05, 0.4, 0.02];
        let barrier = communication_barrier(&ladder, &rejections).unwrap();

        assert_abs_diff_eq!(barrier.eval(0.0), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(
            barrier.eval(1.0),
            rejections.iter().sum::<f64>(),
            epsilon = 1e-12
        );

        // Dense-grid monotonicity.
        let mut last = barrier.eval(0.0);
        for step in 1..=1_000 {
            let value = barrier.eval(step as f64 / 1_000.0);
            assert!(
                value >= last - 1e-12,
                "barrier decreased at t = {}",
                step as f64 / 1_000.0
            );
            last = value;
        }
    }

    #[test]
    fn flat_segments_do_not_overshoot() {
        // A long flat stretch followed by a jump: the clamped tangents must
        // keep every evaluation within the data range.
        let spline = MonotoneCubic::fit(
            vec![0.0, 0.25, 0.5, 0.75, 1.0],
            vec![0.0, 0.0, 0.0, 1.0, 1.0],
        )
        .unwrap();
        for step in 0..=1_000 {
            let value = spline.eval(step as f64 / 1_000.0);
            assert!((-1e-12..=1.0 + 1e-12).contains(&value));
        }
    }

    #[test]
    fn update_betas_equidistributes_the_barrier() {
        let ladder = [1.0, 0.66, 0.33, 0.0];
        let rejections = [0.2, 0.4, 0.4];
        let barrier = communication_barrier(&ladder, &rejections).unwrap();
        assert_abs_diff_eq!(barrier.eval(1.0), 1.0, epsilon = 1e-12);

        let updated = update_betas(&ladder, &rejections).unwrap();
        assert_eq!(updated.len(), 4);
        assert_eq!(updated[0], 1.0);
        assert_eq!(updated[3], 0.0);
        assert!(updated.windows(2).all(|w| w[0] > w[1]));

        // Interior rungs hit the equidistribution targets on the
        // increasing axis: Λ(x_k) = Λ(1) * k / 3.
        for (k, &beta) in updated.iter().rev().enumerate().take(3).skip(1) {
            assert_abs_diff_eq!(barrier.eval(beta), k as f64 / 3.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn equidistributed_rejections_are_a_fixed_point() {
        let ladder = [1.0, 0.8, 0.45, 0.2, 0.0];
        let rejections = [0.25, 0.25, 0.25, 0.25];
        let updated = update_betas(&ladder, &rejections).unwrap();
        for (new, old) in updated.iter().zip(ladder.iter()) {
            assert_abs_diff_eq!(new, old, epsilon = 1e-6);
        }
    }

    #[test]
    fn zero_rejections_leave_the_ladder_unchanged() {
        let ladder = [1.0, 0.6, 0.3, 0.0];
        let updated = update_betas(&ladder, &[0.0, 0.0, 0.0]).unwrap();
        assert_eq!(updated, ladder.to_vec());
    }

    #[test]
    fn non_monotone_ladder_is_rejected() {
        let err = update_betas(&[1.0, 0.3, 0.6, 0.0], &[0.1, 0.1, 0.1]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn non_finite_rejections_fail_numerically() {
        let err = update_betas(&[1.0, 0.5, 0.0], &[f64::NAN, 0.1]).unwrap_err();
        assert!(matches!(err, Error::Numeric(_)));
    }

    #[test]
    fn mismatched_rejection_length_is_rejected() {
        let err = communication_barrier(&[1.0, 0.5, 0.0], &[0.1]).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
