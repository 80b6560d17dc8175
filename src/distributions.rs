/*!
Target densities for tests, demos, and the built-in random-walk kernel,
plus the annealing path that connects a target to a reference density for
parallel tempering.

The module is generic over the floating-point precision (`f32` or `f64`)
via [`num_traits::Float`]. Drivers never evaluate densities themselves;
everything here is consumed through the [`TargetDistribution`] trait.

# Examples

```rust
use tempered_mcmc::distributions::{AnnealingPath, GaussianMixture, IsotropicGaussian, TargetDistribution};

// A bimodal target annealed towards a broad reference.
let target = GaussianMixture::new(vec![vec![-4.0], vec![4.0]], 1.0);
let reference = IsotropicGaussian::new(5.0);
let path = AnnealingPath::new(target, reference);

// β = 1 is the target itself, β = 0 the reference.
let theta = vec![0.5];
assert_eq!(path.tempered_log_prob(&theta, 1.0), path.target_log_prob(&theta));
assert_eq!(path.tempered_log_prob(&theta, 0.0), path.reference_log_prob(&theta));
```
*/

use nalgebra::{Matrix2, Vector2};
use num_traits::Float;
use rand_distr::num_traits::ToPrimitive;
use std::f64::consts::PI;

/// A continuous distribution we want to sample from, exposed through its
/// unnormalized log-density.
pub trait TargetDistribution<S, T: Float> {
    /// Returns the log of the unnormalized density at `theta`.
    fn unnorm_log_prob(&self, theta: &S) -> T;
}

/// Distributions that additionally provide a normalized log-density
/// (used for diagnostics in tests).
pub trait Normalized<S, T: Float> {
    /// Returns the normalized log-density at `theta`.
    fn log_prob(&self, theta: &S) -> T;
}

/**
A 2D Gaussian parameterized by a mean vector and a 2×2 covariance matrix.

# Examples

```rust
use tempered_mcmc::distributions::{Gaussian2D, Normalized};
use nalgebra::{Matrix2, Vector2};

let gauss: Gaussian2D<f64> = Gaussian2D {
    mean: Vector2::new(0.0, 0.0),
    cov: Matrix2::new(1.0, 0.0, 0.0, 1.0),
};
let lp = gauss.log_prob(&vec![0.5, -0.5]);
assert!(lp < 0.0);
```
*/
#[derive(Debug, Clone, Copy)]
pub struct Gaussian2D<T: Float + ToPrimitive> {
    pub mean: Vector2<T>,
    pub cov: Matrix2<T>,
}

impl<T> Gaussian2D<T>
where
    T: Float
        + ToPrimitive
        + std::fmt::Debug
        + std::ops::AddAssign
        + std::ops::SubAssign
        + std::ops::MulAssign
        + std::ops::DivAssign
        + 'static,
{
    fn mahalanobis_half(&self, theta: &[T]) -> T {
        let (a, b, c, d) = (
            self.cov[(0, 0)],
            self.cov[(0, 1)],
            self.cov[(1, 0)],
            self.cov[(1, 1)],
        );
        let det = a * d - b * c;
        let x = Vector2::new(theta[0], theta[1]);
        let diff = x - self.mean;
        let inv_cov = Matrix2::new(d, -b, -c, a) / det;
        -T::from(0.5).unwrap() * (diff.transpose() * inv_cov * diff)[(0, 0)]
    }
}

impl<T> TargetDistribution<Vec<T>, T> for Gaussian2D<T>
where
    T: Float
        + ToPrimitive
        + std::fmt::Debug
        + std::ops::AddAssign
        + std::ops::SubAssign
        + std::ops::MulAssign
        + std::ops::DivAssign
        + 'static,
{
    fn unnorm_log_prob(&self, theta: &Vec<T>) -> T {
        self.mahalanobis_half(theta)
    }
}

impl<T> Normalized<Vec<T>, T> for Gaussian2D<T>
where
    T: Float
        + ToPrimitive
        + std::fmt::Debug
        + std::ops::AddAssign
        + std::ops::SubAssign
        + std::ops::MulAssign
        + std::ops::DivAssign
        + 'static,
{
    /// Fully normalized log-density of the 2D Gaussian.
    fn log_prob(&self, theta: &Vec<T>) -> T {
        let term_1 = -(T::from(2.0).unwrap() * T::from(PI).unwrap()).ln();
        let (a, b, c, d) = (
            self.cov[(0, 0)],
            self.cov[(0, 1)],
            self.cov[(1, 0)],
            self.cov[(1, 1)],
        );
        let det = a * d - b * c;
        let term_2 = -T::from(0.5).unwrap() * det.abs().ln();
        term_1 + term_2 + self.mahalanobis_half(theta)
    }
}

/**
A zero-mean isotropic Gaussian with standard deviation `std`, in any
dimension.

Its main role in this crate is as the *reference* end of an
[`AnnealingPath`]: a broad, easy-to-explore density the hot replicas relax
towards.
*/
#[derive(Debug, Clone, Copy)]
pub struct IsotropicGaussian<T: Float> {
    pub std: T,
}

impl<T: Float> IsotropicGaussian<T> {
    pub fn new(std: T) -> Self {
        Self { std }
    }
}

impl<T: Float> TargetDistribution<Vec<T>, T> for IsotropicGaussian<T> {
    fn unnorm_log_prob(&self, theta: &Vec<T>) -> T {
        let mut sum = T::zero();
        for &x in theta.iter() {
            sum = sum + x * x;
        }
        -T::from(0.5).unwrap() * sum / (self.std * self.std)
    }
}

/**
An equal-weight mixture of isotropic Gaussians, one per mode.

Multimodal targets are where tempering earns its keep; this is the stock
hard case used by the tests and demos.
*/
#[derive(Debug, Clone)]
pub struct GaussianMixture<T: Float> {
    pub modes: Vec<Vec<T>>,
    pub std: T,
}

impl<T: Float> GaussianMixture<T> {
    pub fn new(modes: Vec<Vec<T>>, std: T) -> Self {
        assert!(!modes.is_empty(), "mixture needs at least one mode");
        Self { modes, std }
    }
}

impl<T: Float> TargetDistribution<Vec<T>, T> for GaussianMixture<T> {
    fn unnorm_log_prob(&self, theta: &Vec<T>) -> T {
        let half = T::from(0.5).unwrap();
        let var = self.std * self.std;
        // log-sum-exp over the component log-densities
        let mut terms = Vec::with_capacity(self.modes.len());
        let mut max = T::neg_infinity();
        for mode in &self.modes {
            let mut sq = T::zero();
            for (&x, &m) in theta.iter().zip(mode.iter()) {
                let diff = x - m;
                sq = sq + diff * diff;
            }
            let term = -half * sq / var;
            if term > max {
                max = term;
            }
            terms.push(term);
        }
        if max == T::neg_infinity() {
            return max;
        }
        let mut sum = T::zero();
        for term in terms {
            sum = sum + (term - max).exp();
        }
        max + sum.ln()
    }
}

/**
A geometric annealing path between a reference and a target density.

`tempered_log_prob(θ, β) = β·log target(θ) + (1 − β)·log reference(θ)`,
so β = 0 is the reference and β = 1 the target. The swap engine differences
`log target − log reference` across replicas, which
[`crate::metropolis::WalkerState::log_density`] exposes.
*/
#[derive(Debug, Clone)]
pub struct AnnealingPath<D, R> {
    pub target: D,
    pub reference: R,
}

impl<D, R> AnnealingPath<D, R> {
    pub fn new(target: D, reference: R) -> Self {
        Self { target, reference }
    }

    pub fn target_log_prob<S>(&self, theta: &S) -> f64
    where
        D: TargetDistribution<S, f64>,
    {
        self.target.unnorm_log_prob(theta)
    }

    pub fn reference_log_prob<S>(&self, theta: &S) -> f64
    where
        R: TargetDistribution<S, f64>,
    {
        self.reference.unnorm_log_prob(theta)
    }

    /// The annealed log-density at inverse temperature `beta`.
    pub fn tempered_log_prob<S>(&self, theta: &S, beta: f64) -> f64
    where
        D: TargetDistribution<S, f64>,
        R: TargetDistribution<S, f64>,
    {
        beta * self.target_log_prob(theta) + (1.0 - beta) * self.reference_log_prob(theta)
    }
}
