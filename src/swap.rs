/*!
# Replica-exchange sweep

One deterministic even/odd (DEO) sweep over the temperature ladder:
rejection statistics are accumulated for *every* adjacent pair, while swap
attempts are restricted to the pairs selected by the sweep's parity. Odd
sweeps attempt pairs 1, 3, 5, …; even sweeps attempt pairs 2, 4, 6, …
(1-based). The strict alternation is what makes the scheme non-reversible:
an accepted state keeps moving in the same direction along the ladder on
consecutive sweeps instead of diffusing.

The sweep itself only *decides*; the tempering controller applies the
accepted swaps by exchanging β values between the two replicas (states
stay put).
*/

use rand::rngs::SmallRng;
use rand::Rng;

use crate::core::SamplerState;

/// Which half of the adjacent pairs a sweep attempts to swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parity {
    /// Pairs 1, 3, 5, … (1-based).
    Odd,
    /// Pairs 2, 4, 6, … (1-based).
    Even,
}

impl Parity {
    /// The parity of the `sweep`-th swap attempt (1-based): odd sweep
    /// numbers use the odd pairs, even sweep numbers the even pairs.
    pub fn from_sweep(sweep: usize) -> Self {
        if sweep % 2 == 0 {
            Parity::Even
        } else {
            Parity::Odd
        }
    }

    /// Whether the 0-based pair index is attempted under this parity.
    fn selects(self, pair: usize) -> bool {
        match self {
            Parity::Odd => pair % 2 == 0,
            Parity::Even => pair % 2 == 1,
        }
    }
}

/// Runs one DEO sweep and returns the 0-based indices of the accepted
/// pairs, in ladder order.
///
/// `ladder` holds the β values by rank (strictly decreasing), `states` the
/// replica states in the same rank order. For every adjacent pair the
/// rejection accumulator receives `1 − min(1, exp(−|Δβ|·Δℓ))`, independent
/// of parity, where `Δℓ` is the difference of the pair's log-densities.
/// The swap itself is accepted when `log(1 − u) ≤ Δβ·Δℓ` for a uniform
/// draw `u`; one draw is consumed per attempted pair.
pub fn deo_sweep<St: SamplerState>(
    ladder: &[f64],
    states: &[&St],
    parity: Parity,
    rejections: &mut [f64],
    rng: &mut SmallRng,
) -> Vec<usize> {
    debug_assert_eq!(ladder.len(), states.len());
    debug_assert_eq!(rejections.len() + 1, ladder.len());

    let mut accepted = Vec::new();
    for pair in 0..ladder.len() - 1 {
        let dbeta = ladder[pair] - ladder[pair + 1];
        let dlog = states[pair].log_density() - states[pair + 1].log_density();

        rejections[pair] += 1.0 - (-dbeta.abs() * dlog).exp().min(1.0);

        if parity.selects(pair) {
            let log_alpha = dbeta * dlog;
            let u: f64 = rng.gen();
            if (1.0 - u).ln() <= log_alpha {
                accepted.push(pair);
            }
        }
    }
    accepted
}
