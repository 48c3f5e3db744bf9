//! Simulation Randomness
//!
//! Every random choice in a run draws from one seeded stream, in a fixed
//! order, so that two runs with the same configuration and seed replay the
//! exact same history.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Seeded RNG that MUST be used for all randomness in the simulation.
/// Wraps a deterministic ChaCha8 stream.
pub struct SimRng {
    rng: ChaCha8Rng,
    samples_drawn: u64,
}

impl SimRng {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            samples_drawn: 0,
        }
    }

    /// Uniform draw between `lo` and `hi`. Empty and inverted ranges are
    /// fine (an inverted range draws between the two bounds, an empty one
    /// returns `lo`); either way exactly one sample is consumed, keeping
    /// the stream position independent of agent state.
    pub fn uniform(&mut self, lo: f64, hi: f64) -> f64 {
        self.samples_drawn += 1;
        lo + self.rng.gen::<f64>() * (hi - lo)
    }

    /// Uniform draw from `[0, 1)`.
    pub fn unit(&mut self) -> f64 {
        self.uniform(0.0, 1.0)
    }

    /// Uniform index into a collection of length `len` (`len > 0`).
    pub fn index(&mut self, len: usize) -> usize {
        self.samples_drawn += 1;
        self.rng.gen_range(0..len)
    }

    /// Fair coin flip.
    pub fn coin(&mut self) -> bool {
        self.samples_drawn += 1;
        self.rng.gen_bool(0.5)
    }

    /// `amount` distinct indices drawn without replacement from
    /// `[0, length)`, in selection order.
    pub fn sample(&mut self, length: usize, amount: usize) -> Vec<usize> {
        self.samples_drawn += 1;
        rand::seq::index::sample(&mut self.rng, length, amount).into_vec()
    }

    /// Count of samples drawn (for auditing).
    pub fn samples_drawn(&self) -> u64 {
        self.samples_drawn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_stream() {
        let mut a = SimRng::seeded(42);
        let mut b = SimRng::seeded(42);
        for _ in 0..100 {
            assert_eq!(a.uniform(0.0, 1.0), b.uniform(0.0, 1.0));
        }
        assert_eq!(a.sample(10, 4), b.sample(10, 4));
        assert_eq!(a.index(7), b.index(7));
        assert_eq!(a.coin(), b.coin());
    }

    #[test]
    fn test_different_seeds_diverge() {
        let mut a = SimRng::seeded(1);
        let mut b = SimRng::seeded(2);
        let draws_a: Vec<f64> = (0..16).map(|_| a.unit()).collect();
        let draws_b: Vec<f64> = (0..16).map(|_| b.unit()).collect();
        assert_ne!(draws_a, draws_b);
    }

    #[test]
    fn test_degenerate_range_returns_lo() {
        let mut rng = SimRng::seeded(0);
        assert_eq!(rng.uniform(0.0, 0.0), 0.0);
        assert_eq!(rng.uniform(0.5, 0.5), 0.5);
        // The degenerate draw still advanced the stream.
        assert_eq!(rng.samples_drawn(), 2);
    }

    #[test]
    fn test_uniform_stays_in_range() {
        let mut rng = SimRng::seeded(7);
        for _ in 0..1000 {
            let x = rng.uniform(0.25, 0.75);
            assert!((0.25..0.75).contains(&x));
        }
    }

    #[test]
    fn test_sample_without_replacement() {
        let mut rng = SimRng::seeded(3);
        let picks = rng.sample(20, 20);
        let mut sorted = picks.clone();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), 20);
    }
}
