//! Deterministic random number generation.
//!
//! SplitMix64 streams derived from labeled seeds. Every sampler in the runtime
//! draws from an `RngStream` owned by its caller: a chain, a session, or a
//! test. Streams are never shared between threads; parallel chains derive one
//! stream each.
//!
//! The variate generators here are the standard transforms the distribution
//! framework builds on: Box-Muller for normals, Marsaglia-Tsang for gammas,
//! inversion for exponentials, and multiplication/PTRS for Poisson counts.

use std::f64::consts::PI;

use crate::special::ln_gamma;

/// A deterministic pseudo-random number stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RngStream {
    state: u64,
}

impl RngStream {
    /// Create a stream from a seed. A zero seed is replaced by the golden
    /// gamma constant so the state is never zero.
    #[inline]
    pub const fn new(seed: u64) -> Self {
        let state = if seed == 0 { 0x9E3779B97F4A7C15 } else { seed };
        Self { state }
    }

    /// Create a stream by mixing a parent seed with a label.
    ///
    /// ```
    /// # use sirs_runtime::rng::RngStream;
    /// let a = RngStream::derive(7, "chain/0");
    /// let b = RngStream::derive(7, "chain/1");
    /// assert_ne!(a, b);
    /// ```
    #[inline]
    pub fn derive(parent_seed: u64, label: &str) -> Self {
        Self::new(splitmix64_mix(parent_seed ^ fnv1a64(label.as_bytes())))
    }

    /// Independent substream for an indexed consumer (chain, worker).
    #[inline]
    pub fn for_index(&self, index: u64) -> Self {
        Self::new(splitmix64_mix(self.state ^ index.wrapping_add(1)))
    }

    #[inline]
    pub const fn state(&self) -> u64 {
        self.state
    }

    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        self.state = splitmix64_next(self.state);
        splitmix64_mix(self.state)
    }

    /// Uniform f64 in [0, 1).
    #[inline]
    pub fn uniform(&mut self) -> f64 {
        u64_to_f64_01(self.next_u64())
    }

    /// Uniform f64 in (0, 1). Used wherever a logarithm follows.
    #[inline]
    pub fn uniform_open(&mut self) -> f64 {
        loop {
            let u = self.uniform();
            if u > 0.0 {
                return u;
            }
        }
    }

    #[inline]
    pub fn uniform_range(&mut self, min: f64, max: f64) -> f64 {
        min + self.uniform() * (max - min)
    }

    /// Standard normal via Box-Muller.
    #[inline]
    pub fn normal(&mut self) -> f64 {
        let u1 = self.uniform_open();
        let u2 = self.uniform();
        (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
    }

    #[inline]
    pub fn normal_with(&mut self, mean: f64, stddev: f64) -> f64 {
        mean + self.normal() * stddev
    }

    /// Exponential with the given rate, by inversion.
    #[inline]
    pub fn exponential(&mut self, rate: f64) -> f64 {
        -self.uniform_open().ln() / rate
    }

    /// Gamma(shape, 1) via Marsaglia-Tsang. Shapes below one use the
    /// `Gamma(a + 1) * U^(1/a)` boost.
    pub fn gamma(&mut self, shape: f64) -> f64 {
        if shape < 1.0 {
            let g = self.gamma(shape + 1.0);
            return g * self.uniform_open().powf(1.0 / shape);
        }
        let d = shape - 1.0 / 3.0;
        let c = 1.0 / (9.0 * d).sqrt();
        loop {
            let (x, v) = loop {
                let x = self.normal();
                let v = 1.0 + c * x;
                if v > 0.0 {
                    break (x, v * v * v);
                }
            };
            let u = self.uniform_open();
            let x2 = x * x;
            if u < 1.0 - 0.0331 * x2 * x2 {
                return d * v;
            }
            if u.ln() < 0.5 * x2 + d * (1.0 - v + v.ln()) {
                return d * v;
            }
        }
    }

    /// Beta(a, b) as a ratio of gammas.
    pub fn beta(&mut self, a: f64, b: f64) -> f64 {
        let x = self.gamma(a);
        let y = self.gamma(b);
        x / (x + y)
    }

    #[inline]
    pub fn bool_with_prob(&mut self, probability: f64) -> bool {
        self.uniform() < probability
    }

    /// Poisson count. Knuth's multiplication method for small means,
    /// Hörmann's PTRS transformed rejection otherwise.
    pub fn poisson(&mut self, lambda: f64) -> i64 {
        if lambda < 10.0 {
            let limit = (-lambda).exp();
            let mut k = 0i64;
            let mut p = self.uniform();
            while p > limit {
                k += 1;
                p *= self.uniform();
            }
            return k;
        }
        let slam = lambda.sqrt();
        let loglam = lambda.ln();
        let b = 0.931 + 2.53 * slam;
        let a = -0.059 + 0.02483 * b;
        let inv_alpha = 1.1239 + 1.1328 / (b - 3.4);
        let vr = 0.9277 - 3.6224 / (b - 2.0);
        loop {
            let u = self.uniform() - 0.5;
            let v = self.uniform_open();
            let us = 0.5 - u.abs();
            let k = ((2.0 * a / us + b) * u + lambda + 0.43).floor();
            if us >= 0.07 && v <= vr {
                return k as i64;
            }
            if k < 0.0 || (us < 0.013 && v > us) {
                continue;
            }
            let lhs = v.ln() + inv_alpha.ln() - (a / (us * us) + b).ln();
            let rhs = -lambda + k * loglam - ln_gamma(k + 1.0);
            if lhs <= rhs {
                return k as i64;
            }
        }
    }

    /// Index drawn proportionally to `weights`. Weights need not sum to one.
    pub fn weighted_choice(&mut self, weights: &[f64]) -> usize {
        if weights.is_empty() {
            return 0;
        }
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return 0;
        }
        let threshold = self.uniform() * total;
        let mut cumulative = 0.0;
        for (i, &weight) in weights.iter().enumerate() {
            cumulative += weight;
            if threshold < cumulative {
                return i;
            }
        }
        weights.len() - 1
    }
}

/// FNV-1a over bytes, used to turn labels into seeds.
pub const fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(0x100000001b3);
        i += 1;
    }
    hash
}

#[inline]
const fn splitmix64_next(state: u64) -> u64 {
    state.wrapping_add(0x9E3779B97F4A7C15)
}

#[inline]
const fn splitmix64_mix(mut z: u64) -> u64 {
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Upper 53 bits to a uniform f64 in [0, 1).
#[inline]
const fn u64_to_f64_01(x: u64) -> f64 {
    (x >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
}
