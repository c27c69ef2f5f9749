// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Pluggable randomness for the dissonance trigger.
//!
//! Production coordinators roll a [`SeededChance`]; tests inject a
//! [`FixedChance`] so the dissonance branch is forced or suppressed
//! deterministically.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub trait ChanceSource: Send {
    /// Uniform sample in `[0, 1)`.
    fn roll(&mut self) -> f64;
}

pub struct SeededChance {
    rng: StdRng,
}

impl SeededChance {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Seeded from the operating system.
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_os_rng(),
        }
    }
}

impl ChanceSource for SeededChance {
    fn roll(&mut self) -> f64 {
        self.rng.random::<f64>()
    }
}

/// Always rolls the same value.
#[derive(Debug, Clone, Copy)]
pub struct FixedChance(pub f64);

impl FixedChance {
    /// Rolls below any positive probability.
    pub fn always() -> Self {
        Self(0.0)
    }

    /// Rolls above any probability in `[0, 1)`.
    pub fn never() -> Self {
        Self(1.0)
    }
}

impl ChanceSource for FixedChance {
    fn roll(&mut self) -> f64 {
        self.0
    }
}
