// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # State Encoder
//!
//! Maps free text onto a fixed-length [`StateVector`] and scores the
//! similarity of two vectors as a bounded **coherence** scalar.
//!
//! Encoding is a pure function of the input characters: every character code
//! is projected onto four sinusoids with distinct frequencies and positional
//! phase steps, and the sums are normalised by `sqrt(len)`. No hashing with
//! per-process seeds is involved, so the same text encodes to the same vector
//! across calls and across process restarts.
//!
//! Coherence is cosine similarity remapped from `[-1, 1]` onto `[0, 1]`.

use serde::{Deserialize, Serialize};

/// Number of components in every [`StateVector`].
pub const STATE_DIMENSIONS: usize = 4;

/// Coherence reported when either vector carries no direction (zero norm).
pub const NEUTRAL_COHERENCE: f64 = 0.5;

const NORM_EPSILON: f64 = 1e-12;

/// Per-component frequency applied to the character code.
const FREQUENCIES: [f64; STATE_DIMENSIONS] = [0.071, 0.113, 0.167, 0.229];

/// Per-component phase advance applied per character position.
const PHASE_STEPS: [f64; STATE_DIMENSIONS] = [0.31, 0.57, 0.83, 1.13];

/// Fixed-length numeric embedding of a text string.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateVector([f64; STATE_DIMENSIONS]);

impl StateVector {
    /// Reference orientation that worker and task coherence is measured against.
    pub const REFERENCE: StateVector = StateVector([1.0, 0.5, -0.5, 0.25]);

    /// The zero vector (what empty text encodes to).
    pub const ZERO: StateVector = StateVector([0.0; STATE_DIMENSIONS]);

    pub fn new(components: [f64; STATE_DIMENSIONS]) -> Self {
        Self(components)
    }

    pub fn components(&self) -> &[f64; STATE_DIMENSIONS] {
        &self.0
    }

    pub fn dot(&self, other: &StateVector) -> f64 {
        self.0.iter().zip(other.0.iter()).map(|(a, b)| a * b).sum()
    }

    pub fn norm(&self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Linear interpolation toward `other`; `weight` is clamped to `[0, 1]`.
    pub fn blend(&self, other: &StateVector, weight: f64) -> StateVector {
        let w = if weight.is_finite() { weight.clamp(0.0, 1.0) } else { 0.0 };
        let mut out = [0.0; STATE_DIMENSIONS];
        for (k, slot) in out.iter_mut().enumerate() {
            *slot = self.0[k] * (1.0 - w) + other.0[k] * w;
        }
        StateVector(out)
    }
}

/// Deterministically encode `text` into a [`StateVector`].
pub fn encode(text: &str) -> StateVector {
    let mut acc = [0.0_f64; STATE_DIMENSIONS];
    let mut len = 0usize;

    for (position, ch) in text.chars().enumerate() {
        let code = ch as u32 as f64;
        let position = position as f64;
        for k in 0..STATE_DIMENSIONS {
            acc[k] += (code * FREQUENCIES[k] + position * PHASE_STEPS[k]).sin();
        }
        len += 1;
    }

    if len == 0 {
        return StateVector::ZERO;
    }

    let scale = (len as f64).sqrt();
    for value in acc.iter_mut() {
        *value /= scale;
    }
    StateVector(acc)
}

/// Bounded, symmetric similarity of two state vectors in `[0, 1]`.
///
/// Returns [`NEUTRAL_COHERENCE`] when either vector has (near) zero norm.
pub fn coherence(a: &StateVector, b: &StateVector) -> f64 {
    let norm_a = a.norm();
    let norm_b = b.norm();
    if norm_a < NORM_EPSILON || norm_b < NORM_EPSILON {
        return NEUTRAL_COHERENCE;
    }
    let cosine = a.dot(b) / (norm_a * norm_b);
    clamp_unit((cosine + 1.0) / 2.0)
}

/// Clamp to `[0, 1]`; non-finite values collapse to `0.0`.
pub fn clamp_unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
