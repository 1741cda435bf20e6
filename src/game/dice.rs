//! Random source used by every game roll.
//!
//! Game code never calls `rand::thread_rng()` directly; it takes a `&mut impl Dice`
//! so encounters can be replayed from a seed (`StdRng::seed_from_u64`) or driven
//! by a fixed script of rolls.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

pub trait Dice {
    /// Uniform roll in `[0, 1)`.
    fn roll(&mut self) -> f64;

    /// Uniform integer in `[lo, hi]`. Bounds may be given in either order.
    fn between(&mut self, lo: u32, hi: u32) -> u32;

    /// Uniform index in `[0, len)`. `len` must be non-zero.
    fn pick(&mut self, len: usize) -> usize;

    /// Weighted index selection; entries with zero weight are never chosen.
    fn pick_weighted(&mut self, weights: &[u32]) -> Option<usize> {
        let total: u64 = weights.iter().map(|w| *w as u64).sum();
        if total == 0 {
            return None;
        }
        let mut target = (self.roll() * total as f64) as u64;
        for (idx, weight) in weights.iter().enumerate() {
            let weight = *weight as u64;
            if target < weight {
                return Some(idx);
            }
            target -= weight;
        }
        weights.iter().rposition(|w| *w > 0)
    }
}

impl<R: Rng + ?Sized> Dice for R {
    fn roll(&mut self) -> f64 {
        self.gen::<f64>()
    }

    fn between(&mut self, lo: u32, hi: u32) -> u32 {
        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
        self.gen_range(lo..=hi)
    }

    fn pick(&mut self, len: usize) -> usize {
        self.gen_range(0..len)
    }
}

/// Fresh entropy-seeded generator for live play.
pub fn live_dice() -> StdRng {
    StdRng::from_entropy()
}

/// Replays a fixed sequence of rolls, then keeps returning `fallback`.
///
/// `between` and `pick` consume a roll too and map it onto the requested range,
/// so a script of `0.0` always yields the low end and `0.999` the high end.
#[derive(Debug, Clone)]
pub struct ScriptedDice {
    rolls: VecDeque<f64>,
    fallback: f64,
}

impl ScriptedDice {
    pub fn new(rolls: impl IntoIterator<Item = f64>) -> Self {
        Self {
            rolls: rolls.into_iter().collect(),
            fallback: 0.5,
        }
    }

    /// Every roll returns `value`.
    pub fn constant(value: f64) -> Self {
        Self::new(std::iter::empty()).with_fallback(value)
    }

    pub fn with_fallback(mut self, value: f64) -> Self {
        self.fallback = value;
        self
    }

    pub fn remaining(&self) -> usize {
        self.rolls.len()
    }

    fn next_roll(&mut self) -> f64 {
        self.rolls
            .pop_front()
            .unwrap_or(self.fallback)
            .clamp(0.0, 0.999_999)
    }
}

impl Dice for ScriptedDice {
    fn roll(&mut self) -> f64 {
        self.next_roll()
    }

    fn between(&mut self, lo: u32, hi: u32) -> u32 {
        let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
        let span = (hi - lo) as f64 + 1.0;
        lo + (self.next_roll() * span) as u32
    }

    fn pick(&mut self, len: usize) -> usize {
        ((self.next_roll() * len as f64) as usize).min(len.saturating_sub(1))
    }
}
