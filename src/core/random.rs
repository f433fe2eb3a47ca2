/// Injectable randomness for sampling and traversal.
use rand::rngs::StdRng;
use rand::Rng;

/// A source of uniform random values. Every draw the engine makes goes
/// through this trait, so a fixed sequence reproduces a run exactly.
pub trait RandomSource {
    /// Uniform value in `[0, 1)`.
    fn next_unit(&mut self) -> f64;

    /// Uniform integer in `[low, high]`. Callers guarantee `low <= high`.
    fn int_inclusive(&mut self, low: usize, high: usize) -> usize;
}

impl RandomSource for StdRng {
    fn next_unit(&mut self) -> f64 {
        self.gen::<f64>()
    }

    fn int_inclusive(&mut self, low: usize, high: usize) -> usize {
        self.gen_range(low..=high)
    }
}

impl<R: RandomSource + ?Sized> RandomSource for &mut R {
    fn next_unit(&mut self) -> f64 {
        (**self).next_unit()
    }

    fn int_inclusive(&mut self, low: usize, high: usize) -> usize {
        (**self).int_inclusive(low, high)
    }
}

/// Replays a fixed sequence of unit values, cycling when exhausted.
///
/// Integer draws map the next unit value onto the requested range, so
/// `0.0` always picks `low` and values just below `1.0` pick `high`.
#[derive(Debug, Clone)]
pub struct ScriptedSource {
    values: Vec<f64>,
    cursor: usize,
}

impl ScriptedSource {
    pub fn new(values: impl Into<Vec<f64>>) -> Self {
        Self {
            values: values.into(),
            cursor: 0,
        }
    }

    /// Number of values consumed so far.
    pub fn draws(&self) -> usize {
        self.cursor
    }
}

impl RandomSource for ScriptedSource {
    fn next_unit(&mut self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let value = self.values[self.cursor % self.values.len()];
        self.cursor += 1;
        value.clamp(0.0, 1.0 - f64::EPSILON)
    }

    fn int_inclusive(&mut self, low: usize, high: usize) -> usize {
        let span = (high - low + 1) as f64;
        let offset = (self.next_unit() * span) as usize;
        (low + offset).min(high)
    }
}
