// Random source for the simulated parts of the pipeline

use std::ops::RangeInclusive;
use std::sync::Mutex;

use rand::Rng;

/// Source of uniformly distributed integers
pub trait Chance: Send + Sync {
    /// Pick a value in `range`
    fn pick(&self, range: RangeInclusive<u32>) -> u32;

    /// True with probability `1 / odds`; never when `odds` is 0
    fn one_in(&self, odds: u32) -> bool {
        odds > 0 && self.pick(1..=odds) == 1
    }
}

/// Thread-local RNG backed chance
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadChance;

impl Chance for ThreadChance {
    fn pick(&self, range: RangeInclusive<u32>) -> u32 {
        if range.is_empty() {
            return *range.start();
        }
        rand::thread_rng().gen_range(range)
    }
}

/// Replays a fixed sequence of values, cycling when it runs out
///
/// Each value is clamped into the requested range; an empty script always
/// yields the lower bound.
#[derive(Debug, Default)]
pub struct ScriptedChance {
    values: Vec<u32>,
    cursor: Mutex<usize>,
}

impl ScriptedChance {
    pub fn new(values: Vec<u32>) -> Self {
        Self {
            values,
            cursor: Mutex::new(0),
        }
    }
}

impl Chance for ScriptedChance {
    fn pick(&self, range: RangeInclusive<u32>) -> u32 {
        let (low, high) = (*range.start(), *range.end());
        if self.values.is_empty() || high < low {
            return low;
        }
        let mut cursor = self.cursor.lock().unwrap_or_else(|e| e.into_inner());
        let value = self.values[*cursor % self.values.len()];
        *cursor += 1;
        value.clamp(low, high)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_chance_stays_in_range() {
        let chance = ThreadChance;
        for _ in 0..200 {
            let value = chance.pick(5..=14);
            assert!((5..=14).contains(&value));
        }
    }

    #[test]
    fn scripted_chance_cycles_and_clamps() {
        let chance = ScriptedChance::new(vec![2, 9]);

        assert_eq!(chance.pick(2..=4), 2);
        assert_eq!(chance.pick(2..=4), 4);
        assert_eq!(chance.pick(0..=10), 2);
    }

    #[test]
    fn one_in_uses_first_value() {
        assert!(ScriptedChance::new(vec![1]).one_in(5));
        assert!(!ScriptedChance::new(vec![3]).one_in(5));
        assert!(!ScriptedChance::new(vec![1]).one_in(0));
    }

    #[test]
    fn empty_script_yields_lower_bound() {
        assert_eq!(ScriptedChance::default().pick(5..=14), 5);
    }
}
