//! Keyed scalar seed streams.
//!
//! Every stream is a single scalar. The first draw for a key derives from the global seed,
//! every later draw from the key's own previous value (`prev^1.5`). Each raw value is scaled
//! by a multiplier, rounded to an integer and cut down to its last eight decimal digits.
//! The result is chaotic rather than random and must never be used for anything
//! security related.

use crate::errors::ValidationError;
use crate::float_types::{PI, Real};
use hashbrown::HashMap;

/// Scale applied to `(π − 3) / seed` on a key's first draw.
pub const DEFAULT_CONSTANT: Real = 5e11;

/// Values above this count as `pos` when a draw is classified.
pub const DIGIT_MIDPOINT: Real = 55_555_555.0;

/// Number of trailing decimal digits kept from every draw.
const DIGITS: usize = 8;

/// Table of keyed seed streams, owned by the run that draws from it.
#[derive(Debug, Clone)]
pub struct SeedStreamRegistry {
    seed: Real,
    constant: Real,
    state: HashMap<String, Real>,
}

impl SeedStreamRegistry {
    /// Create a registry for `seed`, which must be finite and in `(0, 1]`.
    pub fn new(seed: Real) -> Result<Self, ValidationError> {
        Self::with_constant(seed, DEFAULT_CONSTANT)
    }

    /// Create a registry with a custom first-draw constant.
    pub fn with_constant(seed: Real, constant: Real) -> Result<Self, ValidationError> {
        if !seed.is_finite() || seed <= 0.0 || seed > 1.0 {
            return Err(ValidationError::InvalidSeed(seed));
        }
        Ok(SeedStreamRegistry {
            seed,
            constant,
            state: HashMap::new(),
        })
    }

    /// The global seed every fresh key derives from.
    pub const fn seed(&self) -> Real {
        self.seed
    }

    /// Draw the next value of `key`, scaled by `multiplier` before truncation.
    ///
    /// A stored value of zero counts as "no prior state", so a key that truncated to zero
    /// restarts from the global seed.
    pub fn next(&mut self, key: &str, multiplier: Real) -> Real {
        let base = match self.state.get(key) {
            Some(&prior) if prior != 0.0 => prior.powf(1.5),
            _ => (PI - 3.0) * self.constant / self.seed,
        };
        let value = trailing_digits(base * multiplier);

        match self.state.get_mut(key) {
            Some(slot) => *slot = value,
            None => {
                self.state.insert(key.to_owned(), value);
            }
        }
        value
    }

    /// Current state of `key` without advancing it.
    pub fn peek(&self, key: &str) -> Option<Real> {
        self.state.get(key).copied()
    }

    /// Forget `key`, so its next draw restarts the whole derived sequence.
    pub fn reset(&mut self, key: &str) {
        self.state.remove(key);
    }

    /// Forget every key.
    pub fn clear(&mut self) {
        self.state.clear();
    }
}

/// Round `raw` to an integer and keep its last eight decimal digits.
fn trailing_digits(raw: Real) -> Real {
    if !raw.is_finite() {
        return 0.0;
    }
    let fixed = format!("{:.0}", raw.abs());
    let tail = &fixed[fixed.len().saturating_sub(DIGITS)..];
    tail.parse::<u64>().map(|v| v as Real).unwrap_or(0.0)
}

/// Render a draw as the eight-digit string used for colour reinterpretation.
pub fn digit_string(value: Real) -> String {
    format!("{:0>width$.0}", value.abs(), width = DIGITS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_draw_comes_from_global_seed() {
        let mut reg = SeedStreamRegistry::new(0.5).unwrap();
        assert_eq!(reg.next("noise", 1.0), 92_653_590.0);
        assert_eq!(reg.next("noise", 1.0), 53_204_361.0);
    }

    #[test]
    fn keys_are_independent_and_resettable() {
        let mut reg = SeedStreamRegistry::new(0.25).unwrap();
        let a0 = reg.next("a", 1.0);
        let a1 = reg.next("a", 1.0);
        let b0 = reg.next("b", 1.0);
        assert_eq!(a0, b0);
        assert_ne!(a0, a1);

        reg.reset("a");
        assert_eq!(reg.peek("a"), None);
        assert_eq!(reg.next("a", 1.0), a0);
        assert_eq!(reg.next("a", 1.0), a1);
    }

    #[test]
    fn draws_stay_within_eight_digits() {
        let mut reg = SeedStreamRegistry::new(0.73).unwrap();
        for _ in 0..500 {
            let v = reg.next("k", 3.0);
            assert!((0.0..100_000_000.0).contains(&v));
            assert_eq!(v.fract(), 0.0);
        }
    }

    #[test]
    fn rejects_out_of_range_seed() {
        assert!(SeedStreamRegistry::new(0.0).is_err());
        assert!(SeedStreamRegistry::new(-0.5).is_err());
        assert!(SeedStreamRegistry::new(Real::NAN).is_err());
        assert!(SeedStreamRegistry::new(1.5).is_err());
    }

    #[test]
    fn digit_string_is_zero_padded() {
        assert_eq!(digit_string(1234.0), "00001234");
        assert_eq!(digit_string(92_653_590.0), "92653590");
    }
}
