//! Procedural cube signals built from a seed stream.
//!
//! Each face is filled in two layers:
//! - a sparse **major** layer with one draw per coarse cell, painted only for even draws,
//!   using one of two fixed translucent colours;
//! - a dense **minor** layer painted at halving cell sizes down to a floor, its colour taken
//!   from the draw's digits with two channels flattened to low-contrast values.
//!
//! The major layer is composited over the minor layer to give the final tile.

use crate::defects::{Label, LabelTally};
use crate::float_types::Real;
use crate::seed::{DIGIT_MIDPOINT, SeedStreamRegistry, digit_string};
use crate::signal::{CubeSignal, FaceTexture, Rgba};

/// Major-layer colour of `pos` cells (`#80ff8080`).
const MAJOR_POS: Rgba = Rgba::new(0x80, 0xff, 0x80, 0x80);
/// Major-layer colour of `neg` cells (`#10104080`).
const MAJOR_NEG: Rgba = Rgba::new(0x10, 0x10, 0x40, 0x80);

/// Result of one noise build.
#[derive(Debug, Clone)]
pub struct NoiseOutput {
    pub signal: CubeSignal,
    /// State of the seed key after the last draw
    pub final_state: Real,
    /// Labels of every painted cell
    pub tally: LabelTally,
}

/// Builder for six-face noise tiles of one resolution.
#[derive(Debug, Clone, Copy)]
pub struct NoiseField {
    resolution: usize,
    major_cell: usize,
    min_cell: usize,
}

impl NoiseField {
    pub fn new(resolution: usize) -> Self {
        let resolution = resolution.max(1);
        NoiseField {
            resolution,
            major_cell: (resolution / 4).max(1),
            min_cell: (resolution / 128).max(4),
        }
    }

    pub const fn resolution(&self) -> usize {
        self.resolution
    }

    /// Fill six tiles drawing from `key` of `registry`.
    ///
    /// All major layers are drawn before any minor layer, so the order of draws (and with it
    /// the output) depends only on the seed, the key's state and the resolution.
    pub fn build(&self, registry: &mut SeedStreamRegistry, key: &str) -> NoiseOutput {
        let mut tally = LabelTally::default();

        let mut majors: Vec<FaceTexture> = Vec::with_capacity(6);
        for _ in 0..6 {
            let mut major = FaceTexture::new(self.resolution);
            self.major_pass(&mut major, registry, key, &mut tally);
            majors.push(major);
        }

        let mut faces = Vec::with_capacity(6);
        for major in &majors {
            let mut minor = FaceTexture::filled(self.resolution, Rgba::BLACK);
            let mut cell = self.major_cell;
            loop {
                self.minor_pass(&mut minor, cell, registry, key, &mut tally);
                if cell <= self.min_cell || cell / 2 == 0 {
                    break;
                }
                cell /= 2;
            }
            minor.draw_over(major);
            faces.push(minor);
        }

        log::debug!(
            "noise {}px: {} pos / {} neg cells",
            self.resolution,
            tally.pos,
            tally.neg
        );

        NoiseOutput {
            signal: CubeSignal::from_faces(faces).unwrap_or_else(|_| {
                // six equally sized faces are built above
                CubeSignal::uniform(self.resolution, Rgba::BLACK)
            }),
            final_state: registry.peek(key).unwrap_or(0.0),
            tally,
        }
    }

    fn major_pass(
        &self,
        tex: &mut FaceTexture,
        registry: &mut SeedStreamRegistry,
        key: &str,
        tally: &mut LabelTally,
    ) {
        let cell = self.major_cell;
        for x in (0..self.resolution).step_by(cell) {
            for y in (0..self.resolution).step_by(cell) {
                let value = registry.next(key, 1.0);
                // odd draws leave the cell empty
                if (value as u64) % 2 != 0 {
                    continue;
                }
                let label = classify(value);
                let color = match label {
                    Label::Pos => MAJOR_POS,
                    Label::Neg => MAJOR_NEG,
                };
                tally.add(label);
                tex.fill_rect(x, y, cell, cell, color);
            }
        }
    }

    fn minor_pass(
        &self,
        tex: &mut FaceTexture,
        cell: usize,
        registry: &mut SeedStreamRegistry,
        key: &str,
        tally: &mut LabelTally,
    ) {
        for x in (0..self.resolution).step_by(cell) {
            for y in (0..self.resolution).step_by(cell) {
                let value = registry.next(key, 1.0);
                let label = classify(value);
                tally.add(label);
                tex.fill_rect(x, y, cell, cell, relative_color(value, label));
            }
        }
    }
}

/// `pos` when the draw is above the digit midpoint.
pub fn classify(value: Real) -> Label {
    if value > DIGIT_MIDPOINT {
        Label::Pos
    } else {
        Label::Neg
    }
}

/// Read a draw's digits as `RRGGBBAA`, flattening one channel to `80` and the alpha to a
/// label-dependent value. Replacements hit the first occurrence of the digit pair.
fn relative_color(value: Real, label: Label) -> Rgba {
    let mut fill = digit_string(value);
    let (channel, alpha) = match label {
        Label::Pos => (fill[2..4].to_owned(), "40"),
        Label::Neg => (fill[4..6].to_owned(), "20"),
    };
    fill = fill.replacen(&channel, "80", 1);
    let old_alpha = fill[6..8].to_owned();
    fill = fill.replacen(&old_alpha, alpha, 1);
    Rgba::from_hex(&fill).unwrap_or(Rgba::TRANSPARENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_seeds_give_identical_tiles() {
        let field = NoiseField::new(32);
        let mut a = SeedStreamRegistry::new(0.42).unwrap();
        let mut b = SeedStreamRegistry::new(0.42).unwrap();
        let out_a = field.build(&mut a, "noise");
        let out_b = field.build(&mut b, "noise");
        assert_eq!(out_a.signal, out_b.signal);
        assert_eq!(out_a.final_state, out_b.final_state);
        assert_eq!(out_a.tally, out_b.tally);

        let mut c = SeedStreamRegistry::new(0.43).unwrap();
        assert_ne!(field.build(&mut c, "noise").signal, out_a.signal);
    }

    #[test]
    fn labels_split_roughly_evenly() {
        for seed in [0.1, 0.5, 0.77, 1.0] {
            let mut reg = SeedStreamRegistry::new(seed).unwrap();
            let out = NoiseField::new(64).build(&mut reg, "noise");
            let ratio = out.tally.pos_ratio().unwrap();
            assert!((0.3..0.7).contains(&ratio), "seed {seed}: pos ratio {ratio}");
        }
    }

    #[test]
    fn tiles_are_opaque_and_sized() {
        let mut reg = SeedStreamRegistry::new(0.5).unwrap();
        let out = NoiseField::new(8).build(&mut reg, "noise");
        assert_eq!(out.signal.size(), 8);
        for face in out.signal.faces() {
            assert!(face.pixels().iter().all(|p| p.a == 255));
        }
        assert_eq!(reg.peek("noise"), Some(out.final_state));
    }

    #[test]
    fn relative_color_overwrites_first_occurrence() {
        // pos: channel "34" -> "80", then alpha "78" -> "40"
        assert_eq!(relative_color(12_345_678.0, Label::Pos), Rgba::from_hex("12805640").unwrap());
        // neg: "11" at [4..6] first occurs at [0..2]
        assert_eq!(relative_color(11_221_133.0, Label::Neg), Rgba::from_hex("80221120").unwrap());
    }
}
