//! Defect observations and the per-face store they accumulate into.

use crate::float_types::{EPSILON, Real};
use crate::signal::CubeFace;
use hashbrown::{HashMap, HashSet};
use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Which side of neutral a defect or feature falls on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Pos,
    Neg,
}

impl Label {
    pub const fn as_str(self) -> &'static str {
        match self {
            Label::Pos => "pos",
            Label::Neg => "neg",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Running count of `pos` and `neg` labels.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LabelTally {
    pub pos: usize,
    pub neg: usize,
}

impl LabelTally {
    pub fn add(&mut self, label: Label) {
        match label {
            Label::Pos => self.pos += 1,
            Label::Neg => self.neg += 1,
        }
    }

    pub const fn total(&self) -> usize {
        self.pos + self.neg
    }

    /// Share of `pos` labels, or `None` when nothing was counted.
    pub fn pos_ratio(&self) -> Option<Real> {
        if self.total() == 0 {
            None
        } else {
            Some(self.pos as Real / self.total() as Real)
        }
    }
}

/// A cell of a cube face: the bucket a defect is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FaceId {
    pub face: CubeFace,
    pub cell: u16,
}

impl FaceId {
    pub const fn new(face: CubeFace, cell: u16) -> Self {
        FaceId { face, cell }
    }
}

impl fmt::Display for FaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:02}", self.face.tag(), self.cell)
    }
}

/// Strength bounds outside of which a sample becomes a defect.
///
/// Bounds apply to strengths relative to `neutral`, the strength the sampled signal treats
/// as flat. Relative strengths inside `[inner, outer]` are the dead zone and never produce a
/// record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DefectThresholds {
    pub inner: Real,
    pub outer: Real,
    #[serde(default = "unit_neutral")]
    pub neutral: Real,
}

const fn unit_neutral() -> Real {
    1.0
}

impl Default for DefectThresholds {
    fn default() -> Self {
        DefectThresholds {
            inner: 0.6,
            outer: 1.25,
            neutral: unit_neutral(),
        }
    }
}

impl DefectThresholds {
    /// Judge strengths against `neutral` instead of 1.0. Non-finite or near-zero values
    /// leave the thresholds unchanged.
    pub fn with_neutral(self, neutral: Real) -> Self {
        if !neutral.is_finite() || neutral < EPSILON {
            log::debug!("neutral strength {neutral} unusable, keeping {}", self.neutral);
            return self;
        }
        DefectThresholds { neutral, ..self }
    }

    /// `raw` as a multiple of the neutral strength.
    pub fn relative(&self, raw: Real) -> Real {
        raw / self.neutral
    }

    /// Label of a relative strength, `None` inside the dead zone.
    pub fn label(&self, strength: Real) -> Option<Label> {
        if strength > self.outer {
            Some(Label::Pos)
        } else if strength < self.inner {
            Some(Label::Neg)
        } else {
            None
        }
    }
}

/// One observed deviation between the mesh surface and the sampled signal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DefectRecord {
    pub strength: Real,
    pub position: Point3<Real>,
    pub face: FaceId,
    pub label: Label,
}

impl DefectRecord {
    /// Distance of the strength from neutral (1.0).
    pub fn depth(&self) -> Real {
        (self.strength - 1.0).abs()
    }

    fn key(&self) -> RecordKey {
        RecordKey {
            strength: self.strength.to_bits() as u64,
            position: [
                self.position.x.to_bits() as u64,
                self.position.y.to_bits() as u64,
                self.position.z.to_bits() as u64,
            ],
            face: self.face,
            label: self.label,
        }
    }

    /// Strongest first; ties resolved by position so the order never depends on insertion.
    fn rank(a: &DefectRecord, b: &DefectRecord) -> Ordering {
        b.strength
            .total_cmp(&a.strength)
            .then_with(|| a.position.x.total_cmp(&b.position.x))
            .then_with(|| a.position.y.total_cmp(&b.position.y))
            .then_with(|| a.position.z.total_cmp(&b.position.z))
            .then_with(|| a.label.cmp(&b.label))
    }
}

/// Bit-exact identity of a record.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
struct RecordKey {
    strength: u64,
    position: [u64; 3],
    face: FaceId,
    label: Label,
}

/// Defect records of one run, bucketed by face cell.
#[derive(Debug, Default, Clone)]
pub struct DefectStore {
    buckets: HashMap<FaceId, Vec<DefectRecord>>,
}

impl DefectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// File `record` under its face id.
    pub fn record(&mut self, record: DefectRecord) {
        self.buckets.entry(record.face).or_default().push(record);
    }

    /// Total number of records across all buckets.
    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Records of one bucket in the order they were observed.
    pub fn bucket(&self, face: &FaceId) -> Option<&[DefectRecord]> {
        self.buckets.get(face).map(Vec::as_slice)
    }

    /// Face ids with at least one record, in ascending order.
    pub fn face_ids(&self) -> Vec<FaceId> {
        let mut ids: Vec<FaceId> = self.buckets.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// A copy of one bucket with exact duplicates removed, strongest first.
    pub fn unique_ranked(&self, face: &FaceId) -> Vec<DefectRecord> {
        let Some(records) = self.buckets.get(face) else {
            return Vec::new();
        };
        let mut seen = HashSet::with_capacity(records.len());
        let mut unique: Vec<DefectRecord> = records
            .iter()
            .filter(|r| seen.insert(r.key()))
            .copied()
            .collect();
        unique.sort_by(DefectRecord::rank);
        unique
    }
}
