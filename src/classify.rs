//! Turning per-face defect buckets into labelled feature clusters.

use crate::defects::{DefectRecord, DefectStore, FaceId, Label, LabelTally};
use crate::float_types::{EPSILON, Real};
use nalgebra::Point3;

/// Buckets with fewer unique records than this are dropped.
pub const MIN_CLUSTER_RECORDS: usize = 3;

/// One face cell's worth of defects, ready for geometry synthesis.
#[derive(Debug, Clone, PartialEq)]
pub struct Cluster {
    pub face: FaceId,
    /// The kept records, strongest first
    pub records: Vec<DefectRecord>,
    /// Record positions after the placement transform
    pub points: Vec<Point3<Real>>,
    /// `|strength − 1|` of each kept record
    pub depths: Vec<Real>,
    pub form_factor: Real,
    pub label: Label,
    /// Rendered as one tube rather than one solid per point
    pub connected: bool,
}

impl Cluster {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    fn leading_strength(&self) -> Real {
        self.records.first().map_or(0.0, |r| r.strength)
    }
}

/// Clusters of one run plus the global share of `pos` records they were normalised against.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub clusters: Vec<Cluster>,
    pub cluster_ratio: Real,
}

#[derive(Debug, Clone, Copy)]
pub struct FeatureClassifier {
    max_segs: usize,
    center: Point3<Real>,
}

impl FeatureClassifier {
    /// Keep at most `max_segs` records per face; placements scale about `center`.
    pub fn new(max_segs: usize, center: Point3<Real>) -> Self {
        FeatureClassifier {
            max_segs: max_segs.max(1),
            center,
        }
    }

    pub fn classify(&self, store: &DefectStore) -> Classification {
        // 1) dedup, rank and subsample every bucket
        let mut kept: Vec<(FaceId, Vec<DefectRecord>)> = Vec::new();
        for id in store.face_ids() {
            let unique = store.unique_ranked(&id);
            if unique.len() < MIN_CLUSTER_RECORDS {
                log::debug!("face {id}: {} unique defects, dropped", unique.len());
                continue;
            }
            kept.push((id, self.subsample(unique)));
        }

        // 2) global statistics over every kept record
        let mut tally = LabelTally::default();
        let mut depth_sum = 0.0;
        for (_, records) in &kept {
            for r in records {
                tally.add(r.label);
                depth_sum += r.depth();
            }
        }
        let cluster_ratio = tally.pos_ratio().unwrap_or(0.5);
        let global_depth = if tally.total() == 0 {
            0.0
        } else {
            depth_sum / tally.total() as Real
        };

        // 3) per-cluster form factor, label, connectivity and placement
        let mut clusters: Vec<Cluster> = kept
            .into_iter()
            .map(|(face, records)| self.build_cluster(face, records, cluster_ratio, global_depth))
            .collect();

        clusters.sort_by(|a, b| {
            b.leading_strength()
                .total_cmp(&a.leading_strength())
                .then_with(|| a.face.cmp(&b.face))
        });

        log::debug!(
            "{} clusters, pos ratio {:.3}",
            clusters.len(),
            cluster_ratio
        );

        Classification {
            clusters,
            cluster_ratio,
        }
    }

    /// Every `stride`-th record, with the stride chosen to keep at most `max_segs`.
    fn subsample(&self, ranked: Vec<DefectRecord>) -> Vec<DefectRecord> {
        let stride = ranked.len().div_ceil(self.max_segs).max(1);
        ranked.into_iter().step_by(stride).collect()
    }

    fn build_cluster(
        &self,
        face: FaceId,
        records: Vec<DefectRecord>,
        cluster_ratio: Real,
        global_depth: Real,
    ) -> Cluster {
        let len = records.len();
        let depths: Vec<Real> = records.iter().map(DefectRecord::depth).collect();
        let pos = records.iter().filter(|r| r.label == Label::Pos).count();

        let weight = pos as Real / len as Real;
        let depth_score = depths.iter().sum::<Real>() / len as Real;
        let form_factor = form_factor(weight, depth_score, cluster_ratio, global_depth);

        let label = if form_factor >= 1.0 && pos > 0 {
            Label::Pos
        } else {
            Label::Neg
        };
        let connected = is_connected(form_factor, &depths);

        let points = records
            .iter()
            .enumerate()
            .map(|(i, r)| {
                let scale = placement_scale(label, connected, i, len, form_factor);
                self.center + (r.position - self.center) * scale
            })
            .collect();

        Cluster {
            face,
            records,
            points,
            depths,
            form_factor,
            label,
            connected,
        }
    }
}

/// Even blend of how `pos`-heavy and how deep a cluster is, each relative to the run.
pub fn form_factor(weight: Real, depth: Real, cluster_ratio: Real, global_depth: Real) -> Real {
    // no pos records anywhere: nothing can skew pos
    let weight_term = if cluster_ratio.abs() < EPSILON {
        0.0
    } else {
        weight / cluster_ratio
    };
    let depth_term = if global_depth.abs() < EPSILON {
        1.0
    } else {
        depth / global_depth
    };
    0.5 * weight_term + 0.5 * depth_term
}

/// Outlying form factors, or a wide spread between the first and last depth, ask for one
/// continuous feature.
pub fn is_connected(form_factor: Real, depths: &[Real]) -> bool {
    if form_factor > 1.2 || form_factor < 0.8 {
        return true;
    }
    let (Some(&first), Some(&last)) = (depths.first(), depths.last()) else {
        return false;
    };
    let r = (first + EPSILON) / (last + EPSILON);
    r.max(1.0 / r) > 1.5
}

/// Radial scale applied to point `index` of a cluster of `len` points.
///
/// Connected clusters taper along the sequence: `neg` grows from the centre outwards, `pos`
/// shrinks towards the shell. Disconnected `neg` points push out gradually and
/// disconnected `pos` points push out in proportion to the form factor.
pub fn placement_scale(
    label: Label,
    connected: bool,
    index: usize,
    len: usize,
    form_factor: Real,
) -> Real {
    let prc = (index + 1) as Real / len.max(1) as Real;
    match (connected, label) {
        (true, Label::Neg) => prc + 0.25,
        (true, Label::Pos) => 1.25 - 0.25 * prc,
        (false, Label::Neg) => 1.0 + 0.25 * prc,
        (false, Label::Pos) => 1.0 + 0.1 * form_factor,
    }
}
