//! Coarse-to-fine displacement of a mesh towards a cube signal.

use crate::defects::{DefectRecord, DefectStore, DefectThresholds};
use crate::float_types::{EPSILON, Real};
use crate::mesh::WorkingMesh;
use crate::pyramid::MipPyramid;
use crate::raycast::{RaySampler, Sample};
use crate::signal::CubeSignal;
use nalgebra::{Point3, Vector3};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Hits are pulled this far from the cube surface back towards the centre before they are
/// used as targets. A neutral sample then lands on the shell of the mesh itself.
pub const RELAX: Real = 0.375;

/// Incremental mean of the strength and target point seen by one vertex.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunningMean {
    pub strength: Real,
    pub target: Vector3<Real>,
    pub samples: u32,
}

impl Default for RunningMean {
    fn default() -> Self {
        RunningMean {
            strength: 0.0,
            target: Vector3::zeros(),
            samples: 0,
        }
    }
}

impl RunningMean {
    /// Fold one more observation into the mean.
    pub fn push(&mut self, strength: Real, target: &Point3<Real>) {
        self.samples += 1;
        let n = self.samples as Real;
        self.strength += (strength - self.strength) / n;
        self.target += (target.coords - self.target) / n;
    }

    pub const fn is_empty(&self) -> bool {
        self.samples == 0
    }
}

/// What the two rays of one triangle found during a pass.
struct TriangleSample {
    corners: [u32; 3],
    midpoint: Point3<Real>,
    surface: Option<Sample>,
    center_ward: Option<Sample>,
}

/// Iterates from `total` down to 0, sampling the signal at increasing resolution and
/// accumulating per-vertex targets. Vertex positions are only written by [`finish`].
///
/// [`finish`]: DisplacementEngine::finish
#[derive(Debug, Clone)]
pub struct DisplacementEngine {
    total: u32,
    iteration: u32,
    sampler: RaySampler,
    thresholds: DefectThresholds,
    means: Vec<RunningMean>,
    store: DefectStore,
}

impl DisplacementEngine {
    pub fn new(
        total: u32,
        sampler: RaySampler,
        thresholds: DefectThresholds,
        vertex_count: usize,
    ) -> Self {
        let total = total.max(1);
        DisplacementEngine {
            total,
            iteration: total,
            sampler,
            thresholds,
            means: vec![RunningMean::default(); vertex_count],
            store: DefectStore::new(),
        }
    }

    /// Iterations still to run; 0 once the engine is done.
    pub const fn current_iteration(&self) -> u32 {
        self.iteration
    }

    pub const fn total_iterations(&self) -> u32 {
        self.total
    }

    pub const fn is_finished(&self) -> bool {
        self.iteration == 0
    }

    /// The iteration (counting down) that also writes vertex colours.
    pub const fn color_iteration(&self) -> u32 {
        self.total.div_ceil(2)
    }

    pub fn means(&self) -> &[RunningMean] {
        &self.means
    }

    pub fn store(&self) -> &DefectStore {
        &self.store
    }

    /// Run one iteration against `signal`. Returns `true` while iterations remain.
    pub fn step(&mut self, mesh: &mut WorkingMesh, signal: &CubeSignal) -> bool {
        if self.is_finished() {
            return false;
        }

        // 1) a fresh pyramid level for this iteration, dropped at the end of the step
        let level = MipPyramid::level_size(signal.size(), self.iteration, self.total);
        let pyramid = MipPyramid::build(signal, level);
        let coloring = self.iteration == self.color_iteration();
        if coloring {
            mesh.ensure_colors();
        }
        log::debug!(
            "displacement iteration {} of {} at {}px",
            self.iteration,
            self.total,
            level
        );

        // 2) cast both rays of every triangle
        let samples = self.sample_triangles(mesh, &pyramid, coloring);

        // 3) fold samples in triangle order
        let center = self.sampler.center();
        let mut misses = 0usize;
        for ts in samples {
            if let Some(surface) = ts.surface.filter(|s| !s.rgba.is_transparent()) {
                let rgb = surface.rgba.to_unit_rgb();
                for &i in &ts.corners {
                    mesh.set_color(i as usize, rgb);
                }
            }

            let Some(sample) = ts.center_ward else {
                misses += 1;
                continue;
            };
            if sample.rgba.is_transparent() {
                log::trace!("no signal at {} for triangle {:?}", sample.hit.face, ts.corners);
                continue;
            }

            // displacement follows the raw signal, defects are judged against its neutral
            let raw = sample.rgba.strength();
            let relaxed = center + (sample.hit.point - center) * RELAX;
            for &i in &ts.corners {
                self.means[i as usize].push(raw, &relaxed);
            }

            let strength = self.thresholds.relative(raw);
            if let Some(label) = self.thresholds.label(strength) {
                let reach = strength.clamp(0.0, 2.0);
                self.store.record(DefectRecord {
                    strength,
                    position: ts.midpoint + (relaxed - ts.midpoint) * reach,
                    face: sample.hit.face,
                    label,
                });
            }
        }
        if misses > 0 {
            log::trace!("{misses} triangles missed the signal cube");
        }

        self.iteration -= 1;
        !self.is_finished()
    }

    /// Move every sampled vertex towards its mean target and hand back the defects.
    pub fn finish(self, mesh: &mut WorkingMesh) -> DefectStore {
        let mut unsampled = 0usize;
        for (i, mean) in self.means.iter().enumerate() {
            if mean.is_empty() {
                unsampled += 1;
                continue;
            }
            let original = mesh.positions()[i];
            let factor = mean.strength.clamp(0.0, 2.0);
            let target = Point3::from(mean.target);
            mesh.set_position(i, original + (target - original) * factor);
        }
        if unsampled > 0 {
            log::debug!("{unsampled} vertices received no sample and keep their position");
        }
        mesh.recompute_normals();
        self.store
    }

    #[cfg(not(feature = "parallel"))]
    fn sample_triangles(
        &self,
        mesh: &WorkingMesh,
        pyramid: &MipPyramid,
        coloring: bool,
    ) -> Vec<TriangleSample> {
        mesh.triangles()
            .iter()
            .map(|tri| self.sample_triangle(mesh, tri, pyramid, coloring))
            .collect()
    }

    #[cfg(feature = "parallel")]
    fn sample_triangles(
        &self,
        mesh: &WorkingMesh,
        pyramid: &MipPyramid,
        coloring: bool,
    ) -> Vec<TriangleSample> {
        mesh.triangles()
            .par_iter()
            .map(|tri| self.sample_triangle(mesh, tri, pyramid, coloring))
            .collect()
    }

    fn sample_triangle(
        &self,
        mesh: &WorkingMesh,
        tri: &[u32; 3],
        pyramid: &MipPyramid,
        coloring: bool,
    ) -> TriangleSample {
        let [a, b, c] = mesh.triangle_points(tri);
        let midpoint = Point3::from((a.coords + b.coords + c.coords) / 3.0);
        let center = self.sampler.center();

        let surface = if coloring {
            (b - a)
                .cross(&(c - a))
                .try_normalize(EPSILON)
                .and_then(|normal| self.sampler.sample(pyramid, &midpoint, &normal))
        } else {
            None
        };

        TriangleSample {
            corners: *tri,
            midpoint,
            surface,
            center_ward: self.sampler.sample(pyramid, &center, &(midpoint - center)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defects::Label;
    use crate::signal::{CubeFace, FaceTexture, Rgba};

    fn engine_with(
        mesh: &WorkingMesh,
        total: u32,
        thresholds: DefectThresholds,
    ) -> DisplacementEngine {
        let (center, radius) = mesh.bounding_sphere();
        DisplacementEngine::new(
            total,
            RaySampler::new(center, 2.0 * radius, 2),
            thresholds,
            mesh.vertex_count(),
        )
    }

    fn engine_for(mesh: &WorkingMesh, total: u32) -> DisplacementEngine {
        engine_with(mesh, total, DefectThresholds::default())
    }

    #[test]
    fn running_mean_converges_to_repeated_value() {
        for k in 1..50 {
            let mut mean = RunningMean::default();
            for _ in 0..k {
                mean.push(0.7, &Point3::new(1.0, 2.0, 3.0));
            }
            assert_eq!(mean.strength, 0.7);
            assert_eq!(mean.target, Vector3::new(1.0, 2.0, 3.0));
            assert_eq!(mean.samples, k);
        }
    }

    #[test]
    fn counts_down_to_zero() {
        let mut mesh = WorkingMesh::icosphere(1.0, 1);
        let signal = CubeSignal::uniform(8, Rgba::new(128, 128, 128, 255));
        let mut engine = engine_for(&mesh, 3);
        assert_eq!(engine.color_iteration(), 2);
        assert!(engine.step(&mut mesh, &signal));
        assert_eq!(engine.current_iteration(), 2);
        assert!(engine.step(&mut mesh, &signal));
        assert!(!engine.step(&mut mesh, &signal));
        assert!(engine.is_finished());
        // stepping a finished engine is a no-op
        assert!(!engine.step(&mut mesh, &signal));
        assert_eq!(engine.current_iteration(), 0);
        assert!(mesh.colors().is_some());
    }

    #[test]
    fn neutral_signal_records_nothing_and_stays_on_the_shell() {
        let mut mesh = WorkingMesh::icosphere(4.0, 2);
        let signal = CubeSignal::uniform(8, Rgba::new(128, 128, 128, 255));
        let mut engine = engine_for(&mesh, 1);
        engine.step(&mut mesh, &signal);
        let store = engine.finish(&mut mesh);
        assert!(store.is_empty());
        for p in mesh.positions() {
            let r = p.coords.norm();
            assert!((2.0..=6.0).contains(&r), "radius {r}");
        }
    }

    #[test]
    fn transparent_signal_leaves_the_mesh_alone() {
        let mut mesh = WorkingMesh::icosphere(1.0, 1);
        let before = mesh.positions().to_vec();
        let signal = CubeSignal::uniform(8, Rgba::TRANSPARENT);
        let mut engine = engine_for(&mesh, 2);
        while engine.step(&mut mesh, &signal) {}
        assert!(engine.means().iter().all(RunningMean::is_empty));
        let store = engine.finish(&mut mesh);
        assert!(store.is_empty());
        assert_eq!(mesh.positions(), before.as_slice());
    }

    #[test]
    fn dark_and_bright_faces_are_labelled() {
        let mut mesh = WorkingMesh::icosphere(1.0, 2);
        let mut signal = CubeSignal::uniform(8, Rgba::new(128, 128, 128, 255));
        signal
            .set_face(CubeFace::PosY, FaceTexture::filled(8, Rgba::new(255, 255, 255, 255)))
            .unwrap();
        signal
            .set_face(CubeFace::NegY, FaceTexture::filled(8, Rgba::new(0, 0, 0, 255)))
            .unwrap();
        let mut engine = engine_for(&mesh, 1);
        engine.step(&mut mesh, &signal);
        let store = engine.finish(&mut mesh);
        assert!(!store.is_empty());
        for id in store.face_ids() {
            let expected = match id.face {
                CubeFace::PosY => Label::Pos,
                CubeFace::NegY => Label::Neg,
                other => panic!("unexpected bucket on {other:?}"),
            };
            assert!(store.bucket(&id).unwrap().iter().all(|r| r.label == expected));
        }
    }

    #[test]
    fn dim_signal_is_judged_against_its_own_neutral() {
        let dim = Rgba::new(64, 64, 64, 255);
        let mut signal = CubeSignal::uniform(8, dim);
        signal
            .set_face(CubeFace::PosZ, FaceTexture::filled(8, Rgba::new(160, 160, 160, 255)))
            .unwrap();

        // against 1.0 every dim face is a neg defect
        let mut mesh = WorkingMesh::icosphere(1.0, 2);
        let mut engine = engine_for(&mesh, 1);
        engine.step(&mut mesh, &signal);
        let absolute = engine.finish(&mut mesh);
        assert!(absolute.face_ids().iter().any(|id| id.face == CubeFace::NegX));

        // against the signal's own neutral only the brighter face stands out
        let thresholds = DefectThresholds::default().with_neutral(dim.strength());
        let mut mesh = WorkingMesh::icosphere(1.0, 2);
        let mut engine = engine_with(&mesh, 1, thresholds);
        engine.step(&mut mesh, &signal);
        let relative = engine.finish(&mut mesh);
        let ids = relative.face_ids();
        assert!(!ids.is_empty());
        for id in ids {
            assert_eq!(id.face, CubeFace::PosZ);
            for r in relative.bucket(&id).unwrap() {
                assert_eq!(r.label, Label::Pos);
                assert!((r.strength - 2.5).abs() < 1e-9, "strength {}", r.strength);
            }
        }
    }
}
