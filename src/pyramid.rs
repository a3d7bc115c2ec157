//! Per-iteration down-sampled copies of a cube signal.

use crate::float_types::Real;
use crate::signal::{CubeFace, CubeSignal, FaceTexture, Rgba};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// One level of the pyramid: the six faces of a signal box-filtered to `level × level`.
///
/// A level is built for a single iteration and dropped before the next one is built.
#[derive(Debug, Clone)]
pub struct MipPyramid {
    level: usize,
    faces: Vec<FaceTexture>,
}

impl MipPyramid {
    /// Edge length for `iteration` of a run of `total`, counting down from `total` to 1.
    ///
    /// The first iteration reads a `1/total` scale copy and the last one reads the full
    /// resolution, so detail only ever increases over a run.
    pub fn level_size(resolution: usize, iteration: u32, total: u32) -> usize {
        let total = total.max(1);
        let iteration = iteration.clamp(1, total);
        let share = (total - iteration + 1) as Real / total as Real;
        ((resolution as Real * share).round() as usize).clamp(1, resolution.max(1))
    }

    /// Down-sample every face of `signal` to `level × level`.
    #[cfg(not(feature = "parallel"))]
    pub fn build(signal: &CubeSignal, level: usize) -> Self {
        let faces = signal
            .faces()
            .iter()
            .map(|face| face.downsample(level))
            .collect();
        MipPyramid { level, faces }
    }

    /// Down-sample every face of `signal` to `level × level`, one face per task.
    #[cfg(feature = "parallel")]
    pub fn build(signal: &CubeSignal, level: usize) -> Self {
        let faces = signal
            .faces()
            .par_iter()
            .map(|face| face.downsample(level))
            .collect();
        MipPyramid { level, faces }
    }

    pub const fn level(&self) -> usize {
        self.level
    }

    pub fn face(&self, face: CubeFace) -> &FaceTexture {
        &self.faces[face.index()]
    }

    /// Pixel of `face` under `(u, v)`, read at `(u, 1 − v)`.
    pub fn sample(&self, face: CubeFace, u: Real, v: Real) -> Rgba {
        self.face(face).sample_uv(u, v)
    }
}
