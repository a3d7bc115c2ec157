//! Ray casts into the cube-mapped signal shell.

use crate::defects::FaceId;
use crate::float_types::parry3d::{
    query::{Ray, RayCast},
    shape::Cuboid,
};
use crate::float_types::{EPSILON, Real};
use crate::pyramid::MipPyramid;
use crate::signal::{CubeFace, Rgba};
use nalgebra::{Isometry3, Point3, Vector3};

/// Where a ray left the signal cube.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubeHit {
    pub point: Point3<Real>,
    pub face: FaceId,
    pub uv: [Real; 2],
    pub distance: Real,
}

/// A cube hit together with the pyramid pixel under it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub rgba: Rgba,
    pub hit: CubeHit,
}

/// Casts rays against an implicit axis-aligned cube carrying the cube signal.
#[derive(Debug, Clone)]
pub struct RaySampler {
    center: Point3<Real>,
    half_extent: Real,
    cells: u16,
    cuboid: Cuboid,
}

impl RaySampler {
    /// A cube of `half_extent` around `center`, each face split into `cells × cells` buckets.
    pub fn new(center: Point3<Real>, half_extent: Real, cells: u32) -> Self {
        let cells = cells.clamp(1, 255) as u16;
        RaySampler {
            center,
            half_extent,
            cells,
            cuboid: Cuboid::new(Vector3::repeat(half_extent)),
        }
    }

    pub const fn center(&self) -> Point3<Real> {
        self.center
    }

    pub const fn half_extent(&self) -> Real {
        self.half_extent
    }

    /// Cast from `origin` along `direction`. Rays starting inside the cube report where
    /// they leave it. Returns `None` when the ray misses or `direction` is degenerate.
    pub fn cast(&self, origin: &Point3<Real>, direction: &Vector3<Real>) -> Option<CubeHit> {
        let norm = direction.norm();
        if !norm.is_finite() || norm < EPSILON {
            return None;
        }
        let ray = Ray::new(*origin, direction / norm);
        let iso = Isometry3::translation(self.center.x, self.center.y, self.center.z);
        let toi = self.cuboid.cast_ray(&iso, &ray, Real::MAX, false)?;
        let point = ray.point_at(toi);

        let local = (point - self.center) / self.half_extent;
        let face = dominant_face(&local);
        let uv = face_uv(face, &local);
        Some(CubeHit {
            point,
            face: FaceId::new(face, self.cell_of(uv)),
            uv,
            distance: toi,
        })
    }

    /// Cast and read the pyramid pixel under the hit.
    pub fn sample(
        &self,
        pyramid: &MipPyramid,
        origin: &Point3<Real>,
        direction: &Vector3<Real>,
    ) -> Option<Sample> {
        let hit = self.cast(origin, direction)?;
        let rgba = pyramid.sample(hit.face.face, hit.uv[0], hit.uv[1]);
        Some(Sample { rgba, hit })
    }

    fn cell_of(&self, uv: [Real; 2]) -> u16 {
        let n = self.cells as Real;
        let last = self.cells - 1;
        let cx = ((uv[0] * n).floor().max(0.0) as u16).min(last);
        let cy = ((uv[1] * n).floor().max(0.0) as u16).min(last);
        cy * self.cells + cx
    }
}

/// Face whose axis dominates the (cube-normalised) point.
fn dominant_face(p: &Vector3<Real>) -> CubeFace {
    let (ax, ay, az) = (p.x.abs(), p.y.abs(), p.z.abs());
    if ax >= ay && ax >= az {
        if p.x >= 0.0 { CubeFace::PosX } else { CubeFace::NegX }
    } else if ay >= az {
        if p.y >= 0.0 { CubeFace::PosY } else { CubeFace::NegY }
    } else if p.z >= 0.0 {
        CubeFace::PosZ
    } else {
        CubeFace::NegZ
    }
}

/// Cube-map texture coordinates of a point on `face` of the unit cube.
fn face_uv(face: CubeFace, p: &Vector3<Real>) -> [Real; 2] {
    let (u, v) = match face {
        CubeFace::PosX => (-p.z, p.y),
        CubeFace::NegX => (p.z, p.y),
        CubeFace::PosY => (p.x, -p.z),
        CubeFace::NegY => (p.x, p.z),
        CubeFace::PosZ => (p.x, p.y),
        CubeFace::NegZ => (-p.x, p.y),
    };
    [
        ((u + 1.0) * 0.5).clamp(0.0, 1.0),
        ((v + 1.0) * 0.5).clamp(0.0, 1.0),
    ]
}
