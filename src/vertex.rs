use crate::float_types::{PI, Real, TAU};
use nalgebra::{Point3, Vector3};

/// A vertex of a synthesized solid. Every solid carries the same four attributes so that
/// any two can be concatenated into one buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vertex {
    pub pos: Point3<Real>,
    pub normal: Vector3<Real>,
    pub uv: [Real; 2],
    pub color: [Real; 3],
}

impl Vertex {
    /// Create a new [`Vertex`] with zero UVs and a black colour.
    pub const fn new(pos: Point3<Real>, normal: Vector3<Real>) -> Self {
        Vertex {
            pos,
            normal,
            uv: [0.0, 0.0],
            color: [0.0, 0.0, 0.0],
        }
    }

    /// Longitude/latitude of the vertex seen from `center`, both mapped to `[0, 1]`.
    pub fn spherical_uv(&self, center: &Point3<Real>) -> [Real; 2] {
        let d = self.pos - center;
        let r = d.norm();
        if r == 0.0 {
            return [0.5, 0.5];
        }
        let u = 0.5 + d.z.atan2(d.x) / TAU;
        let v = 0.5 - (d.y / r).clamp(-1.0, 1.0).asin() / PI;
        [u, v]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spherical_uv_poles_and_equator() {
        let c = Point3::origin();
        let top = Vertex::new(Point3::new(0.0, 2.0, 0.0), Vector3::y());
        assert!((top.spherical_uv(&c)[1] - 0.0).abs() < 1e-12);
        let bottom = Vertex::new(Point3::new(0.0, -2.0, 0.0), -Vector3::y());
        assert!((bottom.spherical_uv(&c)[1] - 1.0).abs() < 1e-12);
        let side = Vertex::new(Point3::new(1.0, 0.0, 0.0), Vector3::x());
        assert_eq!(side.spherical_uv(&c), [0.5, 0.5]);
        assert_eq!(Vertex::new(c, Vector3::x()).spherical_uv(&c), [0.5, 0.5]);
    }
}
