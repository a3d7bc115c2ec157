//! Indexed triangle buffers for the synthesized feature solids.
//!
//! Every buffer uses the same [`Vertex`] layout, so solids of one label can be appended into a
//! single aggregate geometry without conversion.

use crate::float_types::parry3d::bounding_volume::Aabb;
use crate::float_types::{EPSILON, Real, TAU};
use crate::vertex::Vertex;
use hashbrown::HashMap;
use nalgebra::{Point3, Rotation3, Vector3};

#[cfg(feature = "chull-io")]
use chull::ConvexHullWrapper;

/// An indexed triangle soup with per-vertex position, normal, UV and colour.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct SolidBuffer {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl SolidBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a buffer from bare positions and triangles. Normals start at zero.
    pub fn from_parts(positions: Vec<Point3<Real>>, triangles: &[[u32; 3]]) -> Self {
        SolidBuffer {
            vertices: positions
                .into_iter()
                .map(|p| Vertex::new(p, Vector3::zeros()))
                .collect(),
            indices: triangles.iter().flatten().copied().collect(),
        }
    }

    /// Regular tetrahedron with edge length `edge`, rotated then moved to `center`.
    pub fn tetrahedron(center: &Point3<Real>, edge: Real, rotation: &Rotation3<Real>) -> Self {
        let s = edge / (2.0 * (2.0 as Real).sqrt());
        let corners = [
            Vector3::new(1.0, 1.0, 1.0),
            Vector3::new(1.0, -1.0, -1.0),
            Vector3::new(-1.0, 1.0, -1.0),
            Vector3::new(-1.0, -1.0, 1.0),
        ];
        let positions = corners
            .iter()
            .map(|c| center + rotation * (c * s))
            .collect();
        let mut solid = Self::from_parts(positions, &[[0, 1, 2], [0, 3, 1], [0, 2, 3], [1, 3, 2]]);
        solid.orient_outward(center);
        solid
    }

    /// Cube with edge length `edge`, rotated then moved to `center`.
    pub fn cube(center: &Point3<Real>, edge: Real, rotation: &Rotation3<Real>) -> Self {
        let h = edge * 0.5;
        let mut positions = Vec::with_capacity(8);
        for &x in &[-h, h] {
            for &y in &[-h, h] {
                for &z in &[-h, h] {
                    positions.push(center + rotation * Vector3::new(x, y, z));
                }
            }
        }
        // corner index = 4x + 2y + z
        let triangles = [
            // -x
            [0, 1, 3],
            [0, 3, 2],
            // +x
            [4, 6, 7],
            [4, 7, 5],
            // -y
            [0, 4, 5],
            [0, 5, 1],
            // +y
            [2, 3, 7],
            [2, 7, 6],
            // -z
            [0, 2, 6],
            [0, 6, 4],
            // +z
            [1, 5, 7],
            [1, 7, 3],
        ];
        let mut solid = Self::from_parts(positions, &triangles);
        solid.orient_outward(center);
        solid
    }

    /// Sweep a regular `sides`-gon of `radius` along a Catmull–Rom curve through `path`,
    /// closing both ends with triangle fans.
    ///
    /// Returns an empty buffer when `path` has fewer than two distinct points.
    pub fn tube(path: &[Point3<Real>], radius: Real, sides: usize, samples_per_span: usize) -> Self {
        let sides = sides.max(3);
        let mut control: Vec<Point3<Real>> = Vec::with_capacity(path.len());
        for p in path {
            if control.last().is_none_or(|last| (p - last).norm() > EPSILON) {
                control.push(*p);
            }
        }
        if control.len() < 2 {
            return Self::new();
        }

        // 1) sample the curve
        let curve = catmull_rom_curve(&control, samples_per_span.max(1));

        // 2) tangents and parallel-transported frames
        let n = curve.len();
        let tangents: Vec<Vector3<Real>> = (0..n)
            .map(|i| {
                let a = curve[i.saturating_sub(1)];
                let b = curve[(i + 1).min(n - 1)];
                (b - a).try_normalize(EPSILON).unwrap_or_else(Vector3::z)
            })
            .collect();
        let mut normal = any_perpendicular(&tangents[0]);
        let mut frames = Vec::with_capacity(n);
        for (i, t) in tangents.iter().enumerate() {
            if i > 0 {
                if let Some(rot) = Rotation3::rotation_between(&tangents[i - 1], t) {
                    normal = rot * normal;
                }
                // re-orthogonalise against drift
                normal = (normal - t * normal.dot(t))
                    .try_normalize(EPSILON)
                    .unwrap_or_else(|| any_perpendicular(t));
            }
            frames.push((normal, t.cross(&normal)));
        }

        // 3) rings
        let mut positions = Vec::with_capacity(n * sides + 2);
        for (c, (nrm, bin)) in curve.iter().zip(&frames) {
            for k in 0..sides {
                let theta = TAU * k as Real / sides as Real;
                positions.push(c + (nrm * theta.cos() + bin * theta.sin()) * radius);
            }
        }

        let mut triangles = Vec::with_capacity(2 * sides * n);
        let ring = |j: usize, k: usize| (j * sides + k % sides) as u32;
        for j in 0..n - 1 {
            for k in 0..sides {
                let (a, b) = (ring(j, k), ring(j, k + 1));
                let (c, d) = (ring(j + 1, k), ring(j + 1, k + 1));
                triangles.push([a, b, c]);
                triangles.push([b, d, c]);
            }
        }

        // 4) caps
        let start = positions.len() as u32;
        positions.push(curve[0]);
        let end = positions.len() as u32;
        positions.push(curve[n - 1]);
        for k in 0..sides {
            triangles.push([start, ring(0, k + 1), ring(0, k)]);
            triangles.push([end, ring(n - 1, k), ring(n - 1, k + 1)]);
        }

        Self::from_parts(positions, &triangles)
    }

    /// Convex hull of the vertices of all `solids`, or `None` when the points span no
    /// volume.
    #[cfg(feature = "chull-io")]
    pub fn convex_hull(solids: &[SolidBuffer]) -> Option<SolidBuffer> {
        let points: Vec<Vec<Real>> = solids
            .iter()
            .flat_map(|s| s.vertices.iter().map(|v| vec![v.pos.x, v.pos.y, v.pos.z]))
            .collect();

        let hull = ConvexHullWrapper::try_new(&points, None).ok()?;
        let (verts, indices) = hull.vertices_indices();
        if verts.is_empty() || indices.is_empty() {
            return None;
        }

        let positions: Vec<Point3<Real>> = verts
            .iter()
            .map(|v| Point3::new(v[0], v[1], v[2]))
            .collect();
        let triangles: Vec<[u32; 3]> = indices
            .chunks_exact(3)
            .map(|t| [t[0] as u32, t[1] as u32, t[2] as u32])
            .collect();
        let centroid = Point3::from(
            positions.iter().map(|p| p.coords).sum::<Vector3<Real>>() / positions.len() as Real,
        );

        let mut solid = Self::from_parts(positions, &triangles);
        solid.orient_outward(&centroid);
        Some(solid)
    }

    /// Without hull support merging is declined and solids stay separate.
    #[cfg(not(feature = "chull-io"))]
    pub fn convex_hull(_solids: &[SolidBuffer]) -> Option<SolidBuffer> {
        log::debug!("hull merge unavailable without the chull-io feature");
        None
    }

    /// A zero-area quad at `center`, used when a label received no solids.
    pub fn placeholder(center: &Point3<Real>) -> Self {
        SolidBuffer {
            vertices: vec![Vertex::new(*center, Vector3::y()); 4],
            indices: vec![0, 1, 2, 0, 2, 3],
        }
    }

    /// `true` when no triangle of the buffer has any area.
    pub fn is_placeholder(&self) -> bool {
        !self.indices.is_empty() && self.triangles().all(|[a, b, c]| {
            let (a, b, c) = (self.pos(a), self.pos(b), self.pos(c));
            (b - a).cross(&(c - a)).norm() < EPSILON
        })
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn triangles(&self) -> impl Iterator<Item = [u32; 3]> + '_ {
        self.indices.chunks_exact(3).map(|t| [t[0], t[1], t[2]])
    }

    fn pos(&self, index: u32) -> Point3<Real> {
        self.vertices[index as usize].pos
    }

    /// Flip triangles whose normal points towards `center`. Only meaningful for solids that are
    /// star-shaped around `center`.
    pub fn orient_outward(&mut self, center: &Point3<Real>) {
        for tri in self.indices.chunks_exact_mut(3) {
            let (a, b, c) = (
                self.vertices[tri[0] as usize].pos,
                self.vertices[tri[1] as usize].pos,
                self.vertices[tri[2] as usize].pos,
            );
            let normal = (b - a).cross(&(c - a));
            let centroid = Point3::from((a.coords + b.coords + c.coords) / 3.0);
            if normal.dot(&(centroid - center)) < 0.0 {
                tri.swap(1, 2);
            }
        }
    }

    /// Merge vertices that share a position and drop the triangles this collapses.
    pub fn weld(&mut self) {
        let mut lookup: HashMap<VertexKey, u32> = HashMap::with_capacity(self.vertices.len());
        let mut welded: Vec<Vertex> = Vec::with_capacity(self.vertices.len());
        let remap: Vec<u32> = self
            .vertices
            .iter()
            .map(|v| {
                *lookup.entry(make_key(&v.pos)).or_insert_with(|| {
                    welded.push(*v);
                    (welded.len() - 1) as u32
                })
            })
            .collect();

        let mut indices = Vec::with_capacity(self.indices.len());
        for [a, b, c] in self.triangles() {
            let (a, b, c) = (remap[a as usize], remap[b as usize], remap[c as usize]);
            if a != b && b != c && a != c {
                indices.extend_from_slice(&[a, b, c]);
            }
        }
        self.vertices = welded;
        self.indices = indices;
    }

    /// Area-weighted smooth normals.
    pub fn recompute_normals(&mut self) {
        let mut normals = vec![Vector3::zeros(); self.vertices.len()];
        for [a, b, c] in self.triangles() {
            let (pa, pb, pc) = (self.pos(a), self.pos(b), self.pos(c));
            let n = (pb - pa).cross(&(pc - pa));
            for i in [a, b, c] {
                normals[i as usize] += n;
            }
        }
        for (v, n) in self.vertices.iter_mut().zip(normals) {
            v.normal = n.try_normalize(EPSILON).unwrap_or_else(Vector3::zeros);
        }
    }

    /// Spherical UVs around `center` and the distance colour ramp `(1 − d, s, s)` with
    /// `d = |p − center| / (4 × radius)`.
    pub fn shade(&mut self, center: &Point3<Real>, radius: Real, saturation: Real) {
        let span = (4.0 * radius).max(EPSILON);
        for v in &mut self.vertices {
            v.uv = v.spherical_uv(center);
            let d = ((v.pos - center).norm() / span).clamp(0.0, 1.0);
            v.color = [1.0 - d, saturation, saturation];
        }
    }

    /// Concatenate `other` onto this buffer.
    pub fn append(&mut self, other: &SolidBuffer) {
        let offset = self.vertices.len() as u32;
        self.vertices.extend_from_slice(&other.vertices);
        self.indices.extend(other.indices.iter().map(|i| i + offset));
    }

    /// Returns a [`parry3d::bounding_volume::Aabb`] of all vertices.
    pub fn bounding_box(&self) -> Aabb {
        let mut mins = Point3::new(Real::MAX, Real::MAX, Real::MAX);
        let mut maxs = Point3::new(-Real::MAX, -Real::MAX, -Real::MAX);
        for v in &self.vertices {
            mins = mins.inf(&v.pos);
            maxs = maxs.sup(&v.pos);
        }
        if self.vertices.is_empty() {
            return Aabb::new(Point3::origin(), Point3::origin());
        }
        Aabb::new(mins, maxs)
    }

    pub fn position_buffer(&self) -> Vec<Real> {
        self.vertices
            .iter()
            .flat_map(|v| [v.pos.x, v.pos.y, v.pos.z])
            .collect()
    }

    pub fn normal_buffer(&self) -> Vec<Real> {
        self.vertices
            .iter()
            .flat_map(|v| [v.normal.x, v.normal.y, v.normal.z])
            .collect()
    }

    pub fn uv_buffer(&self) -> Vec<Real> {
        self.vertices.iter().flat_map(|v| v.uv).collect()
    }

    pub fn color_buffer(&self) -> Vec<Real> {
        self.vertices.iter().flat_map(|v| v.color).collect()
    }
}

/// Uniform Catmull–Rom samples through `control`, `samples` per span, ending on the last
/// control point. End tangents reuse the end points as phantom neighbours.
fn catmull_rom_curve(control: &[Point3<Real>], samples: usize) -> Vec<Point3<Real>> {
    let last = control.len() - 1;
    let mut curve = Vec::with_capacity(last * samples + 1);
    for i in 0..last {
        let p0 = control[i.saturating_sub(1)];
        let p1 = control[i];
        let p2 = control[i + 1];
        let p3 = control[(i + 2).min(last)];
        for k in 0..samples {
            let t = k as Real / samples as Real;
            curve.push(catmull_rom_point(&p0, &p1, &p2, &p3, t, 0.5));
        }
    }
    curve.push(control[last]);
    curve
}

fn catmull_rom_point(
    p0: &Point3<Real>,
    p1: &Point3<Real>,
    p2: &Point3<Real>,
    p3: &Point3<Real>,
    t: Real,
    tension: Real,
) -> Point3<Real> {
    let t2 = t * t;
    let t3 = t2 * t;
    let b0 = -tension * t3 + 2.0 * tension * t2 - tension * t;
    let b1 = (2.0 - tension) * t3 + (tension - 3.0) * t2 + 1.0;
    let b2 = (tension - 2.0) * t3 + (3.0 - 2.0 * tension) * t2 + tension * t;
    let b3 = tension * t3 - tension * t2;
    Point3::from(p0.coords * b0 + p1.coords * b1 + p2.coords * b2 + p3.coords * b3)
}

/// A unit vector perpendicular to `v`, built against the axis `v` is least aligned with.
fn any_perpendicular(v: &Vector3<Real>) -> Vector3<Real> {
    let axis = if v.x.abs() <= v.y.abs() && v.x.abs() <= v.z.abs() {
        Vector3::x()
    } else if v.y.abs() <= v.z.abs() {
        Vector3::y()
    } else {
        Vector3::z()
    };
    v.cross(&axis).try_normalize(EPSILON).unwrap_or_else(Vector3::y)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct VertexKey(i64, i64, i64);

/// Round a coordinate to a 1e-8 grid for hashing
fn quantize(x: Real) -> i64 {
    (x * 1e8).round() as i64
}

fn make_key(pos: &Point3<Real>) -> VertexKey {
    VertexKey(quantize(pos.x), quantize(pos.y), quantize(pos.z))
}
