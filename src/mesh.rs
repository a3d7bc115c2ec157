//! The indexed triangle mesh that gets displaced.

use crate::errors::ValidationError;
use crate::float_types::parry3d::bounding_volume::Aabb;
use crate::float_types::{EPSILON, Real};
use hashbrown::HashMap;
use nalgebra::{Point3, Vector3};

/// Vertex positions, normals, optional colours and a triangle index buffer.
///
/// Owned by one pipeline run. Positions change only when a displacement is committed.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkingMesh {
    positions: Vec<Point3<Real>>,
    normals: Vec<Vector3<Real>>,
    colors: Option<Vec<[Real; 3]>>,
    triangles: Vec<[u32; 3]>,
}

impl WorkingMesh {
    /// Build a mesh from positions and triangles, checking every index.
    pub fn new(
        positions: Vec<Point3<Real>>,
        triangles: Vec<[u32; 3]>,
    ) -> Result<Self, ValidationError> {
        if positions.is_empty() || triangles.is_empty() {
            return Err(ValidationError::EmptyMesh);
        }
        let len = positions.len();
        if let Some(&index) = triangles
            .iter()
            .flatten()
            .find(|&&i| i as usize >= len)
        {
            return Err(ValidationError::IndexOutOfRange {
                index: index as usize,
                len,
            });
        }
        let mut mesh = WorkingMesh {
            normals: vec![Vector3::zeros(); len],
            positions,
            colors: None,
            triangles,
        };
        mesh.recompute_normals();
        Ok(mesh)
    }

    /// Build a mesh from the flat position/index buffers a geometry library hands out.
    pub fn from_buffers(positions: &[[Real; 3]], indices: &[u32]) -> Result<Self, ValidationError> {
        if indices.len() % 3 != 0 {
            return Err(ValidationError::RaggedIndices(indices.len()));
        }
        let points = positions
            .iter()
            .map(|&[x, y, z]| Point3::new(x, y, z))
            .collect();
        let triangles = indices
            .chunks_exact(3)
            .map(|t| [t[0], t[1], t[2]])
            .collect();
        Self::new(points, triangles)
    }

    /// Geodesic sphere: an icosahedron subdivided `subdivisions` times and pushed onto
    /// the sphere of `radius` around the origin.
    ///
    /// Meant as a stand-in base mesh for demos and tests.
    pub fn icosphere(radius: Real, subdivisions: u32) -> Self {
        let t = (1.0 + (5.0 as Real).sqrt()) / 2.0;
        let mut positions: Vec<Point3<Real>> = [
            [-1.0, t, 0.0],
            [1.0, t, 0.0],
            [-1.0, -t, 0.0],
            [1.0, -t, 0.0],
            [0.0, -1.0, t],
            [0.0, 1.0, t],
            [0.0, -1.0, -t],
            [0.0, 1.0, -t],
            [t, 0.0, -1.0],
            [t, 0.0, 1.0],
            [-t, 0.0, -1.0],
            [-t, 0.0, 1.0],
        ]
        .iter()
        .map(|&[x, y, z]| Point3::from(Vector3::new(x, y, z).normalize() * radius))
        .collect();

        let mut triangles: Vec<[u32; 3]> = vec![
            [0, 11, 5],
            [0, 5, 1],
            [0, 1, 7],
            [0, 7, 10],
            [0, 10, 11],
            [1, 5, 9],
            [5, 11, 4],
            [11, 10, 2],
            [10, 7, 6],
            [7, 1, 8],
            [3, 9, 4],
            [3, 4, 2],
            [3, 2, 6],
            [3, 6, 8],
            [3, 8, 9],
            [4, 9, 5],
            [2, 4, 11],
            [6, 2, 10],
            [8, 6, 7],
            [9, 8, 1],
        ];

        for _ in 0..subdivisions {
            // edge (low, high) -> index of its midpoint vertex
            let mut midpoints: HashMap<(u32, u32), u32> = HashMap::new();
            let mut midpoint = |a: u32, b: u32, positions: &mut Vec<Point3<Real>>| -> u32 {
                let key = (a.min(b), a.max(b));
                *midpoints.entry(key).or_insert_with(|| {
                    let mid = (positions[a as usize].coords + positions[b as usize].coords) * 0.5;
                    positions.push(Point3::from(mid.normalize() * radius));
                    (positions.len() - 1) as u32
                })
            };

            let mut next = Vec::with_capacity(triangles.len() * 4);
            for [a, b, c] in triangles {
                let ab = midpoint(a, b, &mut positions);
                let bc = midpoint(b, c, &mut positions);
                let ca = midpoint(c, a, &mut positions);
                next.push([a, ab, ca]);
                next.push([b, bc, ab]);
                next.push([c, ca, bc]);
                next.push([ab, bc, ca]);
            }
            triangles = next;
        }

        let len = positions.len();
        let mut mesh = WorkingMesh {
            positions,
            normals: vec![Vector3::zeros(); len],
            colors: None,
            triangles,
        };
        mesh.recompute_normals();
        mesh
    }

    pub fn positions(&self) -> &[Point3<Real>] {
        &self.positions
    }

    pub fn normals(&self) -> &[Vector3<Real>] {
        &self.normals
    }

    pub fn colors(&self) -> Option<&[[Real; 3]]> {
        self.colors.as_deref()
    }

    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.triangles
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// The three corner positions of `tri`.
    pub fn triangle_points(&self, tri: &[u32; 3]) -> [Point3<Real>; 3] {
        [
            self.positions[tri[0] as usize],
            self.positions[tri[1] as usize],
            self.positions[tri[2] as usize],
        ]
    }

    /// Flat `xyz` position buffer, for handing the mesh to a renderer.
    pub fn position_buffer(&self) -> Vec<Real> {
        self.positions
            .iter()
            .flat_map(|p| [p.x, p.y, p.z])
            .collect()
    }

    /// Flat triangle index buffer.
    pub fn index_buffer(&self) -> Vec<u32> {
        self.triangles.iter().flatten().copied().collect()
    }

    /// Axis-aligned bounds of all vertex positions.
    pub fn bounding_box(&self) -> Aabb {
        let mut mins = Point3::new(Real::MAX, Real::MAX, Real::MAX);
        let mut maxs = Point3::new(-Real::MAX, -Real::MAX, -Real::MAX);
        for p in &self.positions {
            mins.x = mins.x.min(p.x);
            mins.y = mins.y.min(p.y);
            mins.z = mins.z.min(p.z);
            maxs.x = maxs.x.max(p.x);
            maxs.y = maxs.y.max(p.y);
            maxs.z = maxs.z.max(p.z);
        }
        // no vertices: trivial box at the origin
        if mins.x > maxs.x {
            return Aabb::new(Point3::origin(), Point3::origin());
        }
        Aabb::new(mins, maxs)
    }

    /// Bounding sphere centred on the bounding-box centre.
    pub fn bounding_sphere(&self) -> (Point3<Real>, Real) {
        let center = self.bounding_box().center();
        let radius = self
            .positions
            .iter()
            .map(|p| (p - center).norm())
            .fold(0.0, Real::max);
        (center, radius)
    }

    /// Add a black colour buffer if the mesh has none.
    pub fn ensure_colors(&mut self) {
        if self.colors.is_none() {
            self.colors = Some(vec![[0.0; 3]; self.positions.len()]);
        }
    }

    pub(crate) fn set_color(&mut self, index: usize, rgb: [Real; 3]) {
        if let Some(colors) = self.colors.as_mut() {
            colors[index] = rgb;
        }
    }

    pub(crate) fn set_position(&mut self, index: usize, position: Point3<Real>) {
        self.positions[index] = position;
    }

    /// Area-weighted smooth vertex normals.
    pub fn recompute_normals(&mut self) {
        let mut normals = vec![Vector3::zeros(); self.positions.len()];
        for tri in &self.triangles {
            let [a, b, c] = self.triangle_points(tri);
            // cross product length is twice the area, which gives the weighting
            let n = (b - a).cross(&(c - a));
            for &i in tri {
                normals[i as usize] += n;
            }
        }
        for n in &mut normals {
            *n = n.try_normalize(EPSILON).unwrap_or_else(Vector3::zeros);
        }
        self.normals = normals;
    }
}
