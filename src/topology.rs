//! Geometry synthesis for classified feature clusters.

use crate::classify::Cluster;
use crate::defects::Label;
use crate::float_types::{EPSILON, Real};
use crate::solid::SolidBuffer;
use nalgebra::{Point3, Rotation3};

/// Sides of the tube cross-section.
const TUBE_SIDES: usize = 5;
/// Curve samples between two consecutive cluster points.
const TUBE_SAMPLES: usize = 8;

/// The two aggregate buffers handed to the CSG/render stage.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputGeometry {
    pub pos: SolidBuffer,
    pub neg: SolidBuffer,
    /// Number of solids appended into `pos` (0 when it is the placeholder)
    pub pos_count: usize,
    pub neg_count: usize,
}

impl OutputGeometry {
    pub fn buffer(&self, label: Label) -> &SolidBuffer {
        match label {
            Label::Pos => &self.pos,
            Label::Neg => &self.neg,
        }
    }
}

/// Builds tubes, platonic solids and hulls around a mesh of bounding sphere
/// `(center, radius)`.
#[derive(Debug, Clone, Copy)]
pub struct TopologyBuilder {
    center: Point3<Real>,
    radius: Real,
}

impl TopologyBuilder {
    pub fn new(center: Point3<Real>, radius: Real) -> Self {
        TopologyBuilder { center, radius }
    }

    pub fn build(&self, clusters: &[Cluster]) -> OutputGeometry {
        let mut pos = SolidBuffer::new();
        let mut neg = SolidBuffer::new();
        let (mut pos_count, mut neg_count) = (0, 0);

        for cluster in clusters {
            let solids = if cluster.connected {
                self.connected(cluster)
            } else {
                self.discrete(cluster)
            };
            let (target, count) = match cluster.label {
                Label::Pos => (&mut pos, &mut pos_count),
                Label::Neg => (&mut neg, &mut neg_count),
            };
            for mut solid in solids {
                solid.weld();
                solid.recompute_normals();
                solid.shade(&self.center, self.radius, saturation(cluster.label));
                target.append(&solid);
                *count += 1;
            }
        }

        OutputGeometry {
            pos: self.finish(pos, Label::Pos),
            neg: self.finish(neg, Label::Neg),
            pos_count,
            neg_count,
        }
    }

    /// One tube through all points of the cluster.
    fn connected(&self, cluster: &Cluster) -> Vec<SolidBuffer> {
        let radius = 0.05 * self.radius * size_factor(cluster.form_factor);
        let tube = SolidBuffer::tube(&cluster.points, radius, TUBE_SIDES, TUBE_SAMPLES);
        if tube.is_empty() {
            log::debug!("cluster {} collapsed to a single point, no tube", cluster.face);
            return Vec::new();
        }
        vec![tube]
    }

    /// One platonic solid per point, with runs of uneven depth consolidated into hulls.
    fn discrete(&self, cluster: &Cluster) -> Vec<SolidBuffer> {
        let scale = size_factor(cluster.form_factor);
        let tolerance = match cluster.label {
            Label::Pos => 0.75,
            Label::Neg => 0.9,
        };

        let mut out = Vec::new();
        let mut group: Vec<SolidBuffer> = Vec::new();
        for (i, (point, &depth)) in cluster.points.iter().zip(&cluster.depths).enumerate() {
            let edge = (1.0 + depth) * 0.1 * self.radius * scale;
            let rotation = Rotation3::from_euler_angles(2.0 * depth, 1.0 - 4.0 * depth, 8.0 * depth);
            let solid = match cluster.label {
                Label::Pos => SolidBuffer::tetrahedron(point, edge, &rotation),
                Label::Neg => SolidBuffer::cube(point, edge, &rotation),
            };

            let joins = i > 0 && depth_ratio(cluster.depths[i - 1], depth) < tolerance;
            if !joins {
                flush_group(&mut group, &mut out);
            }
            group.push(solid);
        }
        flush_group(&mut group, &mut out);
        out
    }

    /// Substitute the placeholder for a label that received no solids.
    fn finish(&self, mut buffer: SolidBuffer, label: Label) -> SolidBuffer {
        if buffer.is_empty() {
            log::debug!("no {label} features, emitting placeholder");
            buffer = SolidBuffer::placeholder(&self.center);
            buffer.shade(&self.center, self.radius, saturation(label));
        }
        buffer
    }
}

/// Hull a group of two or more solids, keeping them separate if the hull fails.
fn flush_group(group: &mut Vec<SolidBuffer>, out: &mut Vec<SolidBuffer>) {
    match group.len() {
        0 => {}
        1 => out.append(group),
        _ => match SolidBuffer::convex_hull(group) {
            Some(hull) => {
                group.clear();
                out.push(hull);
            }
            None => out.append(group),
        },
    }
}

fn depth_ratio(a: Real, b: Real) -> Real {
    (a.min(b) + EPSILON) / (a.max(b) + EPSILON)
}

fn size_factor(form_factor: Real) -> Real {
    form_factor.clamp(0.5, 2.0)
}

fn saturation(label: Label) -> Real {
    match label {
        Label::Pos => 0.5,
        Label::Neg => 0.125,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defects::{DefectRecord, FaceId};
    use crate::signal::CubeFace;

    fn cluster(label: Label, connected: bool, depths: &[Real]) -> Cluster {
        let points: Vec<Point3<Real>> = (0..depths.len())
            .map(|i| Point3::new(1.0 + i as Real, 0.5 * i as Real, 0.0))
            .collect();
        let records = points
            .iter()
            .zip(depths)
            .map(|(p, d)| DefectRecord {
                strength: 1.0 + d,
                position: *p,
                face: FaceId::new(CubeFace::PosX, 0),
                label,
            })
            .collect();
        Cluster {
            face: FaceId::new(CubeFace::PosX, 0),
            records,
            points,
            depths: depths.to_vec(),
            form_factor: 1.0,
            label,
            connected,
        }
    }

    #[test]
    fn no_clusters_gives_two_placeholders() {
        let out = TopologyBuilder::new(Point3::origin(), 1.0).build(&[]);
        assert!(out.pos.is_placeholder());
        assert!(out.neg.is_placeholder());
        assert_eq!((out.pos_count, out.neg_count), (0, 0));
        assert_eq!(out.pos.vertices[0].color[1], 0.5);
        assert_eq!(out.neg.vertices[0].color[1], 0.125);
    }

    #[test]
    fn even_depths_stay_separate() {
        let c = cluster(Label::Pos, false, &[0.5, 0.5, 0.5]);
        let out = TopologyBuilder::new(Point3::origin(), 1.0).build(&[c]);
        assert_eq!(out.pos_count, 3);
        assert_eq!(out.pos.vertex_count(), 12);
        assert_eq!(out.pos.triangle_count(), 12);
        assert!(out.neg.is_placeholder());
    }

    #[cfg(feature = "chull-io")]
    #[test]
    fn uneven_depths_are_hulled() {
        let c = cluster(Label::Neg, false, &[0.9, 0.4, 0.4]);
        let out = TopologyBuilder::new(Point3::origin(), 1.0).build(&[c]);
        // the first two merge, the third matches its neighbour
        assert_eq!(out.neg_count, 2);
        assert!(out.pos.is_placeholder());
        assert!(!out.neg.is_placeholder());
    }

    #[test]
    fn connected_cluster_becomes_one_tube() {
        let c = cluster(Label::Neg, true, &[0.2, 0.5, 0.9]);
        let out = TopologyBuilder::new(Point3::origin(), 1.0).build(&[c]);
        assert_eq!(out.neg_count, 1);
        assert_eq!(out.neg.vertex_count(), 17 * TUBE_SIDES + 2);
        for v in &out.neg.vertices {
            assert!((v.normal.norm() - 1.0).abs() < 1e-9);
            assert_eq!(v.color[1], 0.125);
        }
    }

    #[test]
    fn depth_ratio_is_symmetric() {
        assert_eq!(depth_ratio(0.2, 0.8), depth_ratio(0.8, 0.2));
        assert!(depth_ratio(0.5, 0.5) > 0.999);
    }
}
