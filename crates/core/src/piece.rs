use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// How a piece merges into the running density.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CsgMode {
    #[default]
    Additive,
    Subtractive,
    Intersection,
}

impl CsgMode {
    pub fn combine(self, running: f32, term: f32) -> f32 {
        match self {
            CsgMode::Additive => running.max(term),
            CsgMode::Subtractive => running.min(-term),
            CsgMode::Intersection => running.min(term),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Primitive {
    Sphere {
        radius: f32,
    },
    Box {
        half_extents: [f32; 3],
    },
    Torus {
        major_radius: f32,
        minor_radius: f32,
    },
    Capsule {
        start: [f32; 3],
        end: [f32; 3],
        radius: f32,
    },
    /// Expression text embedded verbatim. It sees the sample point as `p`
    /// plus `shapeData`, `transformData` and both cursors.
    Custom {
        expression: String,
        #[serde(default)]
        params: Vec<f32>,
    },
}

/// Spine of joints; each consecutive pair forms a tapered capsule.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SegmentChain {
    pub points: Vec<[f32; 3]>,
    pub radii: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "shape", rename_all = "snake_case")]
pub enum PieceShape {
    Leaf(Primitive),
    Segment(SegmentChain),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Piece {
    #[serde(default)]
    pub mode: CsgMode,
    pub shape: PieceShape,
}

impl Piece {
    pub fn leaf(mode: CsgMode, primitive: Primitive) -> Self {
        Self {
            mode,
            shape: PieceShape::Leaf(primitive),
        }
    }

    pub fn segment(mode: CsgMode, chain: SegmentChain) -> Self {
        Self {
            mode,
            shape: PieceShape::Segment(chain),
        }
    }

    pub fn custom(mode: CsgMode, expression: impl Into<String>) -> Self {
        Self::leaf(
            mode,
            Primitive::Custom {
                expression: expression.into(),
                params: Vec::new(),
            },
        )
    }
}

/// CPU form of a piece's density, evaluated in the piece's local space.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Sampler {
    Sphere(f32),
    Box(Vec3),
    Torus(f32, f32),
    Capsule(Vec3, Vec3, f32),
    Chain(Vec<(Vec3, f32)>),
    Opaque,
}

impl Sampler {
    /// Positive inside, negative outside.
    pub(crate) fn density(&self, p: Vec3) -> Option<f32> {
        let value = match self {
            Sampler::Sphere(radius) => radius - p.length(),
            Sampler::Box(half) => {
                let q = p.abs() - *half;
                -(q.max(Vec3::ZERO).length() + q.max_element().min(0.0))
            }
            Sampler::Torus(major, minor) => {
                let q = Vec2::new(Vec2::new(p.x, p.z).length() - major, p.y);
                minor - q.length()
            }
            Sampler::Capsule(a, b, radius) => {
                let (distance, _) = segment_distance(p, *a, *b);
                radius - distance
            }
            Sampler::Chain(joints) => joints
                .windows(2)
                .map(|pair| {
                    let (a, ra) = pair[0];
                    let (b, rb) = pair[1];
                    let (distance, t) = segment_distance(p, a, b);
                    ra + (rb - ra) * t - distance
                })
                .fold(f32::NEG_INFINITY, f32::max),
            Sampler::Opaque => return None,
        };
        Some(value)
    }
}

fn segment_distance(p: Vec3, a: Vec3, b: Vec3) -> (f32, f32) {
    let ab = b - a;
    let len_sq = ab.length_squared();
    let t = if len_sq <= f32::EPSILON {
        0.0
    } else {
        ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0)
    };
    ((p - (a + ab * t)).length(), t)
}

/// Expression text, parameter words and CPU sampler for one contributing piece.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct EncodedPiece {
    pub expression: String,
    pub params: Vec<u32>,
    pub sampler: Sampler,
}

const LOCAL_POINT: &str = "localPoint(transformData, &transformCursor, p)";

fn finite(values: &[f32]) -> bool {
    values.iter().all(|v| v.is_finite())
}

fn words(values: &[f32]) -> Vec<u32> {
    values.iter().map(|v| v.to_bits()).collect()
}

impl PieceShape {
    /// `None` for degenerate geometry, which contributes nothing.
    pub(crate) fn encode(&self) -> Option<EncodedPiece> {
        match self {
            PieceShape::Leaf(primitive) => encode_primitive(primitive),
            PieceShape::Segment(chain) => encode_chain(chain),
        }
    }
}

fn encode_primitive(primitive: &Primitive) -> Option<EncodedPiece> {
    let leaf = |name: &str, values: &[f32], sampler: Sampler| EncodedPiece {
        expression: format!("{name}(shapeData, &shapeCursor, {LOCAL_POINT})"),
        params: words(values),
        sampler,
    };

    match primitive {
        Primitive::Sphere { radius } => {
            if !radius.is_finite() || *radius <= 0.0 {
                return None;
            }
            Some(leaf("sdSphere", &[*radius], Sampler::Sphere(*radius)))
        }
        Primitive::Box { half_extents } => {
            if !finite(half_extents) || half_extents.iter().any(|v| *v <= 0.0) {
                return None;
            }
            Some(leaf(
                "sdBox",
                half_extents,
                Sampler::Box(Vec3::from(*half_extents)),
            ))
        }
        Primitive::Torus {
            major_radius,
            minor_radius,
        } => {
            let values = [*major_radius, *minor_radius];
            if !finite(&values) || *major_radius <= 0.0 || *minor_radius <= 0.0 {
                return None;
            }
            Some(leaf(
                "sdTorus",
                &values,
                Sampler::Torus(*major_radius, *minor_radius),
            ))
        }
        Primitive::Capsule { start, end, radius } => {
            if !finite(start) || !finite(end) || !radius.is_finite() || *radius <= 0.0 {
                return None;
            }
            let mut values = Vec::with_capacity(7);
            values.extend_from_slice(start);
            values.extend_from_slice(end);
            values.push(*radius);
            Some(leaf(
                "sdCapsule",
                &values,
                Sampler::Capsule(Vec3::from(*start), Vec3::from(*end), *radius),
            ))
        }
        Primitive::Custom { expression, params } => {
            let expression = expression.trim();
            if expression.is_empty() || !finite(params) {
                return None;
            }
            Some(EncodedPiece {
                expression: expression.to_string(),
                params: words(params),
                sampler: Sampler::Opaque,
            })
        }
    }
}

fn encode_chain(chain: &SegmentChain) -> Option<EncodedPiece> {
    if chain.points.len() < 2 || chain.points.len() != chain.radii.len() {
        return None;
    }
    if !chain.points.iter().all(|p| finite(p)) || !finite(&chain.radii) {
        return None;
    }
    if chain.radii.iter().all(|r| *r <= 0.0) {
        return None;
    }

    let mut params = Vec::with_capacity(1 + chain.points.len() * 4);
    params.push(chain.points.len() as u32);
    let mut joints = Vec::with_capacity(chain.points.len());
    for (point, radius) in chain.points.iter().zip(&chain.radii) {
        let radius = radius.max(0.0);
        params.extend(words(point));
        params.push(radius.to_bits());
        joints.push((Vec3::from(*point), radius));
    }

    Some(EncodedPiece {
        expression: format!("sdSegmentChain(shapeData, &shapeCursor, {LOCAL_POINT})"),
        params,
        sampler: Sampler::Chain(joints),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degenerate_shapes_encode_to_nothing() {
        assert!(encode_primitive(&Primitive::Sphere { radius: 0.0 }).is_none());
        assert!(encode_primitive(&Primitive::Box {
            half_extents: [1.0, 0.0, 1.0]
        })
        .is_none());
        assert!(encode_primitive(&Primitive::Custom {
            expression: "  ".to_string(),
            params: Vec::new()
        })
        .is_none());
        let chain = SegmentChain {
            points: vec![[0.0, 0.0, 0.0]],
            radii: vec![1.0],
        };
        assert!(encode_chain(&chain).is_none());
    }

    #[test]
    fn chain_block_starts_with_joint_count() {
        let chain = SegmentChain {
            points: vec![[0.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 2.0, 0.0]],
            radii: vec![0.5, 0.4, 0.3],
        };
        let encoded = encode_chain(&chain).expect("encoded");
        assert_eq!(encoded.params.len(), 1 + 3 * 4);
        assert_eq!(encoded.params[0], 3);
        assert_eq!(f32::from_bits(encoded.params[4]), 0.5);
        assert!(encoded.expression.starts_with("sdSegmentChain("));
    }

    #[test]
    fn samplers_are_positive_inside() {
        let sphere = Sampler::Sphere(1.0);
        assert!(sphere.density(Vec3::ZERO).unwrap() > 0.0);
        assert!(sphere.density(Vec3::new(2.0, 0.0, 0.0)).unwrap() < 0.0);

        let cube = Sampler::Box(Vec3::splat(0.5));
        assert!((cube.density(Vec3::ZERO).unwrap() - 0.5).abs() < 1e-6);
        assert!((cube.density(Vec3::new(1.0, 0.0, 0.0)).unwrap() + 0.5).abs() < 1e-6);

        let torus = Sampler::Torus(1.0, 0.25);
        assert!(torus.density(Vec3::new(1.0, 0.0, 0.0)).unwrap() > 0.0);
        assert!(torus.density(Vec3::ZERO).unwrap() < 0.0);

        let chain = Sampler::Chain(vec![(Vec3::ZERO, 0.5), (Vec3::Y, 0.1)]);
        assert!((chain.density(Vec3::ZERO).unwrap() - 0.5).abs() < 1e-6);
        assert!(Sampler::Opaque.density(Vec3::ZERO).is_none());
    }

    #[test]
    fn combinators_follow_mode() {
        assert_eq!(CsgMode::Additive.combine(0.2, 0.5), 0.5);
        assert_eq!(CsgMode::Subtractive.combine(0.2, 0.5), -0.5);
        assert_eq!(CsgMode::Intersection.combine(0.2, 0.5), 0.2);
    }

    #[test]
    fn piece_json_uses_tagged_shapes() {
        let json = r#"{"mode":"subtractive","shape":{"kind":"leaf","shape":{"type":"sphere","radius":1.5}}}"#;
        let piece: Piece = serde_json::from_str(json).unwrap();
        assert_eq!(
            piece,
            Piece::leaf(CsgMode::Subtractive, Primitive::Sphere { radius: 1.5 })
        );
    }
}
