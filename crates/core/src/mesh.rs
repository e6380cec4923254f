use glam::Vec3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Aabb {
    pub fn new(min: [f32; 3], max: [f32; 3]) -> Self {
        Self { min, max }
    }

    pub fn size(&self) -> Vec3 {
        Vec3::from(self.max) - Vec3::from(self.min)
    }

    pub fn expanded(&self, amount: f32) -> Self {
        Self {
            min: (Vec3::from(self.min) - Vec3::splat(amount)).to_array(),
            max: (Vec3::from(self.max) + Vec3::splat(amount)).to_array(),
        }
    }

    pub fn is_valid(&self) -> bool {
        let size = self.size();
        size.is_finite() && size.min_element() > 0.0
    }
}

/// Indexed triangle list produced by contouring.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub positions: Vec<[f32; 3]>,
    pub indices: Vec<u32>,
    pub normals: Option<Vec<[f32; 3]>>,
}

impl Mesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn bounds(&self) -> Option<Aabb> {
        let (first, rest) = self.positions.split_first()?;
        let (min, max) = rest.iter().fold(
            (Vec3::from(*first), Vec3::from(*first)),
            |(min, max), p| (min.min(Vec3::from(*p)), max.max(Vec3::from(*p))),
        );
        Some(Aabb::new(min.to_array(), max.to_array()))
    }

    /// Area-weighted vertex normals. False when the index list is malformed.
    pub fn compute_normals(&mut self) -> bool {
        if self.indices.len() % 3 != 0 || self.positions.is_empty() {
            return false;
        }
        let count = self.positions.len();
        let mut accum = vec![Vec3::ZERO; count];
        for tri in self.indices.chunks_exact(3) {
            let [a, b, c] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
            if a >= count || b >= count || c >= count {
                continue;
            }
            let p0 = Vec3::from(self.positions[a]);
            let face = (Vec3::from(self.positions[b]) - p0).cross(Vec3::from(self.positions[c]) - p0);
            accum[a] += face;
            accum[b] += face;
            accum[c] += face;
        }
        self.normals = Some(
            accum
                .into_iter()
                .map(|n| n.try_normalize().unwrap_or(Vec3::Y).to_array())
                .collect(),
        );
        true
    }
}
