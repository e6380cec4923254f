use std::collections::HashMap;

use glam::Vec3;
use thiserror::Error;

use crate::density::DensityKernel;
use crate::mesh::{Aabb, Mesh};
use crate::project::ContourSettings;

const MAX_RESOLUTION: u32 = 1024;

/// Cube corners, x fastest.
const CORNERS: [[usize; 3]; 8] = [
    [0, 0, 0],
    [1, 0, 0],
    [1, 1, 0],
    [0, 1, 0],
    [0, 0, 1],
    [1, 0, 1],
    [1, 1, 1],
    [0, 1, 1],
];

/// Six tetrahedra sharing the 0-6 diagonal. Neighbouring cubes agree on
/// face diagonals, so the surface stays closed.
const TETRAHEDRA: [[usize; 4]; 6] = [
    [0, 5, 1, 6],
    [0, 1, 2, 6],
    [0, 2, 3, 6],
    [0, 3, 7, 6],
    [0, 7, 4, 6],
    [0, 4, 5, 6],
];

#[derive(Debug, Error, PartialEq)]
pub enum ContourError {
    #[error("kernel contains custom expressions and cannot be sampled on the cpu")]
    NotCpuEvaluable,
    #[error("contour bounds {0:?} are empty or not finite")]
    InvalidBounds(Aabb),
}

#[derive(Debug, Clone, Copy)]
struct Grid {
    origin: Vec3,
    cell: Vec3,
    dims: [usize; 3],
}

impl Grid {
    fn new(bounds: &Aabb, resolution: u32) -> Self {
        let size = bounds.size();
        let step = size.max_element() / resolution.clamp(1, MAX_RESOLUTION) as f32;
        let cells = |extent: f32| ((extent / step).ceil() as usize).max(1);
        let dims = [cells(size.x), cells(size.y), cells(size.z)];
        Self {
            origin: Vec3::from(bounds.min),
            cell: size / Vec3::new(dims[0] as f32, dims[1] as f32, dims[2] as f32),
            dims,
        }
    }

    fn index(&self, x: usize, y: usize, z: usize) -> usize {
        x + (self.dims[0] + 1) * (y + (self.dims[1] + 1) * z)
    }

    fn point(&self, x: usize, y: usize, z: usize) -> Vec3 {
        self.origin + self.cell * Vec3::new(x as f32, y as f32, z as f32)
    }
}

/// Extracts the `iso_level` surface of the kernel's density over the
/// configured bounds with marching tetrahedra. Triangles face outward, away
/// from the dense side.
pub fn contour_density(
    kernel: &DensityKernel,
    settings: &ContourSettings,
) -> Result<Mesh, ContourError> {
    if !kernel.is_cpu_evaluable() {
        return Err(ContourError::NotCpuEvaluable);
    }
    let bounds = Aabb::new(settings.bounds_min, settings.bounds_max).expanded(settings.padding);
    if !bounds.is_valid() {
        return Err(ContourError::InvalidBounds(bounds));
    }

    let grid = Grid::new(&bounds, settings.resolution);
    let [nx, ny, nz] = grid.dims;
    let mut samples = Vec::with_capacity((nx + 1) * (ny + 1) * (nz + 1));
    for z in 0..=nz {
        for y in 0..=ny {
            for x in 0..=nx {
                let value = kernel
                    .sample(grid.point(x, y, z))
                    .ok_or(ContourError::NotCpuEvaluable)?;
                samples.push(value);
            }
        }
    }

    let mut builder = SurfaceBuilder {
        grid,
        samples: &samples,
        iso: settings.iso_level,
        mesh: Mesh::new(),
        edge_vertices: HashMap::new(),
    };
    for z in 0..nz {
        for y in 0..ny {
            for x in 0..nx {
                builder.polygonize_cell(x, y, z);
            }
        }
    }

    let mut mesh = builder.mesh;
    if !mesh.is_empty() {
        mesh.compute_normals();
    }
    tracing::info!(
        "contoured {}x{}x{} grid: {} vertices, {} triangles",
        nx,
        ny,
        nz,
        mesh.positions.len(),
        mesh.triangle_count()
    );
    Ok(mesh)
}

struct SurfaceBuilder<'a> {
    grid: Grid,
    samples: &'a [f32],
    iso: f32,
    mesh: Mesh,
    edge_vertices: HashMap<(usize, usize), u32>,
}

impl SurfaceBuilder<'_> {
    fn polygonize_cell(&mut self, x: usize, y: usize, z: usize) {
        let corners = CORNERS.map(|[dx, dy, dz]| self.grid.index(x + dx, y + dy, z + dz));
        for tet in TETRAHEDRA {
            self.polygonize_tetrahedron(tet.map(|c| corners[c]));
        }
    }

    fn polygonize_tetrahedron(&mut self, verts: [usize; 4]) {
        let (inside, outside): (Vec<usize>, Vec<usize>) = verts
            .iter()
            .partition(|v| self.samples[**v] > self.iso);

        match (inside.as_slice(), outside.as_slice()) {
            ([a], [b, c, d]) | ([b, c, d], [a]) => {
                let tri = [self.vertex(*a, *b), self.vertex(*a, *c), self.vertex(*a, *d)];
                self.emit(tri, &inside, &outside);
            }
            ([a, b], [c, d]) => {
                let ac = self.vertex(*a, *c);
                let ad = self.vertex(*a, *d);
                let bd = self.vertex(*b, *d);
                let bc = self.vertex(*b, *c);
                self.emit([ac, ad, bd], &inside, &outside);
                self.emit([ac, bd, bc], &inside, &outside);
            }
            _ => {}
        }
    }

    /// Appends the triangle wound so its normal points toward the outside
    /// corners.
    fn emit(&mut self, tri: [u32; 3], inside: &[usize], outside: &[usize]) {
        let p = tri.map(|i| Vec3::from(self.mesh.positions[i as usize]));
        let normal = (p[1] - p[0]).cross(p[2] - p[0]);
        let outward = self.centroid(outside) - self.centroid(inside);
        if normal.dot(outward) < 0.0 {
            self.mesh.indices.extend_from_slice(&[tri[0], tri[2], tri[1]]);
        } else {
            self.mesh.indices.extend_from_slice(&tri);
        }
    }

    fn centroid(&self, corners: &[usize]) -> Vec3 {
        let sum: Vec3 = corners.iter().map(|c| self.position(*c)).sum();
        sum / corners.len() as f32
    }

    fn position(&self, index: usize) -> Vec3 {
        let row = self.grid.dims[0] + 1;
        let layer = row * (self.grid.dims[1] + 1);
        self.grid
            .point(index % row, (index % layer) / row, index / layer)
    }

    /// Surface crossing on the edge between two grid points, shared by every
    /// tetrahedron touching that edge.
    fn vertex(&mut self, a: usize, b: usize) -> u32 {
        let key = (a.min(b), a.max(b));
        if let Some(index) = self.edge_vertices.get(&key) {
            return *index;
        }
        let (va, vb) = (self.samples[a], self.samples[b]);
        let t = ((self.iso - va) / (vb - va)).clamp(0.0, 1.0);
        let point = self.position(a).lerp(self.position(b), t);
        let index = self.mesh.positions.len() as u32;
        self.mesh.positions.push(point.to_array());
        self.edge_vertices.insert(key, index);
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::density::build_density_kernel;
    use crate::piece::{CsgMode, Piece, Primitive};
    use crate::project::KernelSettings;
    use crate::scene::{SceneObject, Transform};

    fn settings(resolution: u32) -> ContourSettings {
        ContourSettings {
            resolution,
            ..ContourSettings::default()
        }
    }

    fn sphere_scene(radius: f32, at: [f32; 3]) -> SceneObject {
        SceneObject::group("root").with_child(
            SceneObject::with_piece(
                "sphere",
                Piece::leaf(CsgMode::Additive, Primitive::Sphere { radius }),
            )
            .with_transform(Transform::from_translation(at)),
        )
    }

    #[test]
    fn sphere_contours_to_closed_surface() {
        let kernel =
            build_density_kernel(&sphere_scene(1.0, [0.0, 0.0, 0.0]), &KernelSettings::default())
                .unwrap();
        let mesh = contour_density(&kernel, &settings(16)).unwrap();
        assert!(mesh.triangle_count() > 100);

        let cell = 4.2 / 16.0;
        for p in &mesh.positions {
            assert!((Vec3::from(*p).length() - 1.0).abs() < cell);
        }

        let mut edges: HashMap<(u32, u32), u32> = HashMap::new();
        for tri in mesh.indices.chunks_exact(3) {
            for (a, b) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
                *edges.entry((a.min(b), a.max(b))).or_default() += 1;
            }
        }
        assert!(edges.values().all(|count| *count == 2));
    }

    #[test]
    fn normals_point_away_from_center() {
        let kernel =
            build_density_kernel(&sphere_scene(1.0, [0.0, 0.0, 0.0]), &KernelSettings::default())
                .unwrap();
        let mesh = contour_density(&kernel, &settings(12)).unwrap();
        let normals = mesh.normals.as_ref().expect("normals");
        let outward = mesh
            .positions
            .iter()
            .zip(normals)
            .filter(|(p, n)| Vec3::from(**p).dot(Vec3::from(**n)) > 0.0)
            .count();
        assert!(outward * 100 >= mesh.positions.len() * 95);
    }

    #[test]
    fn offset_sphere_bounds_follow_transform() {
        let kernel =
            build_density_kernel(&sphere_scene(0.5, [1.0, 0.0, 0.0]), &KernelSettings::default())
                .unwrap();
        let mesh = contour_density(&kernel, &settings(24)).unwrap();
        let bounds = mesh.bounds().expect("bounds");
        let cell = 4.2 / 24.0;
        assert!((bounds.min[0] - 0.5).abs() < cell);
        assert!((bounds.max[0] - 1.5).abs() < cell);
    }

    #[test]
    fn empty_scene_gives_empty_mesh() {
        let kernel =
            build_density_kernel(&SceneObject::group("root"), &KernelSettings::default()).unwrap();
        let mesh = contour_density(&kernel, &settings(4)).unwrap();
        assert!(mesh.is_empty());
        assert!(mesh.normals.is_none());
    }

    #[test]
    fn custom_kernels_and_bad_bounds_are_rejected() {
        let scene = SceneObject::group("root").with_child(SceneObject::with_piece(
            "custom",
            Piece::custom(CsgMode::Additive, "sphere(p,1.0)"),
        ));
        let kernel = build_density_kernel(&scene, &KernelSettings::default()).unwrap();
        assert_eq!(
            contour_density(&kernel, &settings(4)).unwrap_err(),
            ContourError::NotCpuEvaluable
        );

        let kernel =
            build_density_kernel(&sphere_scene(1.0, [0.0, 0.0, 0.0]), &KernelSettings::default())
                .unwrap();
        let flat = ContourSettings {
            bounds_min: [0.0, 0.0, 0.0],
            bounds_max: [1.0, 1.0, 1.0],
            padding: -0.6,
            ..ContourSettings::default()
        };
        assert!(matches!(
            contour_density(&kernel, &flat),
            Err(ContourError::InvalidBounds(_))
        ));
    }
}
