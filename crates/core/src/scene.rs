use glam::{Affine3A, EulerRot, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::piece::Piece;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Transform {
    pub translate: [f32; 3],
    pub rotate_deg: [f32; 3],
    pub scale: [f32; 3],
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            translate: [0.0, 0.0, 0.0],
            rotate_deg: [0.0, 0.0, 0.0],
            scale: [1.0, 1.0, 1.0],
        }
    }
}

impl Transform {
    pub fn from_translation(translate: [f32; 3]) -> Self {
        Self {
            translate,
            ..Self::default()
        }
    }

    pub fn to_affine(&self) -> Affine3A {
        let rot = Vec3::from(self.rotate_deg) * std::f32::consts::PI / 180.0;
        let quat = Quat::from_euler(EulerRot::XYZ, rot.x, rot.y, rot.z);
        Affine3A::from_scale_rotation_translation(
            Vec3::from(self.scale),
            quat,
            Vec3::from(self.translate),
        )
    }
}

/// Node of the scene hierarchy the density composer walks. Objects without a
/// piece are plain groups.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub transform: Transform,
    #[serde(default)]
    pub piece: Option<Piece>,
    #[serde(default)]
    pub children: Vec<SceneObject>,
}

fn default_enabled() -> bool {
    true
}

impl SceneObject {
    pub fn group(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            transform: Transform::default(),
            piece: None,
            children: Vec::new(),
        }
    }

    pub fn with_piece(name: impl Into<String>, piece: Piece) -> Self {
        Self {
            piece: Some(piece),
            ..Self::group(name)
        }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_child(mut self, child: SceneObject) -> Self {
        self.children.push(child);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Depth-first, parent before children, children in order.
    pub fn walk(&self, visitor: &mut dyn HierarchyVisitor) {
        self.walk_from(&Affine3A::IDENTITY, visitor);
    }

    fn walk_from(&self, parent: &Affine3A, visitor: &mut dyn HierarchyVisitor) {
        if visitor.should_not_visit_children(self) {
            tracing::debug!("pruned subtree at {}", self.name);
            return;
        }
        let world = *parent * self.transform.to_affine();
        visitor.visit(self, &world);
        for child in &self.children {
            child.walk_from(&world, visitor);
        }
    }

    pub fn count(&self) -> usize {
        1 + self.children.iter().map(SceneObject::count).sum::<usize>()
    }
}

pub trait HierarchyVisitor {
    /// Checked on entering a branch; returning true skips the object and its
    /// whole subtree.
    fn should_not_visit_children(&self, object: &SceneObject) -> bool {
        !object.enabled
    }

    fn visit(&mut self, object: &SceneObject, world: &Affine3A);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Names {
        seen: Vec<(String, [f32; 3])>,
    }

    impl HierarchyVisitor for Names {
        fn visit(&mut self, object: &SceneObject, world: &Affine3A) {
            self.seen
                .push((object.name.clone(), world.translation.to_array()));
        }
    }

    #[test]
    fn walk_is_parent_first_and_accumulates_transforms() {
        let scene = SceneObject::group("root")
            .with_transform(Transform::from_translation([1.0, 0.0, 0.0]))
            .with_child(
                SceneObject::group("a")
                    .with_transform(Transform::from_translation([0.0, 2.0, 0.0]))
                    .with_child(SceneObject::group("a1")),
            )
            .with_child(SceneObject::group("b"));

        let mut names = Names::default();
        scene.walk(&mut names);
        let order: Vec<&str> = names.seen.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(order, vec!["root", "a", "a1", "b"]);
        assert_eq!(names.seen[2].1, [1.0, 2.0, 0.0]);
        assert_eq!(names.seen[3].1, [1.0, 0.0, 0.0]);
    }

    #[test]
    fn disabled_branch_is_skipped_entirely() {
        let scene = SceneObject::group("root")
            .with_child(
                SceneObject::group("off")
                    .disabled()
                    .with_child(SceneObject::group("inner")),
            )
            .with_child(SceneObject::group("on"));

        let mut names = Names::default();
        scene.walk(&mut names);
        let order: Vec<&str> = names.seen.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(order, vec!["root", "on"]);
        assert_eq!(scene.count(), 4);
    }

    #[test]
    fn rotation_and_scale_compose() {
        let transform = Transform {
            translate: [0.0, 0.0, 0.0],
            rotate_deg: [0.0, 0.0, 90.0],
            scale: [2.0, 2.0, 2.0],
        };
        let p = transform.to_affine().transform_point3(Vec3::X);
        assert!((p - Vec3::new(0.0, 2.0, 0.0)).length() < 1e-5);
    }
}
