use glam::{Mat4, Vec3, Vec4};
use serde::{Deserialize, Serialize};

use crate::bounds::{Bounded, BoundingVolume};
use crate::helpers::LineSet;
use crate::mesh::MeshData;

/// Handle of an object inserted into a [`Scene`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(u64);

impl ObjectId {
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Triangle mesh with a single colour, usually one representation item of a
/// building element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshPart {
    /// Human readable origin, e.g. `IFCWALL 'Basic Wall'`.
    pub label: String,
    /// RGBA in linear `[0, 1]`.
    pub color: Vec4,
    pub mesh: MeshData,
}

/// A decoded model ready to be inserted into the scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderableObject {
    pub name: String,
    pub parts: Vec<MeshPart>,
    /// Model-to-world transform applied to every part.
    pub transform: Mat4,
}

impl RenderableObject {
    pub fn new(name: impl Into<String>, parts: Vec<MeshPart>) -> Self {
        Self {
            name: name.into(),
            parts,
            transform: Mat4::IDENTITY,
        }
    }

    pub fn triangle_count(&self) -> usize {
        self.parts.iter().map(|part| part.mesh.triangle_count()).sum()
    }
}

impl Bounded for RenderableObject {
    fn bounding_volume(&self) -> BoundingVolume {
        self.parts
            .iter()
            .filter(|part| !part.mesh.is_empty())
            .map(|part| part.mesh.bounding_volume().transformed(&self.transform))
            .reduce(|acc, bounds| acc.union(&bounds))
            .unwrap_or(BoundingVolume::EMPTY)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AmbientLight {
    pub color: Vec3,
    pub intensity: f32,
}

/// Light arriving from `position` towards `target`, like sunlight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirectionalLight {
    pub color: Vec3,
    pub intensity: f32,
    pub position: Vec3,
    pub target: Vec3,
}

impl DirectionalLight {
    /// Unit vector pointing from the lit surface towards the light.
    pub fn direction_to_light(&self) -> Vec3 {
        (self.position - self.target).try_normalize().unwrap_or(Vec3::Y)
    }
}

/// Scene graph: loaded models plus lights and navigation helpers.
#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    objects: Vec<(ObjectId, RenderableObject)>,
    next_id: u64,
    pub ambient: AmbientLight,
    pub directional: DirectionalLight,
    pub grid: Option<LineSet>,
    pub axes: Option<LineSet>,
}

impl Default for Scene {
    fn default() -> Self {
        Self {
            objects: Vec::new(),
            next_id: 1,
            ambient: AmbientLight {
                color: Vec3::ONE,
                intensity: 0.5,
            },
            directional: DirectionalLight {
                color: Vec3::ONE,
                intensity: 1.0,
                position: Vec3::new(0.0, 10.0, 0.0),
                target: Vec3::new(-5.0, 0.0, 0.0),
            },
            grid: None,
            axes: None,
        }
    }
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, object: RenderableObject) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        self.objects.push((id, object));
        id
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<RenderableObject> {
        let index = self.objects.iter().position(|(object_id, _)| *object_id == id)?;
        Some(self.objects.remove(index).1)
    }

    pub fn get(&self, id: ObjectId) -> Option<&RenderableObject> {
        self.objects
            .iter()
            .find(|(object_id, _)| *object_id == id)
            .map(|(_, object)| object)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.get(id).is_some()
    }

    /// Objects in insertion order.
    pub fn objects(&self) -> impl Iterator<Item = (ObjectId, &RenderableObject)> {
        self.objects.iter().map(|(id, object)| (*id, object))
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl Bounded for Scene {
    /// Bounds of every loaded object; helpers and lights are excluded.
    fn bounding_volume(&self) -> BoundingVolume {
        self.objects
            .iter()
            .map(|(_, object)| object.bounding_volume())
            .filter(|bounds| *bounds != BoundingVolume::EMPTY)
            .reduce(|acc, bounds| acc.union(&bounds))
            .unwrap_or(BoundingVolume::EMPTY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube_object(name: &str, offset: Vec3) -> RenderableObject {
        let mut mesh = MeshData::new();
        mesh.push_polygon(&[Vec3::ZERO, Vec3::X, Vec3::new(1.0, 1.0, 0.0), Vec3::Y]);
        mesh.push_polygon(&[Vec3::Z, Vec3::new(1.0, 0.0, 1.0), Vec3::ONE, Vec3::new(0.0, 1.0, 1.0)]);
        let mut object = RenderableObject::new(
            name,
            vec![MeshPart {
                label: "test".into(),
                color: Vec4::ONE,
                mesh,
            }],
        );
        object.transform = Mat4::from_translation(offset);
        object
    }

    #[test]
    fn insert_and_remove_objects() {
        let mut scene = Scene::new();
        let a = scene.insert(cube_object("a", Vec3::ZERO));
        let b = scene.insert(cube_object("b", Vec3::X));
        assert_ne!(a, b);
        assert_eq!(scene.len(), 2);
        assert_eq!(scene.remove(a).map(|o| o.name), Some("a".to_string()));
        assert!(!scene.contains(a));
        assert!(scene.contains(b));
        assert!(scene.remove(a).is_none());
    }

    #[test]
    fn object_bounds_include_transform() {
        let object = cube_object("a", Vec3::new(10.0, 0.0, 0.0));
        let bounds = object.bounding_volume();
        assert_eq!(bounds.min(), Vec3::new(10.0, 0.0, 0.0));
        assert_eq!(bounds.max(), Vec3::new(11.0, 1.0, 1.0));
    }

    #[test]
    fn empty_object_has_empty_bounds() {
        let object = RenderableObject::new("empty", Vec::new());
        assert_eq!(object.bounding_volume(), BoundingVolume::EMPTY);
    }

    #[test]
    fn scene_bounds_cover_all_objects() {
        let mut scene = Scene::new();
        scene.insert(cube_object("a", Vec3::ZERO));
        scene.insert(cube_object("b", Vec3::new(4.0, 0.0, 0.0)));
        scene.insert(RenderableObject::new("empty", Vec::new()));
        let bounds = scene.bounding_volume();
        assert_eq!(bounds.min(), Vec3::ZERO);
        assert_eq!(bounds.max(), Vec3::new(5.0, 1.0, 1.0));
    }

    #[test]
    fn directional_light_points_from_target_to_position() {
        let scene = Scene::new();
        let dir = scene.directional.direction_to_light();
        assert!((dir - Vec3::new(5.0, 10.0, 0.0).normalize()).length() < 1e-6);
    }
}
