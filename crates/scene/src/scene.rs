use arena_common::Ray;
use arena_common::config::TrackingMode;
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::shape::Shape;

/// Bit set of collider layers a query considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LayerMask(pub u32);

impl LayerMask {
    pub const ALL: Self = Self(u32::MAX);
    pub const NONE: Self = Self(0);

    /// Mask with only `layer` set. Layers are `0..32`.
    pub fn layer(layer: u8) -> Self {
        Self(1u32.checked_shl(layer as u32).unwrap_or(0))
    }

    pub fn contains(&self, layer: u8) -> bool {
        self.0 & Self::layer(layer).0 != 0
    }
}

impl Default for LayerMask {
    fn default() -> Self {
        Self::ALL
    }
}

/// Index of an object in a [`Scene`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub usize);

/// A collider placed in the scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    pub name: String,
    pub shape: Shape,
    pub layer: u8,
    pub tag: Option<String>,
}

impl SceneObject {
    pub fn new(name: impl Into<String>, shape: Shape) -> Self {
        Self {
            name: name.into(),
            shape,
            layer: 0,
            tag: None,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn on_layer(mut self, layer: u8) -> Self {
        self.layer = layer;
        self
    }
}

/// Result of a successful ray cast.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub point: Vec3,
    pub normal: Vec3,
    pub distance: f32,
    pub object: ObjectId,
}

/// Scene-intersection collaborator. Samplers only ever read through this.
pub trait RayCaster {
    /// Nearest hit along `ray` within `max_distance` on a layer in `mask`.
    fn raycast(&self, ray: &Ray, max_distance: f32, mask: LayerMask) -> Option<RayHit>;
}

/// Flat list of colliders with brute-force queries.
///
/// Arena scenes hold a handful of objects, so there is no acceleration
/// structure. Object ids are stable: removal leaves a hole.
#[derive(Debug, Clone, Default)]
pub struct Scene {
    objects: Vec<Option<SceneObject>>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, object: SceneObject) -> ObjectId {
        self.objects.push(Some(object));
        ObjectId(self.objects.len() - 1)
    }

    pub fn remove(&mut self, id: ObjectId) -> Option<SceneObject> {
        self.objects.get_mut(id.0).and_then(Option::take)
    }

    pub fn get(&self, id: ObjectId) -> Option<&SceneObject> {
        self.objects.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut SceneObject> {
        self.objects.get_mut(id.0).and_then(Option::as_mut)
    }

    /// First object with the given name.
    pub fn find(&self, name: &str) -> Option<ObjectId> {
        self.iter().find(|(_, o)| o.name == name).map(|(id, _)| id)
    }

    pub fn len(&self) -> usize {
        self.objects.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &SceneObject)> {
        self.objects
            .iter()
            .enumerate()
            .filter_map(|(i, o)| o.as_ref().map(|o| (ObjectId(i), o)))
    }

    /// Positions the fusion pass should track this frame.
    ///
    /// `AllObjects` takes the bounds centre of every bounded collider inside
    /// `[min, max]` (inclusive), except `exclude` (typically the display
    /// surface). `Tagged` takes every object carrying the tag, wherever it is.
    pub fn tracked_positions(
        &self,
        mode: &TrackingMode,
        bounds: (Vec3, Vec3),
        exclude: Option<ObjectId>,
    ) -> Vec<Vec3> {
        let (min, max) = bounds;
        match mode {
            TrackingMode::AllObjects => self
                .iter()
                .filter(|(id, _)| Some(*id) != exclude)
                .filter_map(|(_, o)| o.shape.center())
                .filter(|p| p.cmpge(min).all() && p.cmple(max).all())
                .collect(),
            TrackingMode::Tagged { tag } => self
                .iter()
                .filter(|(_, o)| o.tag.as_deref() == Some(tag.as_str()))
                .filter_map(|(_, o)| o.shape.center())
                .collect(),
        }
    }
}

impl RayCaster for Scene {
    fn raycast(&self, ray: &Ray, max_distance: f32, mask: LayerMask) -> Option<RayHit> {
        let mut best: Option<RayHit> = None;
        for (id, object) in self.iter() {
            if !mask.contains(object.layer) {
                continue;
            }
            let Some((t, normal)) = object.shape.intersect(ray) else {
                continue;
            };
            if t > max_distance || best.is_some_and(|b| b.distance <= t) {
                continue;
            }
            best = Some(RayHit {
                point: ray.at(t),
                normal,
                distance: t,
                object: id,
            });
        }
        best
    }
}

/// A small furnished arena: floor, a tagged player, a ball and a pillar.
///
/// The player stands at the centre, which is where ring cameras aim.
pub fn demo_arena(width: f32, depth: f32) -> Scene {
    let mut scene = Scene::new();
    scene.add(SceneObject::new("Floor", Shape::ground(0.0)));
    scene.add(
        SceneObject::new(
            "Player",
            Shape::Cuboid {
                center: Vec3::new(0.0, 0.9, 0.0),
                half_extents: Vec3::new(0.25, 0.9, 0.15),
            },
        )
        .with_tag("Player"),
    );
    scene.add(SceneObject::new(
        "Ball",
        Shape::Sphere {
            center: Vec3::new(width * 0.25, 0.3, -depth * 0.2),
            radius: 0.3,
        },
    ));
    scene.add(SceneObject::new(
        "Pillar",
        Shape::Cuboid {
            center: Vec3::new(-width * 0.3, 1.0, depth * 0.25),
            half_extents: Vec3::new(0.2, 1.0, 0.2),
        },
    ));
    tracing::debug!(objects = scene.len(), "demo arena built");
    scene
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_boxes() -> Scene {
        let mut s = Scene::new();
        s.add(SceneObject::new(
            "near",
            Shape::Cuboid {
                center: Vec3::new(0.0, 0.0, -3.0),
                half_extents: Vec3::splat(0.5),
            },
        ));
        s.add(
            SceneObject::new(
                "far",
                Shape::Cuboid {
                    center: Vec3::new(0.0, 0.0, -6.0),
                    half_extents: Vec3::splat(0.5),
                },
            )
            .on_layer(3),
        );
        s
    }

    #[test]
    fn nearest_hit_wins() {
        let s = two_boxes();
        let hit = s
            .raycast(&Ray::new(Vec3::ZERO, Vec3::NEG_Z), 100.0, LayerMask::ALL)
            .unwrap();
        assert_eq!(hit.object, ObjectId(0));
        assert!((hit.distance - 2.5).abs() < 1e-5);
        assert!((hit.point - Vec3::new(0.0, 0.0, -2.5)).length() < 1e-5);
    }

    #[test]
    fn mask_filters_layers() {
        let s = two_boxes();
        let hit = s
            .raycast(&Ray::new(Vec3::ZERO, Vec3::NEG_Z), 100.0, LayerMask::layer(3))
            .unwrap();
        assert_eq!(hit.object, ObjectId(1));
        assert!(s
            .raycast(&Ray::new(Vec3::ZERO, Vec3::NEG_Z), 100.0, LayerMask::NONE)
            .is_none());
    }

    #[test]
    fn max_distance_limits_hits() {
        let s = two_boxes();
        assert!(s
            .raycast(&Ray::new(Vec3::ZERO, Vec3::NEG_Z), 2.0, LayerMask::ALL)
            .is_none());
        assert!(s
            .raycast(&Ray::new(Vec3::ZERO, Vec3::NEG_Z), 2.5, LayerMask::ALL)
            .is_some());
    }

    #[test]
    fn layer_mask_bits() {
        assert!(LayerMask::ALL.contains(31));
        assert!(!LayerMask::NONE.contains(0));
        assert!(LayerMask::layer(5).contains(5));
        assert!(!LayerMask::layer(5).contains(4));
        assert_eq!(LayerMask::layer(40), LayerMask::NONE);
    }

    #[test]
    fn removal_keeps_ids_stable() {
        let mut s = two_boxes();
        assert!(s.remove(ObjectId(0)).is_some());
        assert_eq!(s.len(), 1);
        assert!(s.get(ObjectId(0)).is_none());
        assert_eq!(s.get(ObjectId(1)).unwrap().name, "far");
        assert_eq!(s.find("far"), Some(ObjectId(1)));
    }

    #[test]
    fn tracked_positions_all_objects_in_bounds() {
        let s = demo_arena(5.0, 3.0);
        let bounds = (Vec3::new(-2.5, 0.0, -1.5), Vec3::new(2.5, 3.0, 1.5));
        let all = s.tracked_positions(&TrackingMode::AllObjects, bounds, None);
        // Floor is unbounded and skipped; player, ball and pillar remain.
        assert_eq!(all.len(), 3);

        let player = s.find("Player");
        let without = s.tracked_positions(&TrackingMode::AllObjects, bounds, player);
        assert_eq!(without.len(), 2);

        let tiny = (Vec3::splat(10.0), Vec3::splat(11.0));
        assert!(s
            .tracked_positions(&TrackingMode::AllObjects, tiny, None)
            .is_empty());
    }

    #[test]
    fn tracked_positions_by_tag_ignores_bounds() {
        let s = demo_arena(5.0, 3.0);
        let tiny = (Vec3::splat(10.0), Vec3::splat(11.0));
        let tagged = s.tracked_positions(
            &TrackingMode::Tagged {
                tag: "Player".into(),
            },
            tiny,
            None,
        );
        assert_eq!(tagged, vec![Vec3::new(0.0, 0.9, 0.0)]);
    }
}
