use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Axis-aligned box enclosing a piece of geometry.
///
/// `center` and `size` are derived once at construction; the type has no mutators.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingVolume {
    min: Vec3,
    max: Vec3,
    center: Vec3,
    size: Vec3,
}

impl BoundingVolume {
    /// Volume of an object without geometry: a single point at the origin.
    pub const EMPTY: Self = Self {
        min: Vec3::ZERO,
        max: Vec3::ZERO,
        center: Vec3::ZERO,
        size: Vec3::ZERO,
    };

    /// Builds a volume from two corners given in any order.
    pub fn from_corners(a: Vec3, b: Vec3) -> Self {
        let min = a.min(b);
        let max = a.max(b);
        Self {
            min,
            max,
            center: (min + max) * 0.5,
            size: max - min,
        }
    }

    /// Smallest volume enclosing every point, or `None` when the iterator is empty.
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = Vec3>,
    {
        let mut points = points.into_iter();
        let first = points.next()?;
        let (min, max) = points.fold((first, first), |(min, max), p| (min.min(p), max.max(p)));
        Some(Self::from_corners(min, max))
    }

    pub fn min(&self) -> Vec3 {
        self.min
    }

    pub fn max(&self) -> Vec3 {
        self.max
    }

    pub fn center(&self) -> Vec3 {
        self.center
    }

    pub fn size(&self) -> Vec3 {
        self.size
    }

    /// Largest extent along any axis.
    pub fn max_dimension(&self) -> f32 {
        self.size.max_element()
    }

    /// True when the volume has no extent along any axis (or is not finite).
    pub fn is_degenerate(&self) -> bool {
        let max_dim = self.max_dimension();
        !max_dim.is_finite() || max_dim <= 0.0
    }

    pub fn union(&self, other: &Self) -> Self {
        Self::from_corners(self.min.min(other.min), self.max.max(other.max))
    }

    /// Transforms the eight corners and re-encloses them.
    pub fn transformed(&self, matrix: &Mat4) -> Self {
        let corners = (0..8).map(|i| {
            let x = if i & 1 == 0 { self.min.x } else { self.max.x };
            let y = if i & 2 == 0 { self.min.y } else { self.max.y };
            let z = if i & 4 == 0 { self.min.z } else { self.max.z };
            matrix.transform_point3(Vec3::new(x, y, z))
        });
        Self::from_points(corners).unwrap_or(Self::EMPTY)
    }
}

impl Default for BoundingVolume {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Anything whose world-space bounding volume can be computed.
pub trait Bounded {
    fn bounding_volume(&self) -> BoundingVolume;
}

impl Bounded for BoundingVolume {
    fn bounding_volume(&self) -> BoundingVolume {
        *self
    }
}

impl<T: Bounded + ?Sized> Bounded for &T {
    fn bounding_volume(&self) -> BoundingVolume {
        (**self).bounding_volume()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners_are_normalized() {
        let volume = BoundingVolume::from_corners(Vec3::new(1.0, -2.0, 3.0), Vec3::new(-1.0, 2.0, 0.0));
        assert_eq!(volume.min(), Vec3::new(-1.0, -2.0, 0.0));
        assert_eq!(volume.max(), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(volume.size(), Vec3::new(2.0, 4.0, 3.0));
        assert_eq!(volume.center(), Vec3::new(0.0, 0.0, 1.5));
        assert_eq!(volume.max_dimension(), 4.0);
    }

    #[test]
    fn empty_point_set_has_no_volume() {
        assert!(BoundingVolume::from_points(std::iter::empty()).is_none());
        assert!(BoundingVolume::EMPTY.is_degenerate());
    }

    #[test]
    fn single_point_is_degenerate() {
        let volume = BoundingVolume::from_points([Vec3::splat(4.0)]).unwrap();
        assert!(volume.is_degenerate());
        assert_eq!(volume.center(), Vec3::splat(4.0));
    }

    #[test]
    fn transform_encloses_rotated_box() {
        let volume = BoundingVolume::from_corners(Vec3::ZERO, Vec3::new(2.0, 1.0, 1.0));
        let rotated = volume.transformed(&Mat4::from_rotation_z(std::f32::consts::FRAC_PI_2));
        assert!((rotated.size() - Vec3::new(1.0, 2.0, 1.0)).length() < 1e-5);
        assert!((rotated.min() - Vec3::new(-1.0, 0.0, 0.0)).length() < 1e-5);
    }

    #[test]
    fn union_grows_to_cover_both() {
        let a = BoundingVolume::from_corners(Vec3::ZERO, Vec3::ONE);
        let b = BoundingVolume::from_corners(Vec3::splat(-1.0), Vec3::splat(0.5));
        let merged = a.union(&b);
        assert_eq!(merged.min(), Vec3::splat(-1.0));
        assert_eq!(merged.max(), Vec3::ONE);
    }
}
