// Geometry primitives: axis-aligned boxes and rays

use crate::error::GeometryError;
use crate::math::{component, Axis, Matrix4, Vector3};

/// Axis-aligned bounding box, `minimum <= maximum` on every axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    minimum: Vector3,
    maximum: Vector3,
}

impl Aabb {
    pub fn new(minimum: Vector3, maximum: Vector3) -> Result<Self, GeometryError> {
        for axis in Axis::ALL {
            // NaN on either side fails this too
            if !(component(minimum, axis) <= component(maximum, axis)) {
                return Err(GeometryError::InvertedBounds { axis });
            }
        }
        Ok(Self { minimum, maximum })
    }

    /// Smallest box holding every point, `None` for an empty iterator.
    pub fn from_points<I: IntoIterator<Item = Vector3>>(points: I) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        let (minimum, maximum) = points.fold((first, first), |(lo, hi), p| (lo.min(p), hi.max(p)));
        Some(Self { minimum, maximum })
    }

    pub fn minimum(&self) -> Vector3 {
        self.minimum
    }

    pub fn maximum(&self) -> Vector3 {
        self.maximum
    }

    pub fn center(&self) -> Vector3 {
        (self.minimum + self.maximum) * 0.5
    }

    pub fn contains(&self, point: Vector3) -> bool {
        point.cmpge(self.minimum).all() && point.cmple(self.maximum).all()
    }

    pub fn corners(&self) -> [Vector3; 8] {
        let (lo, hi) = (self.minimum, self.maximum);
        [
            Vector3::new(lo.x, lo.y, lo.z),
            Vector3::new(hi.x, lo.y, lo.z),
            Vector3::new(lo.x, hi.y, lo.z),
            Vector3::new(hi.x, hi.y, lo.z),
            Vector3::new(lo.x, lo.y, hi.z),
            Vector3::new(hi.x, lo.y, hi.z),
            Vector3::new(lo.x, hi.y, hi.z),
            Vector3::new(hi.x, hi.y, hi.z),
        ]
    }

    /// Box enclosing this one after `transform`.
    pub fn transformed(&self, transform: &Matrix4) -> Self {
        let corners = self.corners().map(|c| transform.transform_point3(c));
        let mut minimum = corners[0];
        let mut maximum = corners[0];
        for c in &corners[1..] {
            minimum = minimum.min(*c);
            maximum = maximum.max(*c);
        }
        Self { minimum, maximum }
    }
}

/// Where a ray meets a box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RayHit {
    pub point: Vector3,
    /// Parametric distance along the ray direction.
    pub distance: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vector3,
    pub direction: Vector3,
}

impl Ray {
    pub fn new(origin: Vector3, direction: Vector3) -> Self {
        Self { origin, direction }
    }

    pub fn at(&self, t: f32) -> Vector3 {
        self.origin + self.direction * t
    }

    /// Slab test against `aabb`.
    ///
    /// Boundaries count as inside. If the origin lies in the box the hit is
    /// where the ray leaves it; a box entirely behind the origin is a miss.
    pub fn intersect(&self, aabb: &Aabb) -> Option<RayHit> {
        let mut tmin = f32::NEG_INFINITY;
        let mut tmax = f32::INFINITY;

        for axis in Axis::ALL {
            let origin = component(self.origin, axis);
            let direction = component(self.direction, axis);
            let lo = component(aabb.minimum, axis);
            let hi = component(aabb.maximum, axis);

            if direction != 0.0 {
                let inv = 1.0 / direction;
                let mut t0 = (lo - origin) * inv;
                let mut t1 = (hi - origin) * inv;
                if t0 > t1 {
                    std::mem::swap(&mut t0, &mut t1);
                }
                tmin = tmin.max(t0);
                tmax = tmax.min(t1);
                if tmax < tmin {
                    return None;
                }
            } else if origin < lo || origin > hi {
                // parallel to this slab and outside it
                return None;
            }
        }

        if tmax < 0.0 {
            return None;
        }

        let distance = if tmin >= 0.0 {
            tmin
        } else if tmax.is_finite() {
            tmax
        } else {
            // zero direction with the origin inside the box
            0.0
        };
        Some(RayHit {
            point: self.at(distance),
            distance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn unit_box() -> Aabb {
        Aabb::new(Vector3::ZERO, Vector3::ONE).unwrap()
    }

    fn slab_box() -> Aabb {
        Aabb::new(Vector3::new(1.0, 0.0, 0.0), Vector3::new(2.0, 2.0, 1.0)).unwrap()
    }

    #[test]
    fn accepts_ordered_bounds() {
        let aabb = unit_box();
        assert_eq!(aabb.minimum(), Vector3::ZERO);
        assert_eq!(aabb.maximum(), Vector3::ONE);
    }

    #[test]
    fn rejects_inverted_bounds() {
        let err = Aabb::new(Vector3::new(1.0, 0.0, 0.0), Vector3::new(0.0, 1.0, 1.0)).unwrap_err();
        assert_eq!(err, GeometryError::InvertedBounds { axis: Axis::X });

        let err = Aabb::new(Vector3::ZERO, Vector3::new(1.0, 1.0, -1.0)).unwrap_err();
        assert_eq!(err, GeometryError::InvertedBounds { axis: Axis::Z });
    }

    #[test]
    fn rejects_nan_bounds() {
        let err = Aabb::new(Vector3::new(f32::NAN, 0.0, 0.0), Vector3::ONE).unwrap_err();
        assert_eq!(err, GeometryError::InvertedBounds { axis: Axis::X });

        let err = Aabb::new(Vector3::ZERO, Vector3::new(1.0, f32::NAN, 1.0)).unwrap_err();
        assert_eq!(err, GeometryError::InvertedBounds { axis: Axis::Y });
    }

    #[test]
    fn degenerate_box_is_allowed() {
        assert!(Aabb::new(Vector3::ONE, Vector3::ONE).is_ok());
    }

    #[test]
    fn parallel_ray_outside_slab_misses() {
        let ray = Ray::new(Vector3::ZERO, Vector3::new(0.0, 0.0, 1.0));
        assert_eq!(ray.intersect(&slab_box()), None);
    }

    #[test]
    fn ray_hits_near_face() {
        let ray = Ray::new(Vector3::ZERO, Vector3::new(1.0, 0.0, 0.0));
        let hit = ray.intersect(&slab_box()).unwrap();
        assert_eq!(hit.distance, 1.0);
        assert_eq!(hit.point, Vector3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn box_behind_ray_misses() {
        let origin = Vector3::new(5.0, 5.0, 5.0);
        let ray = Ray::new(origin, origin);
        assert_eq!(ray.intersect(&unit_box()), None);

        // the same line pointed the other way hits
        let ray = Ray::new(origin, -origin);
        let hit = ray.intersect(&unit_box()).unwrap();
        assert_abs_diff_eq!(hit.point, Vector3::ONE, epsilon = 1e-5);
    }

    #[test]
    fn origin_inside_reports_exit_point() {
        let ray = Ray::new(Vector3::splat(0.5), Vector3::new(0.0, 1.0, 0.0));
        let hit = ray.intersect(&unit_box()).unwrap();
        assert_abs_diff_eq!(hit.distance, 0.5);
        assert_abs_diff_eq!(hit.point, Vector3::new(0.5, 1.0, 0.5));
    }

    #[test]
    fn grazing_edge_counts_as_hit() {
        // travels along the y = 0 face of the unit box
        let ray = Ray::new(Vector3::new(-1.0, 0.0, 0.5), Vector3::new(1.0, 0.0, 0.0));
        let hit = ray.intersect(&unit_box()).unwrap();
        assert_eq!(hit.point, Vector3::new(0.0, 0.0, 0.5));
    }

    #[test]
    fn zero_direction_hits_only_from_inside() {
        let inside = Ray::new(Vector3::splat(0.5), Vector3::ZERO);
        assert_eq!(inside.intersect(&unit_box()).unwrap().point, Vector3::splat(0.5));

        let outside = Ray::new(Vector3::splat(2.0), Vector3::ZERO);
        assert_eq!(outside.intersect(&unit_box()), None);
    }

    #[test]
    fn diagonal_miss() {
        let ray = Ray::new(Vector3::new(-1.0, 3.0, 0.5), Vector3::new(1.0, 0.1, 0.0));
        assert_eq!(ray.intersect(&unit_box()), None);
    }

    #[test]
    fn transformed_box_encloses_rotated_corners() {
        let transform = crate::math::translation(Vector3::new(10.0, 0.0, 0.0))
            * crate::math::rotation(std::f32::consts::FRAC_PI_4, 0.0, 0.0);
        let world = unit_box().transformed(&transform);
        for corner in unit_box().corners() {
            let p = transform.transform_point3(corner);
            assert!(world.contains(p - (p - world.center()) * 1e-4));
        }
        assert!(world.minimum().x < 10.0 && world.maximum().x > 10.0);
    }

    #[test]
    fn from_points_spans_input() {
        let aabb = Aabb::from_points([
            Vector3::new(1.0, -2.0, 0.0),
            Vector3::new(-1.0, 4.0, 3.0),
            Vector3::new(0.0, 0.0, -5.0),
        ])
        .unwrap();
        assert_eq!(aabb.minimum(), Vector3::new(-1.0, -2.0, -5.0));
        assert_eq!(aabb.maximum(), Vector3::new(1.0, 4.0, 3.0));
        assert!(Aabb::from_points(std::iter::empty()).is_none());
    }
}
