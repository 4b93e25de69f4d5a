use glam::Vec3;

use crate::math::EPS;
use crate::ray::Ray;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: Vec3,
    pub max: Vec3,
}

impl Aabb {
    /// An empty box that absorbs nothing and merges as the identity.
    pub fn invalid() -> Self {
        Self {
            min: Vec3::splat(f32::MAX),
            max: Vec3::splat(-f32::MAX),
        }
    }

    pub fn merge(a: Self, b: Self) -> Self {
        Self {
            min: a.min.min(b.min),
            max: a.max.max(b.max),
        }
    }

    pub fn contains(&self, other: &Self) -> bool {
        self.min.cmple(other.min).all() && other.max.cmple(self.max).all()
    }

    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Half the surface area of the box. Relative cost metric for tree
    /// construction, where the common factor of 2 is irrelevant.
    pub fn half_area(&self) -> f32 {
        let span = self.max - self.min;
        span.x * span.y + span.y * span.z + span.z * span.x
    }

    /// Slab test clipping the parameter interval `[0, max_lambda]` against
    /// the three slab pairs. Direction components within `EPS` of zero are
    /// treated as parallel to the slab and never clip, which sidesteps the
    /// sign ambiguity of axis-aligned rays.
    pub fn intersects_ray(&self, ray: &Ray, max_lambda: f32) -> bool {
        let o = ray.origin;
        let d = ray.direction;
        let d_inv = Vec3::ONE / d;

        let mut t_min = 0.0f32;
        let mut t_max = max_lambda;

        for axis in 0..3 {
            if d[axis] > EPS {
                t_min = t_min.max((self.min[axis] - o[axis]) * d_inv[axis]);
                t_max = t_max.min((self.max[axis] - o[axis]) * d_inv[axis]);
            } else if d[axis] < -EPS {
                t_min = t_min.max((self.max[axis] - o[axis]) * d_inv[axis]);
                t_max = t_max.min((self.min[axis] - o[axis]) * d_inv[axis]);
            }
            if t_min > t_max {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_box() -> Aabb {
        Aabb {
            min: Vec3::splat(-1.0),
            max: Vec3::splat(1.0),
        }
    }

    #[test]
    fn axis_aligned_rays_through_face_centers_hit() {
        let aabb = unit_box();
        for axis in 0..3 {
            for sign in [-1.0f32, 1.0] {
                let mut origin = Vec3::ZERO;
                origin[axis] = 3.0 * sign;
                let mut direction = Vec3::ZERO;
                direction[axis] = -sign;
                let ray = Ray { origin, direction };
                assert!(aabb.intersects_ray(&ray, f32::MAX));
            }
        }
    }

    #[test]
    fn parallel_ray_outside_slab_misses() {
        let aabb = unit_box();
        let ray = Ray {
            origin: Vec3::new(0.0, 2.0, 0.0),
            direction: Vec3::X,
        };
        assert!(!aabb.intersects_ray(&ray, f32::MAX));
    }

    #[test]
    fn clipped_by_max_lambda() {
        let aabb = unit_box();
        let ray = Ray {
            origin: Vec3::new(-5.0, 0.0, 0.0),
            direction: Vec3::X,
        };
        assert!(aabb.intersects_ray(&ray, 10.0));
        assert!(!aabb.intersects_ray(&ray, 1.0));
    }

    #[test]
    fn merge_and_contains() {
        let a = Aabb {
            min: Vec3::ZERO,
            max: Vec3::ONE,
        };
        let b = Aabb {
            min: Vec3::splat(0.5),
            max: Vec3::splat(2.0),
        };
        let merged = Aabb::merge(a, b);
        assert!(merged.contains(&a));
        assert!(merged.contains(&b));
        assert!(!a.contains(&b));
    }
}
