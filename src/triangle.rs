use glam::Vec3;

use crate::aabb::Aabb;
use crate::math::{is_safe_to_normalize, EPS};
use crate::ray::{RayCastInput, RayCastOutput};
use crate::rng::RngState;

/// Sampled location on a shape's surface, with the frame needed to shade it.
#[derive(Clone, Copy, Debug)]
pub struct SurfacePoint {
    pub point: Vec3,
    pub normal: Vec3,
    pub tangent: Vec3,
}

#[derive(Clone, Copy, Debug)]
pub struct Triangle {
    pub vertices: [Vec3; 3],
    /// Unit face normal, or zero when the triangle is degenerate.
    pub normal: Vec3,
    /// Unit vector along the first edge, or zero when degenerate.
    pub tangent: Vec3,
    pub two_sided: bool,
}

/// Samples landing within a degree of the silhouette as seen from the vantage
/// are rejected; the geometry factors blow up there.
fn grazing_cos_threshold() -> f32 {
    (std::f32::consts::PI / 180.0).sin()
}

impl Triangle {
    pub fn new(vertices: [Vec3; 3], two_sided: bool) -> Self {
        let ab = vertices[1] - vertices[0];
        let ac = vertices[2] - vertices[0];
        let cross = ab.cross(ac);
        let normal = if is_safe_to_normalize(cross) {
            cross.normalize()
        } else {
            Vec3::ZERO
        };
        let tangent = if is_safe_to_normalize(ab) {
            ab.normalize()
        } else {
            Vec3::ZERO
        };
        Self {
            vertices,
            normal,
            tangent,
            two_sided,
        }
    }

    pub fn aabb(&self) -> Aabb {
        Aabb {
            min: self.vertices[0].min(self.vertices[1]).min(self.vertices[2]),
            max: self.vertices[0].max(self.vertices[1]).max(self.vertices[2]),
        }
    }

    pub fn area(&self) -> f32 {
        let u = self.vertices[1] - self.vertices[0];
        let v = self.vertices[2] - self.vertices[0];
        0.5 * u.cross(v).length()
    }

    /// Moller-Trumbore. Solves `O + t*D = (1 - b1 - b2)*A + b1*B + b2*C` for
    /// `(t, b1, b2)`. The reported normal always faces the ray origin; a
    /// back-face hit on a one-sided triangle is a miss.
    pub fn ray_cast(&self, input: &RayCastInput) -> Option<RayCastOutput> {
        let o = input.origin;
        let d = input.direction;

        let dn = d.dot(self.normal);
        if dn.abs() < EPS {
            return None;
        }

        let mut n = self.normal;
        if dn > 0.0 {
            if !self.two_sided {
                return None;
            }
            n = -self.normal;
        }

        let e1 = self.vertices[1] - self.vertices[0];
        let e2 = self.vertices[2] - self.vertices[0];
        let s = o - self.vertices[0];
        let s1 = d.cross(e2);
        let s2 = s.cross(e1);

        let det_inv = 1.0 / s1.dot(e1);
        let t = s2.dot(e2) * det_inv;
        let b1 = s1.dot(s) * det_inv;
        let b2 = s2.dot(d) * det_inv;
        let b0 = 1.0 - b1 - b2;

        if t < 0.0 || input.max_lambda < t {
            return None;
        }
        if !(0.0..=1.0).contains(&b0) || !(0.0..=1.0).contains(&b1) || !(0.0..=1.0).contains(&b2) {
            return None;
        }

        let p = self.vertices[0] * b0 + self.vertices[1] * b1 + self.vertices[2] * b2;
        Some(RayCastOutput {
            hit_point: p,
            hit_normal: n,
            hit_tangent: self.tangent,
            lambda: t,
        })
    }

    /// Uniform point on the surface, no vantage constraint. Two-sided
    /// triangles spread the density over both orientations (the reflection
    /// branch of the barycentric fold picks the back face), so the density
    /// relative to one-sided area is halved.
    pub fn sample_surface_point(&self, rng: &mut RngState) -> (SurfacePoint, f32) {
        let u = self.vertices[1] - self.vertices[0];
        let v = self.vertices[2] - self.vertices[0];
        let mut a = rng.gen_r1();
        let mut b = rng.gen_r1();
        let parallelogram_area = u.cross(v).length();

        if self.two_sided {
            let normal = if a + b > 1.0 {
                a = 1.0 - a;
                b = 1.0 - b;
                -self.normal
            } else {
                self.normal
            };
            let point = SurfacePoint {
                point: self.vertices[0] + u * a + v * b,
                normal,
                tangent: self.tangent,
            };
            (point, 1.0 / parallelogram_area)
        } else {
            if a + b > 1.0 {
                a = 1.0 - a;
                b = 1.0 - b;
            }
            let point = SurfacePoint {
                point: self.vertices[0] + u * a + v * b,
                normal: self.normal,
                tangent: self.tangent,
            };
            (point, 2.0 / parallelogram_area)
        }
    }

    /// Uniform point on the side of the surface facing `vantage`. Fails when
    /// the vantage direction grazes the plane (or, one-sided, lies behind it).
    pub fn sample_visible_point(
        &self,
        rng: &mut RngState,
        vantage: Vec3,
    ) -> Option<(SurfacePoint, f32)> {
        let u = self.vertices[1] - self.vertices[0];
        let v = self.vertices[2] - self.vertices[0];
        let mut a = rng.gen_r1();
        let mut b = rng.gen_r1();
        if a + b > 1.0 {
            a = 1.0 - a;
            b = 1.0 - b;
        }
        let point = self.vertices[0] + u * a + v * b;
        let density = 2.0 / u.cross(v).length();

        let to_vantage = vantage - point;
        if !is_safe_to_normalize(to_vantage) {
            return None;
        }
        let to_vantage = to_vantage.normalize();

        let thresh = grazing_cos_threshold();
        let dot = to_vantage.dot(self.normal);

        let normal = if self.two_sided {
            if dot < -thresh {
                -self.normal
            } else if dot > thresh {
                self.normal
            } else {
                return None;
            }
        } else {
            if dot < thresh {
                return None;
            }
            self.normal
        };

        Some((
            SurfacePoint {
                point,
                normal,
                tangent: self.tangent,
            },
            density,
        ))
    }

    /// Density `sample_visible_point` would have reported for `point` as seen
    /// from `vantage`; zero where sampling would have failed.
    pub fn pdf_for_point(&self, point: Vec3, vantage: Vec3) -> f32 {
        let to_vantage = vantage - point;
        if !is_safe_to_normalize(to_vantage) {
            return 0.0;
        }
        let to_vantage = to_vantage.normalize();

        let thresh = grazing_cos_threshold();
        let dot = to_vantage.dot(self.normal);

        if self.two_sided {
            if (-thresh..thresh).contains(&dot) {
                return 0.0;
            }
        } else if dot < thresh {
            return 0.0;
        }

        let u = self.vertices[1] - self.vertices[0];
        let v = self.vertices[2] - self.vertices[0];
        2.0 / u.cross(v).length()
    }
}
