use glam::Vec3;

/// Guard against division by near-zero probabilities, grazing angles and
/// degenerate determinants. Samples that fall below this are dropped, never
/// clamped.
pub const EPS: f32 = 1e-6;

/// Offset applied along a secondary ray's direction so it doesn't re-hit the
/// surface it was spawned from.
pub const RAY_OFFSET: f32 = 0.001;

pub fn is_safe_to_normalize(v: Vec3) -> bool {
    v.length_squared() > EPS * EPS
}

/// Orthonormal frame at a surface point. Local coordinates are expressed in
/// `[tangent, bitangent, normal]` order, so `z` is the normal axis.
#[derive(Clone, Copy, Debug)]
pub struct SurfaceFrame {
    pub tangent: Vec3,
    pub bitangent: Vec3,
    pub normal: Vec3,
}

impl SurfaceFrame {
    pub fn new(normal: Vec3, tangent: Vec3) -> Self {
        Self {
            tangent,
            bitangent: normal.cross(tangent),
            normal,
        }
    }

    pub fn to_local(&self, w: Vec3) -> Vec3 {
        Vec3::new(w.dot(self.tangent), w.dot(self.bitangent), w.dot(self.normal))
    }

    pub fn to_world(&self, w: Vec3) -> Vec3 {
        self.tangent * w.x + self.bitangent * w.y + self.normal * w.z
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_round_trip() {
        let frame = SurfaceFrame::new(Vec3::Z, Vec3::X);
        let w = Vec3::new(0.3, -0.5, 0.8).normalize();
        let local = frame.to_local(w);
        assert!((frame.to_world(local) - w).length() < 1e-6);
        assert!((local.z - w.z).abs() < 1e-6);
    }

    #[test]
    fn safe_to_normalize_rejects_tiny() {
        assert!(!is_safe_to_normalize(Vec3::ZERO));
        assert!(!is_safe_to_normalize(Vec3::splat(1e-8)));
        assert!(is_safe_to_normalize(Vec3::X));
    }
}
