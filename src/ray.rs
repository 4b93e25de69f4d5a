use glam::Vec3;

#[derive(Clone, Copy, Debug)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

/// Ray-cast query against a single shape or the whole scene. `direction` need
/// not be unit length; `lambda` is measured in multiples of it, so a segment
/// cast uses the unnormalized span with `max_lambda = 1`.
#[derive(Clone, Copy, Debug)]
pub struct RayCastInput {
    pub origin: Vec3,
    pub direction: Vec3,
    pub max_lambda: f32,
}

#[derive(Clone, Copy, Debug)]
pub struct RayCastOutput {
    pub hit_point: Vec3,
    pub hit_normal: Vec3,
    pub hit_tangent: Vec3,
    pub lambda: f32,
}
