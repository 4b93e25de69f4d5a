use glam::Vec3;

use crate::aabb::Aabb;
use crate::material::MaterialId;
use crate::ray::{RayCastInput, RayCastOutput};
use crate::rng::RngState;
use crate::scene::Scene;
use crate::triangle::SurfacePoint;

/// Index into a scene's shape array.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShapeId(pub u32);

/// Geometry kind plus an index into the per-kind array owned by the scene.
#[derive(Clone, Copy, Debug)]
pub enum ShapeKind {
    Triangle { index: u32 },
}

#[derive(Clone, Copy, Debug)]
pub struct Shape {
    pub kind: ShapeKind,
    pub material: MaterialId,
}

impl Shape {
    pub fn aabb(&self, scene: &Scene) -> Aabb {
        match self.kind {
            ShapeKind::Triangle { index } => scene.triangles[index as usize].aabb(),
        }
    }

    pub fn ray_cast(&self, scene: &Scene, input: &RayCastInput) -> Option<RayCastOutput> {
        match self.kind {
            ShapeKind::Triangle { index } => scene.triangles[index as usize].ray_cast(input),
        }
    }

    pub fn sample_surface_point(&self, scene: &Scene, rng: &mut RngState) -> (SurfacePoint, f32) {
        match self.kind {
            ShapeKind::Triangle { index } => {
                scene.triangles[index as usize].sample_surface_point(rng)
            }
        }
    }

    pub fn sample_visible_point(
        &self,
        scene: &Scene,
        rng: &mut RngState,
        vantage: Vec3,
    ) -> Option<(SurfacePoint, f32)> {
        match self.kind {
            ShapeKind::Triangle { index } => {
                scene.triangles[index as usize].sample_visible_point(rng, vantage)
            }
        }
    }

    pub fn pdf_for_point(&self, scene: &Scene, point: Vec3, vantage: Vec3) -> f32 {
        match self.kind {
            ShapeKind::Triangle { index } => {
                scene.triangles[index as usize].pdf_for_point(point, vantage)
            }
        }
    }
}
