//! glint: an offline physically-based renderer.
//!
//! Scenes are triangle soups with Lambertian, mirror and emissive materials
//! plus point lights. Rendering is recursive Monte-Carlo path tracing with
//! balance-heuristic multiple-importance sampling over three strategies
//! (point lights, BRDF directions, emissive-surface area samples),
//! accelerated by an agglomeratively-built BVH. A work-stealing job system
//! with per-worker pools drives parallel array work.

pub mod aabb;
pub mod bvh;
pub mod jobs;
pub mod material;
pub mod math;
pub mod pool;
pub mod probability;
pub mod ray;
pub mod render;
pub mod rng;
pub mod scene;
pub mod shape;
pub mod trace;
pub mod triangle;

pub use render::{Eye, Render, RenderInput, RenderMode, RenderOutput, RenderState};
pub use scene::{
    InputMaterial, InputTriangle, MaterialStandardDef, PointLightDef, Scene, SceneDef,
};
