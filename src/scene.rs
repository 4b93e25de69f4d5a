use std::f32::consts::PI;

use glam::Vec3;
use log::debug;

use crate::aabb::Aabb;
use crate::bvh::{Bvh, RayCastFlow};
use crate::material::{Material, MaterialId, MaterialMirror, MaterialStandard};
use crate::ray::RayCastInput;
use crate::shape::{Shape, ShapeId, ShapeKind};
use crate::triangle::Triangle;

/// Hit record for a ray cast against the whole scene.
#[derive(Clone, Copy, Debug)]
pub struct SceneRayCastOutput {
    pub hit_point: Vec3,
    pub hit_normal: Vec3,
    pub hit_tangent: Vec3,
    pub lambda: f32,
    pub shape_id: ShapeId,
}

/// Material reference in a scene description: the kind tag plus, where the
/// kind is parameterized, an index into the matching descriptor list.
#[derive(Clone, Copy, Debug)]
pub enum InputMaterial {
    Standard(u32),
    Mirror,
}

#[derive(Clone, Copy, Debug)]
pub struct InputTriangle {
    pub vertices: [Vec3; 3],
    pub two_sided: bool,
    pub material: InputMaterial,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct MaterialStandardDef {
    pub albedo_diffuse: Vec3,
    pub albedo_specular: Vec3,
    pub emissive_diffuse: Vec3,
}

#[derive(Clone, Copy, Debug)]
pub struct PointLightDef {
    pub position: Vec3,
    /// Total radiated power per channel; stored as radiant intensity
    /// (wattage over the full sphere of directions).
    pub wattage: Vec3,
}

#[derive(Default)]
pub struct SceneDef {
    pub triangles: Vec<InputTriangle>,
    pub material_standards: Vec<MaterialStandardDef>,
    pub light_points: Vec<PointLightDef>,
}

#[derive(Clone, Copy, Debug)]
pub struct PointLight {
    pub position: Vec3,
    pub radiant_intensity: Vec3,
}

/// Owning container for everything a render reads: geometry, materials,
/// lights, the emissive-shape index set and the BVH. Immutable once built;
/// cross-references are indices into the sibling arrays.
pub struct Scene {
    pub(crate) shapes: Vec<Shape>,
    pub(crate) triangles: Vec<Triangle>,
    pub(crate) materials: Vec<Material>,
    pub(crate) material_standards: Vec<MaterialStandard>,
    pub(crate) material_mirrors: Vec<MaterialMirror>,
    pub(crate) light_points: Vec<PointLight>,
    pub(crate) emissive_shape_indices: Vec<u32>,
    pub(crate) bvh: Bvh,
}

impl Scene {
    pub fn new(def: &SceneDef) -> Scene {
        let standard_count = def.material_standards.len() as u32;
        let mirror_used = def
            .triangles
            .iter()
            .any(|t| matches!(t.material, InputMaterial::Mirror));

        let material_standards: Vec<MaterialStandard> = def
            .material_standards
            .iter()
            .map(|src| MaterialStandard {
                albedo_diffuse: src.albedo_diffuse.max(Vec3::ZERO),
                albedo_specular: src.albedo_specular.max(Vec3::ZERO),
                emissive_diffuse: src.emissive_diffuse.max(Vec3::ZERO),
            })
            .collect();
        let material_mirrors: Vec<MaterialMirror> = if mirror_used {
            vec![MaterialMirror]
        } else {
            Vec::new()
        };

        let mut materials: Vec<Material> = (0..standard_count)
            .map(|index| Material::Standard { index })
            .collect();
        let mirror_material_id = MaterialId(standard_count);
        if mirror_used {
            materials.push(Material::Mirror { index: 0 });
        }

        let mut triangles = Vec::with_capacity(def.triangles.len());
        let mut shapes = Vec::with_capacity(def.triangles.len());
        let mut leaf_aabbs: Vec<Aabb> = Vec::with_capacity(def.triangles.len());
        let mut leaf_shape_ids: Vec<ShapeId> = Vec::with_capacity(def.triangles.len());

        for (i, src) in def.triangles.iter().enumerate() {
            let triangle = Triangle::new(src.vertices, src.two_sided);
            let material = match src.material {
                InputMaterial::Standard(type_index) => {
                    assert!(type_index < standard_count, "standard material out of range");
                    MaterialId(type_index)
                }
                InputMaterial::Mirror => mirror_material_id,
            };
            leaf_aabbs.push(triangle.aabb());
            leaf_shape_ids.push(ShapeId(i as u32));
            triangles.push(triangle);
            shapes.push(Shape {
                kind: ShapeKind::Triangle { index: i as u32 },
                material,
            });
        }

        let bvh = Bvh::build(&leaf_aabbs, &leaf_shape_ids);

        let light_points: Vec<PointLight> = def
            .light_points
            .iter()
            .map(|src| PointLight {
                position: src.position,
                radiant_intensity: src.wattage * (0.25 / PI),
            })
            .collect();

        let emissive_shape_indices: Vec<u32> = shapes
            .iter()
            .enumerate()
            .filter(|(_, shape)| {
                materials[shape.material.0 as usize].is_emissive_with(&material_standards)
            })
            .map(|(i, _)| i as u32)
            .collect();

        debug!(
            "scene built: {} shapes, {} materials, {} point lights, {} emissive shapes",
            shapes.len(),
            materials.len(),
            light_points.len(),
            emissive_shape_indices.len()
        );

        Scene {
            shapes,
            triangles,
            materials,
            material_standards,
            material_mirrors,
            light_points,
            emissive_shape_indices,
            bvh,
        }
    }

    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    pub fn triangles(&self) -> &[Triangle] {
        &self.triangles
    }

    pub fn materials(&self) -> &[Material] {
        &self.materials
    }

    pub fn light_points(&self) -> &[PointLight] {
        &self.light_points
    }

    pub fn emissive_shape_indices(&self) -> &[u32] {
        &self.emissive_shape_indices
    }

    pub fn bvh(&self) -> &Bvh {
        &self.bvh
    }

    pub fn bvh_depth(&self) -> u32 {
        self.bvh.depth
    }

    pub fn ray_cast_closest(&self, input: &RayCastInput) -> Option<SceneRayCastOutput> {
        self.bvh.ray_cast_closest(self, input)
    }

    pub fn ray_cast<F>(&self, input: &RayCastInput, callback: F)
    where
        F: FnMut(&SceneRayCastOutput) -> RayCastFlow,
    {
        self.bvh.ray_cast(self, input, callback)
    }
}

impl Material {
    /// Emissive check usable during scene construction, before the scene that
    /// normally provides the lookup exists.
    fn is_emissive_with(&self, standards: &[MaterialStandard]) -> bool {
        match *self {
            Material::Standard { index } => standards[index as usize].is_emissive(),
            Material::Mirror { .. } => false,
        }
    }
}
