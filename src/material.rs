use std::f32::consts::PI;

use glam::Vec3;

use crate::math::EPS;
use crate::probability::{DirectionalPdf, ProbabilityDensity};
use crate::rng::RngState;
use crate::scene::Scene;

/// BRDF value with a Dirac tag mirroring the one on densities: a specular
/// BRDF reports the coefficient of its delta, and the paired density record
/// carries the matching tag so the two cancel in estimator ratios.
#[derive(Clone, Copy, Debug)]
pub struct Bsdf {
    pub value: Vec3,
    pub is_finite: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct Radiance {
    pub value: Vec3,
    pub is_finite: bool,
}

#[derive(Clone, Copy, Debug)]
pub struct Irradiance {
    pub value: Vec3,
    pub is_finite: bool,
}

/// Index into a scene's base-material array.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MaterialId(pub u32);

#[derive(Clone, Copy, Debug)]
pub struct DirectionSample {
    pub direction: Vec3,
    pub bsdf: Bsdf,
    pub pdf: DirectionalPdf,
}

#[derive(Clone, Copy, Debug)]
pub struct EmissionSample {
    pub direction: Vec3,
    pub radiance: Radiance,
    pub pdf: DirectionalPdf,
}

/// Base material: a tag plus an index into the per-kind array owned by the
/// scene. All directions below are unit vectors in the local surface frame
/// `[tangent, bitangent, normal]`.
#[derive(Clone, Copy, Debug)]
pub enum Material {
    Standard { index: u32 },
    Mirror { index: u32 },
}

impl Material {
    pub fn evaluate_brdf(&self, scene: &Scene, w_i: Vec3, w_o: Vec3) -> Bsdf {
        match *self {
            Material::Standard { index } => {
                scene.material_standards[index as usize].evaluate_brdf(w_i, w_o)
            }
            Material::Mirror { index } => {
                scene.material_mirrors[index as usize].evaluate_brdf(w_i, w_o)
            }
        }
    }

    pub fn is_emissive(&self, scene: &Scene) -> bool {
        match *self {
            Material::Standard { index } => scene.material_standards[index as usize].is_emissive(),
            Material::Mirror { .. } => false,
        }
    }

    pub fn emitted_radiance(&self, scene: &Scene, w: Vec3) -> Radiance {
        match *self {
            Material::Standard { index } => {
                scene.material_standards[index as usize].emissive().evaluate_radiance(w)
            }
            Material::Mirror { .. } => Radiance {
                value: Vec3::ZERO,
                is_finite: true,
            },
        }
    }

    pub fn emitted_irradiance(&self, scene: &Scene) -> Irradiance {
        match *self {
            Material::Standard { index } => {
                scene.material_standards[index as usize].emissive().evaluate_irradiance()
            }
            Material::Mirror { .. } => Irradiance {
                value: Vec3::ZERO,
                is_finite: true,
            },
        }
    }

    pub fn sample_outgoing(&self, scene: &Scene, rng: &mut RngState, w_i: Vec3) -> DirectionSample {
        let sample = match *self {
            Material::Standard { index } => {
                scene.material_standards[index as usize].sample_outgoing(rng, w_i)
            }
            Material::Mirror { index } => {
                scene.material_mirrors[index as usize].sample_outgoing(rng, w_i)
            }
        };
        debug_assert!(sample.pdf.is_valid());
        debug_assert_eq!(
            sample.pdf.per_projected_solid_angle.is_finite,
            sample.bsdf.is_finite
        );
        debug_assert!((sample.direction.length() - 1.0).abs() < 1e-3);
        sample
    }

    pub fn sample_incoming(&self, scene: &Scene, rng: &mut RngState, w_o: Vec3) -> DirectionSample {
        let sample = match *self {
            Material::Standard { index } => {
                scene.material_standards[index as usize].sample_incoming(rng, w_o)
            }
            Material::Mirror { index } => {
                scene.material_mirrors[index as usize].sample_incoming(rng, w_o)
            }
        };
        debug_assert!(sample.pdf.is_valid());
        debug_assert_eq!(
            sample.pdf.per_projected_solid_angle.is_finite,
            sample.bsdf.is_finite
        );
        debug_assert!((sample.direction.length() - 1.0).abs() < 1e-3);
        sample
    }

    /// As `sample_outgoing`, additionally reporting the density with which
    /// the reverse generator would have produced `w_i` from the sampled
    /// outgoing direction.
    pub fn sample_outgoing_with_reverse(
        &self,
        scene: &Scene,
        rng: &mut RngState,
        w_i: Vec3,
    ) -> (DirectionSample, DirectionalPdf) {
        let sample = self.sample_outgoing(scene, rng, w_i);
        let reverse = self.pdf_incoming(scene, w_i, sample.direction);
        (sample, reverse)
    }

    pub fn sample_incoming_with_reverse(
        &self,
        scene: &Scene,
        rng: &mut RngState,
        w_o: Vec3,
    ) -> (DirectionSample, DirectionalPdf) {
        let sample = self.sample_incoming(scene, rng, w_o);
        let reverse = self.pdf_outgoing(scene, sample.direction, w_o);
        (sample, reverse)
    }

    /// Density with which `sample_outgoing(w_i)` generates `w_o`.
    pub fn pdf_outgoing(&self, scene: &Scene, w_i: Vec3, w_o: Vec3) -> DirectionalPdf {
        let p = match *self {
            Material::Standard { index } => {
                scene.material_standards[index as usize].pdf_outgoing(w_i, w_o)
            }
            Material::Mirror { index } => {
                scene.material_mirrors[index as usize].pdf_outgoing(w_i, w_o)
            }
        };
        debug_assert!(p.is_valid());
        p
    }

    /// Density with which `sample_incoming(w_o)` generates `w_i`.
    pub fn pdf_incoming(&self, scene: &Scene, w_i: Vec3, w_o: Vec3) -> DirectionalPdf {
        let p = match *self {
            Material::Standard { index } => {
                scene.material_standards[index as usize].pdf_incoming(w_i, w_o)
            }
            Material::Mirror { index } => {
                scene.material_mirrors[index as usize].pdf_incoming(w_i, w_o)
            }
        };
        debug_assert!(p.is_valid());
        p
    }

    pub fn sample_emission(&self, scene: &Scene, rng: &mut RngState) -> EmissionSample {
        let emissive = match *self {
            Material::Standard { index } => scene.material_standards[index as usize].emissive(),
            Material::Mirror { .. } => EmissiveUniform {
                radiance: Vec3::ZERO,
            },
        };
        let sample = emissive.sample_emission(rng);
        debug_assert!(sample.pdf.is_valid());
        sample
    }

    pub fn pdf_emission(&self, scene: &Scene, w: Vec3) -> DirectionalPdf {
        let emissive = match *self {
            Material::Standard { index } => scene.material_standards[index as usize].emissive(),
            Material::Mirror { .. } => EmissiveUniform {
                radiance: Vec3::ZERO,
            },
        };
        emissive.pdf_emission(w)
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Lambertian reflector with an emissive term. Specular albedo is carried for
/// scene description completeness but does not participate in sampling.
#[derive(Clone, Copy, Debug)]
pub struct MaterialStandard {
    pub albedo_diffuse: Vec3,
    pub albedo_specular: Vec3,
    pub emissive_diffuse: Vec3,
}

impl MaterialStandard {
    pub fn evaluate_brdf(&self, _w_i: Vec3, _w_o: Vec3) -> Bsdf {
        Bsdf {
            value: self.albedo_diffuse / PI,
            is_finite: true,
        }
    }

    pub fn is_emissive(&self) -> bool {
        self.emissive_diffuse != Vec3::ZERO
    }

    /// Emission is uniform over the hemisphere; delegate the radiometry to
    /// the dedicated emissive distribution.
    pub fn emissive(&self) -> EmissiveUniform {
        EmissiveUniform {
            radiance: self.emissive_diffuse,
        }
    }

    /// Importance-samples the per-solid-angle density `cos(theta)/pi`, i.e.
    /// the projected-solid-angle density is the constant `1/pi`. Sampling the
    /// 2D unit disc uniformly in `r^2 = sin^2(theta)` gives
    /// `cos(theta) = sqrt(1 - v)`.
    pub fn sample_outgoing(&self, rng: &mut RngState, _w_i: Vec3) -> DirectionSample {
        let u = rng.gen_r1();
        let v = rng.gen_r1();
        let phi = 2.0 * PI * u;
        let cos_theta = (1.0 - v).sqrt();
        let sin_theta = v.sqrt();
        let direction = Vec3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta);

        let per_solid_angle = if cos_theta < EPS {
            ProbabilityDensity::finite(0.0)
        } else {
            ProbabilityDensity::finite(cos_theta / PI)
        };
        DirectionSample {
            direction,
            bsdf: self.evaluate_brdf(Vec3::Z, direction),
            pdf: DirectionalPdf {
                per_solid_angle,
                per_projected_solid_angle: ProbabilityDensity::finite(1.0 / PI),
            },
        }
    }

    pub fn sample_incoming(&self, rng: &mut RngState, w_o: Vec3) -> DirectionSample {
        // Symmetric lobe; the incoming generator is the outgoing one.
        self.sample_outgoing(rng, w_o)
    }

    pub fn pdf_outgoing(&self, _w_i: Vec3, w_o: Vec3) -> DirectionalPdf {
        debug_assert!((w_o.length() - 1.0).abs() < 1e-3);
        if w_o.z > 0.0 {
            let per_solid_angle = if w_o.z > EPS {
                ProbabilityDensity::finite(w_o.z / PI)
            } else {
                ProbabilityDensity::finite(0.0)
            };
            DirectionalPdf {
                per_solid_angle,
                per_projected_solid_angle: ProbabilityDensity::finite(1.0 / PI),
            }
        } else {
            DirectionalPdf {
                per_solid_angle: ProbabilityDensity::finite(0.0),
                per_projected_solid_angle: ProbabilityDensity::finite(0.0),
            }
        }
    }

    pub fn pdf_incoming(&self, w_i: Vec3, w_o: Vec3) -> DirectionalPdf {
        self.pdf_outgoing(w_o, w_i)
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Perfect mirror. Both the BRDF and the densities are Dirac; the stored
/// values follow the unit-coefficient convention on the projected measure.
#[derive(Clone, Copy, Debug, Default)]
pub struct MaterialMirror;

impl MaterialMirror {
    /// The chance that two independently chosen directions form a mirror pair
    /// is zero, so evaluation of arbitrary pairs is zero and finite.
    pub fn evaluate_brdf(&self, _w_i: Vec3, _w_o: Vec3) -> Bsdf {
        Bsdf {
            value: Vec3::ZERO,
            is_finite: true,
        }
    }

    pub fn sample_outgoing(&self, _rng: &mut RngState, w_i: Vec3) -> DirectionSample {
        let direction = Vec3::new(-w_i.x, -w_i.y, w_i.z);
        DirectionSample {
            direction,
            bsdf: Bsdf {
                value: Vec3::ONE,
                is_finite: false,
            },
            pdf: DirectionalPdf {
                per_solid_angle: ProbabilityDensity::dirac(direction.z.max(0.0)),
                per_projected_solid_angle: ProbabilityDensity::dirac(1.0),
            },
        }
    }

    pub fn sample_incoming(&self, rng: &mut RngState, w_o: Vec3) -> DirectionSample {
        // Reflection is an involution.
        self.sample_outgoing(rng, w_o)
    }

    pub fn pdf_outgoing(&self, _w_i: Vec3, _w_o: Vec3) -> DirectionalPdf {
        DirectionalPdf {
            per_solid_angle: ProbabilityDensity::finite(0.0),
            per_projected_solid_angle: ProbabilityDensity::finite(0.0),
        }
    }

    pub fn pdf_incoming(&self, _w_i: Vec3, _w_o: Vec3) -> DirectionalPdf {
        DirectionalPdf {
            per_solid_angle: ProbabilityDensity::finite(0.0),
            per_projected_solid_angle: ProbabilityDensity::finite(0.0),
        }
    }
}

////////////////////////////////////////////////////////////////////////////////

/// Uniform hemispherical emitter: constant radiance on every exitant
/// direction above the surface, hence irradiance `radiance * pi`.
#[derive(Clone, Copy, Debug)]
pub struct EmissiveUniform {
    pub radiance: Vec3,
}

impl EmissiveUniform {
    pub fn evaluate_radiance(&self, _w: Vec3) -> Radiance {
        Radiance {
            value: self.radiance,
            is_finite: true,
        }
    }

    pub fn evaluate_irradiance(&self) -> Irradiance {
        Irradiance {
            value: self.radiance * PI,
            is_finite: true,
        }
    }

    /// Uniform over the hemisphere: per-solid-angle density `1/2pi`.
    pub fn sample_emission(&self, rng: &mut RngState) -> EmissionSample {
        let phi = 2.0 * PI * rng.gen_r1();
        let cos_theta = rng.gen_r1();
        let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
        let direction = Vec3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), cos_theta);

        let per_projected_solid_angle = if cos_theta < EPS {
            ProbabilityDensity::dirac(1.0)
        } else {
            ProbabilityDensity::finite(1.0 / (cos_theta * 2.0 * PI))
        };
        EmissionSample {
            direction,
            radiance: self.evaluate_radiance(direction),
            pdf: DirectionalPdf {
                per_solid_angle: ProbabilityDensity::finite(1.0 / (2.0 * PI)),
                per_projected_solid_angle,
            },
        }
    }

    pub fn pdf_emission(&self, w: Vec3) -> DirectionalPdf {
        if w.z > 0.0 {
            let per_projected_solid_angle = if w.z > EPS {
                ProbabilityDensity::finite(1.0 / (w.z * 2.0 * PI))
            } else {
                ProbabilityDensity::dirac(1.0)
            };
            DirectionalPdf {
                per_solid_angle: ProbabilityDensity::finite(1.0 / (2.0 * PI)),
                per_projected_solid_angle,
            }
        } else {
            DirectionalPdf {
                per_solid_angle: ProbabilityDensity::finite(0.0),
                per_projected_solid_angle: ProbabilityDensity::finite(0.0),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn white() -> MaterialStandard {
        MaterialStandard {
            albedo_diffuse: Vec3::ONE,
            albedo_specular: Vec3::ZERO,
            emissive_diffuse: Vec3::ZERO,
        }
    }

    #[test]
    fn lambertian_measure_identity() {
        let mat = white();
        let mut rng = RngState::new(42);
        for _ in 0..1000 {
            let s = mat.sample_outgoing(&mut rng, Vec3::Z);
            let cos_theta = s.direction.z;
            assert!(s.pdf.per_solid_angle.is_finite);
            assert!(s.pdf.per_projected_solid_angle.is_finite);
            assert!(
                (s.pdf.per_projected_solid_angle.value * cos_theta - s.pdf.per_solid_angle.value)
                    .abs()
                    < 1e-4
            );
            assert!((s.direction.length() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn lambertian_reverse_pdf_symmetric() {
        let mat = white();
        let w_a = Vec3::new(0.3, 0.2, 0.9).normalize();
        let w_b = Vec3::new(-0.1, 0.5, 0.85).normalize();
        let forward = mat.pdf_outgoing(w_a, w_b);
        let backward = mat.pdf_incoming(w_b, w_a);
        assert!((forward.per_solid_angle.value - backward.per_solid_angle.value).abs() < 1e-6);
    }

    #[test]
    fn lambertian_below_horizon_pdf_zero() {
        let mat = white();
        let below = Vec3::new(0.0, 0.6, -0.8);
        let p = mat.pdf_outgoing(Vec3::Z, below);
        assert_eq!(p.per_solid_angle.value, 0.0);
        assert_eq!(p.per_projected_solid_angle.value, 0.0);
    }

    #[test]
    fn mirror_sample_is_reflection_with_dirac_tags() {
        let mirror = MaterialMirror;
        let mut rng = RngState::new(0);
        let w_i = Vec3::new(0.5, -0.3, 0.8).normalize();
        let s = mirror.sample_outgoing(&mut rng, w_i);
        assert!((s.direction - Vec3::new(-w_i.x, -w_i.y, w_i.z)).length() < 1e-6);
        assert!(!s.pdf.per_projected_solid_angle.is_finite);
        assert_eq!(s.pdf.per_projected_solid_angle.value, 1.0);
        assert!((s.pdf.per_solid_angle.value - w_i.z).abs() < 1e-6);
        assert!(!s.bsdf.is_finite);

        // Arbitrary direction queries report zero with a finite tag.
        let q = mirror.pdf_outgoing(w_i, Vec3::Z);
        assert!(q.per_solid_angle.is_finite);
        assert_eq!(q.per_solid_angle.value, 0.0);
    }

    #[test]
    fn dispatch_through_a_scene() {
        use crate::scene::{MaterialStandardDef, Scene, SceneDef};

        let def = SceneDef {
            material_standards: vec![MaterialStandardDef {
                albedo_diffuse: Vec3::splat(0.5),
                albedo_specular: Vec3::ZERO,
                emissive_diffuse: Vec3::splat(2.0),
            }],
            ..Default::default()
        };
        let scene = Scene::new(&def);
        let material = scene.materials()[0];

        assert!(material.is_emissive(&scene));
        assert!((material.emitted_irradiance(&scene).value.x - 2.0 * PI).abs() < 1e-5);

        let mut rng = RngState::new(2);
        let (sample, reverse) = material.sample_outgoing_with_reverse(&scene, &mut rng, Vec3::Z);
        let _ = sample;
        // Incoming straight down the normal: the reverse generator density
        // at it is cos(0)/pi.
        assert!((reverse.per_solid_angle.value - 1.0 / PI).abs() < 1e-5);

        let emission = material.sample_emission(&scene, &mut rng);
        assert_eq!(emission.radiance.value, Vec3::splat(2.0));
        assert!(
            material
                .pdf_emission(&scene, emission.direction)
                .per_solid_angle
                .value
                > 0.0
        );
    }

    #[test]
    fn emission_density_uniform_hemisphere() {
        let emissive = EmissiveUniform {
            radiance: Vec3::ONE,
        };
        let mut rng = RngState::new(13);
        for _ in 0..500 {
            let s = emissive.sample_emission(&mut rng);
            assert!(s.direction.z >= 0.0);
            assert!((s.pdf.per_solid_angle.value - 1.0 / (2.0 * PI)).abs() < 1e-6);
            if s.pdf.per_projected_solid_angle.is_finite {
                assert!(
                    (s.pdf.per_projected_solid_angle.value * s.direction.z * 2.0 * PI - 1.0).abs()
                        < 1e-4
                );
            }
        }
        let irr = emissive.evaluate_irradiance();
        assert!((irr.value.x - PI).abs() < 1e-6);
    }
}
