//! Recursive radiance estimation and the per-pixel render loop.
//!
//! Three sampling strategies are combined per bounce: point-light direct
//! sampling, BRDF-direction sampling and area sampling of every emissive
//! shape. Point lights occupy an infinitesimal direction set, disjoint from
//! everything else, so they always carry full weight. Direction and area
//! sampling can land on the same emissive surface; when a cast along the
//! sampled BRDF direction shows they can, the two are weighted against each
//! other with the balance heuristic, otherwise each keeps weight 1.

use glam::Vec3;

use crate::material::Material;
use crate::math::{is_safe_to_normalize, SurfaceFrame, EPS, RAY_OFFSET};
use crate::ray::RayCastInput;
use crate::render::{Pixel, RenderInput, RenderMode, RenderShared, RenderState};
use crate::rng::RngState;
use crate::scene::Scene;
use crate::shape::Shape;

/// Everything the estimator needs to know about the point it is shading.
/// `incoming` is a unit vector pointing away from the surface, toward
/// whatever receives the radiance.
pub struct SurfaceData<'a> {
    pub shape: &'a Shape,
    pub material: &'a Material,
    pub position: Vec3,
    pub normal: Vec3,
    pub tangent: Vec3,
    pub incoming: Vec3,
}

pub fn sample_radiance(
    scene: &Scene,
    surface: &SurfaceData,
    bounce: u32,
    max_bounce: u32,
    sample_light: bool,
    sample_brdf: bool,
    rng: &mut RngState,
) -> Vec3 {
    let frame = SurfaceFrame::new(surface.normal, surface.tangent);
    let incoming_ls = frame.to_local(surface.incoming);

    let emitted = surface
        .material
        .emitted_radiance(scene, incoming_ls)
        .value;
    if bounce == max_bounce {
        return emitted;
    }

    let mut point_lit = Vec3::ZERO;
    for light in &scene.light_points {
        let to_light = light.position - surface.position;
        if !is_safe_to_normalize(to_light) {
            continue;
        }
        let rr = to_light.length_squared();
        let w = to_light.normalize();
        let cos_theta = w.dot(surface.normal);
        if cos_theta <= 0.0 {
            continue;
        }

        let shadow = RayCastInput {
            origin: surface.position + w * RAY_OFFSET,
            direction: to_light,
            max_lambda: 1.0,
        };
        let mut occluded = false;
        scene.ray_cast(&shadow, |_| {
            occluded = true;
            crate::bvh::RayCastFlow::Stop
        });
        if occluded {
            continue;
        }

        let brdf = surface.material.evaluate_brdf(scene, incoming_ls, frame.to_local(w));
        point_lit += light.radiant_intensity * (cos_theta / rr) * brdf.value;
    }

    // BRDF-direction strategy: one sample through the material's own lobe.
    let mut dir_radiance = Vec3::ZERO;
    let mut outgoing_ws = Vec3::ZERO;
    let mut p_angle_dir = 0.0f32;
    if sample_brdf {
        let sample = surface.material.sample_outgoing(scene, rng, incoming_ls);
        p_angle_dir = sample.pdf.per_solid_angle.value;
        outgoing_ws = frame.to_world(sample.direction);
        if p_angle_dir >= EPS {
            let input = RayCastInput {
                origin: surface.position + outgoing_ws * RAY_OFFSET,
                direction: outgoing_ws,
                max_lambda: f32::MAX,
            };
            if let Some(hit) = scene.ray_cast_closest(&input) {
                let cos_theta = outgoing_ws.dot(surface.normal);
                let hit_shape = &scene.shapes[hit.shape_id.0 as usize];
                let other = SurfaceData {
                    shape: hit_shape,
                    material: &scene.materials[hit_shape.material.0 as usize],
                    position: hit.hit_point,
                    normal: hit.hit_normal,
                    tangent: hit.hit_tangent,
                    incoming: -outgoing_ws,
                };
                let radiance = sample_radiance(
                    scene,
                    &other,
                    bounce + 1,
                    max_bounce,
                    sample_light,
                    sample_brdf,
                    rng,
                );
                // For a specular lobe both the BRDF and the density carry
                // Dirac tags with matched coefficients, so this ratio stays
                // exact without ever forming an infinity.
                dir_radiance = sample.bsdf.value * radiance * (cos_theta / p_angle_dir);
            }
        }
    }

    // Area strategy: one visible-surface sample per emissive shape. The
    // shapes are mutually disjoint, so each is its own strategy; only the
    // direction sample above can overlap them.
    let mut dir_pt_sampling_are_disjoint = true;
    let mut weight_dir = 0.0f32;
    let mut surface_lit = Vec3::ZERO;

    if sample_light {
        for &shape_idx in &scene.emissive_shape_indices {
            let shape_src = &scene.shapes[shape_idx as usize];
            let Some((point, p_area_pt)) =
                shape_src.sample_visible_point(scene, rng, surface.position)
            else {
                continue;
            };
            debug_assert!(p_area_pt > 0.0);

            let x_dst = point.point;
            let n_dst = point.normal;
            let to_dst = x_dst - surface.position;
            if !is_safe_to_normalize(to_dst) {
                continue;
            }
            let rr = to_dst.length_squared();
            let w = to_dst.normalize();
            let w_back = -w;
            let cos_dst = w_back.dot(n_dst);
            if cos_dst < EPS {
                continue;
            }
            // Area density to solid-angle density at the shading point.
            let p_angle_pt = p_area_pt * rr / cos_dst;
            if p_angle_pt < EPS {
                continue;
            }

            let mut weight_pt = 1.0f32;
            if sample_brdf {
                // Does the BRDF-direction strategy reach this shape? Probe
                // from the sampled point along the sampled direction.
                let probe = RayCastInput {
                    origin: x_dst + outgoing_ws * RAY_OFFSET,
                    direction: outgoing_ws,
                    max_lambda: f32::MAX,
                };
                if let Some(overlap_hit) = shape_src.ray_cast(scene, &probe) {
                    let w_ls = frame.to_local(w);
                    let p_angle_tmp_dir = surface
                        .material
                        .pdf_outgoing(scene, incoming_ls, w_ls)
                        .per_solid_angle
                        .value;
                    weight_pt = p_angle_pt / (p_angle_pt + p_angle_tmp_dir);

                    let p_area_tmp_pt =
                        shape_src.pdf_for_point(scene, overlap_hit.hit_point, x_dst);
                    let v_tmp = x_dst - overlap_hit.hit_point;
                    if is_safe_to_normalize(v_tmp) {
                        let w_tmp = v_tmp.normalize();
                        let cos_tmp = w_tmp.dot(overlap_hit.hit_normal);
                        if cos_tmp > EPS {
                            let p_angle_tmp_pt = p_area_tmp_pt * v_tmp.length_squared() / cos_tmp;
                            if p_angle_dir + p_angle_tmp_pt >= EPS {
                                weight_dir += p_angle_dir / (p_angle_dir + p_angle_tmp_pt);
                            }
                        }
                    }

                    dir_pt_sampling_are_disjoint = false;
                }
            }

            let cos_src = w.dot(surface.normal);
            if cos_src <= 0.0 {
                continue;
            }

            // Occlusion: the segment must reach the sampled shape. A hit on
            // the shape itself still counts as visible.
            let shadow = RayCastInput {
                origin: surface.position + w * RAY_OFFSET,
                direction: to_dst,
                max_lambda: 1.0,
            };
            if let Some(occluder) = scene.ray_cast_closest(&shadow) {
                if occluder.shape_id.0 != shape_idx {
                    continue;
                }
            }

            let brdf = surface.material.evaluate_brdf(scene, incoming_ls, frame.to_local(w));

            let other = SurfaceData {
                shape: shape_src,
                material: &scene.materials[shape_src.material.0 as usize],
                position: x_dst,
                normal: n_dst,
                tangent: point.tangent,
                incoming: w_back,
            };
            let radiance = sample_radiance(
                scene,
                &other,
                bounce + 1,
                max_bounce,
                sample_light,
                sample_brdf,
                rng,
            );
            surface_lit += weight_pt * brdf.value * radiance * (cos_dst / p_angle_pt);
        }
    }

    if dir_pt_sampling_are_disjoint {
        debug_assert_eq!(weight_dir, 0.0);
        weight_dir = 1.0;
    }
    surface_lit += weight_dir * dir_radiance;

    emitted + point_lit + surface_lit
}

/// The full pixel loop. Row-major; the shared state is checked at row and
/// column granularity so an asynchronous terminate lands quickly, and each
/// pixel is written under the interrupt lock.
pub(crate) fn do_render_work(scene: &Scene, input: &RenderInput, shared: &RenderShared) {
    if input.samples_per_pixel == 0 {
        return;
    }
    let spp_inv = 1.0 / input.samples_per_pixel as f32;

    let mut sample_light = input.sample_light;
    let mut sample_brdf = input.sample_brdf;
    if !sample_light && !sample_brdf {
        sample_light = true;
        sample_brdf = true;
    }

    let nx = input.pixel_count_x;
    let ny = input.pixel_count_y;
    let aspect_ratio = nx as f32 / ny as f32;
    // One-sided frustum extents at unit distance.
    let height = input.fov_y.tan();
    let width = height * aspect_ratio;
    let pixel_height = height / ny as f32;
    let pixel_width = width / nx as f32;

    let mut pixel_idx = 0usize;
    'rows: for i in 0..ny {
        if shared.state() == RenderState::Terminated {
            break;
        }
        let y_fraction = 1.0 - 2.0 * (i + 1) as f32 / ny as f32;
        let y_mid = height * y_fraction;
        for j in 0..nx {
            if shared.state() == RenderState::Terminated {
                break 'rows;
            }
            let x_fraction = 2.0 * (j + 1) as f32 / nx as f32 - 1.0;
            let x_mid = width * x_fraction;

            let mut rng = RngState::new(((i as u64) << 32) | j as u64);
            let mut value = Vec3::ZERO;
            {
                let mut pixels = shared.pixels.lock();
                for _ in 0..input.samples_per_pixel {
                    let x = x_mid + rng.gen_range(-pixel_width, pixel_width);
                    let y = y_mid + rng.gen_range(-pixel_height, pixel_height);

                    let pixel_dir_ls = Vec3::new(x, y, -1.0);
                    let pixel_dir_ws = input.eye.orientation * pixel_dir_ls;

                    let primary = RayCastInput {
                        origin: input.eye.position,
                        direction: pixel_dir_ws,
                        max_lambda: f32::MAX,
                    };
                    let hit = scene.ray_cast_closest(&primary);

                    match input.render_mode {
                        RenderMode::Regular => {
                            if let Some(hit) = hit {
                                let shape = &scene.shapes[hit.shape_id.0 as usize];
                                let surface = SurfaceData {
                                    shape,
                                    material: &scene.materials[shape.material.0 as usize],
                                    position: hit.hit_point,
                                    normal: hit.hit_normal,
                                    tangent: hit.hit_tangent,
                                    incoming: -pixel_dir_ws.normalize(),
                                };
                                value += sample_radiance(
                                    scene,
                                    &surface,
                                    0,
                                    input.max_bounce_count,
                                    sample_light,
                                    sample_brdf,
                                    &mut rng,
                                );
                            }
                        }
                        RenderMode::Normals => {
                            if let Some(hit) = hit {
                                value += (hit.hit_normal + Vec3::ONE) * 0.5;
                            }
                        }
                        RenderMode::Depth => {
                            let depth = match hit {
                                Some(hit) => hit.lambda * pixel_dir_ws.length(),
                                None => -1.0,
                            };
                            value += Vec3::splat(depth);
                        }
                    }
                }
                pixels[pixel_idx] = Pixel {
                    value: value * spp_inv,
                    is_null: false,
                };
            }
            pixel_idx += 1;
        }
    }
}
