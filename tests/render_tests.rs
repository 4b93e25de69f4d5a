use std::f32::consts::PI;
use std::sync::Arc;
use std::time::{Duration, Instant};

use glam::{Quat, Vec3};

use glint::{
    Eye, InputMaterial, InputTriangle, MaterialStandardDef, PointLightDef, Render, RenderInput,
    RenderMode, RenderOutput, RenderState, Scene, SceneDef,
};

fn small_input() -> RenderInput {
    RenderInput {
        pixel_count_x: 4,
        pixel_count_y: 4,
        samples_per_pixel: 1,
        max_bounce_count: 0,
        fov_y: PI / 4.0,
        eye: Eye {
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
        },
        render_mode: RenderMode::Regular,
        sample_light: true,
        sample_brdf: true,
    }
}

fn mean_brightness(output: &RenderOutput) -> f32 {
    let sum: f32 = output.pixels.iter().map(|p| p[0] + p[1] + p[2]).sum();
    sum / (3.0 * output.pixels.len() as f32)
}

/// One huge two-sided emissive triangle well in front of the camera,
/// covering every primary ray.
fn emissive_backdrop(radiance: Vec3) -> SceneDef {
    SceneDef {
        triangles: vec![InputTriangle {
            vertices: [
                Vec3::new(-1000.0, -1000.0, -2.0),
                Vec3::new(1000.0, -1000.0, -2.0),
                Vec3::new(0.0, 1500.0, -2.0),
            ],
            two_sided: true,
            material: InputMaterial::Standard(0),
        }],
        material_standards: vec![MaterialStandardDef {
            emissive_diffuse: radiance,
            ..Default::default()
        }],
        light_points: Vec::new(),
    }
}

#[test]
fn empty_scene_renders_black() {
    let scene = Scene::new(&SceneDef::default());
    let output = scene.render(&small_input());
    assert_eq!(output.pixels.len(), 16);
    for pixel in &output.pixels {
        assert_eq!(*pixel, [0.0, 0.0, 0.0]);
    }
}

#[test]
fn emissive_triangle_fills_the_frame() {
    let scene = Scene::new(&emissive_backdrop(Vec3::ONE));
    let input = RenderInput {
        pixel_count_x: 8,
        pixel_count_y: 8,
        samples_per_pixel: 16,
        ..small_input()
    };
    let output = scene.render(&input);
    for pixel in &output.pixels {
        for channel in pixel {
            assert!((channel - 1.0).abs() < 1e-4, "channel {channel}");
        }
    }
}

#[test]
fn point_light_over_lambertian_plane() {
    // Unit-albedo plane at z = 0 facing +z, light 1m above the origin with
    // wattage 4pi (radiant intensity 1). The directly-lit point under the
    // light sees radiance 1/pi.
    let def = SceneDef {
        triangles: vec![
            InputTriangle {
                vertices: [
                    Vec3::new(-50.0, -50.0, 0.0),
                    Vec3::new(50.0, -50.0, 0.0),
                    Vec3::new(50.0, 50.0, 0.0),
                ],
                two_sided: false,
                material: InputMaterial::Standard(0),
            },
            InputTriangle {
                vertices: [
                    Vec3::new(-50.0, -50.0, 0.0),
                    Vec3::new(50.0, 50.0, 0.0),
                    Vec3::new(-50.0, 50.0, 0.0),
                ],
                two_sided: false,
                material: InputMaterial::Standard(0),
            },
        ],
        material_standards: vec![MaterialStandardDef {
            albedo_diffuse: Vec3::ONE,
            ..Default::default()
        }],
        light_points: vec![PointLightDef {
            position: Vec3::new(0.0, 0.0, 1.0),
            wattage: Vec3::splat(4.0 * PI),
        }],
    };
    let scene = Scene::new(&def);

    let input = RenderInput {
        pixel_count_x: 9,
        pixel_count_y: 9,
        samples_per_pixel: 64,
        max_bounce_count: 1,
        fov_y: 0.05,
        eye: Eye {
            position: Vec3::new(0.0, 0.0, 3.0),
            orientation: Quat::IDENTITY,
        },
        render_mode: RenderMode::Regular,
        sample_light: true,
        sample_brdf: false,
    };
    let output = scene.render(&input);

    // Center pixel looks (almost) straight down at the origin.
    let center = output.pixels[(4 * 9 + 4) as usize];
    for channel in center {
        assert!(
            (channel - 1.0 / PI).abs() < 0.02 / PI,
            "expected ~{}, got {channel}",
            1.0 / PI
        );
    }
}

#[test]
fn normals_mode_encodes_hit_normals() {
    let scene = Scene::new(&emissive_backdrop(Vec3::ONE));
    let input = RenderInput {
        render_mode: RenderMode::Normals,
        ..small_input()
    };
    let output = scene.render(&input);
    // Backdrop normal faces +z toward the camera: encoded (0.5, 0.5, 1.0).
    for pixel in &output.pixels {
        assert!((pixel[0] - 0.5).abs() < 1e-5);
        assert!((pixel[1] - 0.5).abs() < 1e-5);
        assert!((pixel[2] - 1.0).abs() < 1e-5);
    }
}

#[test]
fn depth_mode_paints_misses_red() {
    // Backdrop only in the upper half of the frame.
    let def = SceneDef {
        triangles: vec![InputTriangle {
            vertices: [
                Vec3::new(-1000.0, 0.0, -2.0),
                Vec3::new(1000.0, 0.0, -2.0),
                Vec3::new(0.0, 1500.0, -2.0),
            ],
            two_sided: true,
            material: InputMaterial::Standard(0),
        }],
        material_standards: vec![MaterialStandardDef::default()],
        light_points: Vec::new(),
    };
    let scene = Scene::new(&def);
    let input = RenderInput {
        pixel_count_x: 8,
        pixel_count_y: 8,
        render_mode: RenderMode::Depth,
        ..small_input()
    };
    let output = scene.render(&input);

    let mut misses = 0;
    let mut hits = 0;
    for pixel in &output.pixels {
        if *pixel == [1.0, 0.0, 0.0] {
            misses += 1;
        } else {
            hits += 1;
            assert!(pixel[0] >= 0.0 && pixel[0] <= 1.0);
            assert_eq!(pixel[0], pixel[1]);
            assert_eq!(pixel[1], pixel[2]);
        }
    }
    assert!(misses > 0, "bottom half of the frame should miss");
    assert!(hits > 0, "top half of the frame should hit");
}

/// Both-false strategy flags behave as both-true.
#[test]
fn disabled_strategy_flags_fall_back_to_enabled() {
    let scene = Scene::new(&emissive_backdrop(Vec3::splat(0.8)));
    let mut input = small_input();
    input.max_bounce_count = 1;
    input.samples_per_pixel = 8;

    input.sample_light = false;
    input.sample_brdf = false;
    let neither = scene.render(&input);

    input.sample_light = true;
    input.sample_brdf = true;
    let both = scene.render(&input);

    assert_eq!(neither.pixels, both.pixels);
}

/// A diffuse floor lit by an emissive panel: BRDF sampling alone, area
/// sampling alone and the MIS combination must estimate the same image.
#[test]
fn mis_strategies_agree_on_the_mean() {
    let def = SceneDef {
        triangles: vec![
            // Floor at y = 0, normal +y.
            InputTriangle {
                vertices: [
                    Vec3::new(-20.0, 0.0, -20.0),
                    Vec3::new(20.0, 0.0, 20.0),
                    Vec3::new(20.0, 0.0, -20.0),
                ],
                two_sided: false,
                material: InputMaterial::Standard(0),
            },
            InputTriangle {
                vertices: [
                    Vec3::new(-20.0, 0.0, -20.0),
                    Vec3::new(-20.0, 0.0, 20.0),
                    Vec3::new(20.0, 0.0, 20.0),
                ],
                two_sided: false,
                material: InputMaterial::Standard(0),
            },
            // Emissive panel 2m above, facing down.
            InputTriangle {
                vertices: [
                    Vec3::new(-1.5, 2.0, -1.5),
                    Vec3::new(1.5, 2.0, -1.5),
                    Vec3::new(1.5, 2.0, 1.5),
                ],
                two_sided: false,
                material: InputMaterial::Standard(1),
            },
            InputTriangle {
                vertices: [
                    Vec3::new(-1.5, 2.0, -1.5),
                    Vec3::new(1.5, 2.0, 1.5),
                    Vec3::new(-1.5, 2.0, 1.5),
                ],
                two_sided: false,
                material: InputMaterial::Standard(1),
            },
        ],
        material_standards: vec![
            MaterialStandardDef {
                albedo_diffuse: Vec3::splat(0.8),
                ..Default::default()
            },
            MaterialStandardDef {
                emissive_diffuse: Vec3::splat(5.0),
                ..Default::default()
            },
        ],
        light_points: Vec::new(),
    };
    let scene = Scene::new(&def);

    let base = RenderInput {
        pixel_count_x: 16,
        pixel_count_y: 16,
        samples_per_pixel: 256,
        max_bounce_count: 1,
        fov_y: 0.5,
        eye: Eye {
            position: Vec3::new(0.0, 1.0, 6.0),
            orientation: Quat::from_rotation_x(-0.15),
        },
        render_mode: RenderMode::Regular,
        sample_light: false,
        sample_brdf: false,
    };

    let brdf_only = scene.render(&RenderInput {
        sample_brdf: true,
        ..base
    });
    let light_only = scene.render(&RenderInput {
        sample_light: true,
        ..base
    });
    let combined = scene.render(&RenderInput {
        sample_light: true,
        sample_brdf: true,
        ..base
    });

    let mean_brdf = mean_brightness(&brdf_only);
    let mean_light = mean_brightness(&light_only);
    let mean_combined = mean_brightness(&combined);

    assert!(mean_light > 0.0);
    let tolerance = 0.12 * mean_light;
    assert!(
        (mean_brdf - mean_light).abs() < tolerance,
        "brdf {mean_brdf} vs light {mean_light}"
    );
    assert!(
        (mean_combined - mean_light).abs() < tolerance,
        "combined {mean_combined} vs light {mean_light}"
    );

    // Combining strategies must not be noisier than the noisier strategy.
    // Area sampling converges fastest here, so treat its image as reference
    // and compare per-pixel squared deviation from it.
    let deviation = |output: &RenderOutput| -> f32 {
        output
            .pixels
            .iter()
            .zip(light_only.pixels.iter())
            .map(|(a, b)| {
                (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2) + (a[2] - b[2]).powi(2)
            })
            .sum::<f32>()
            / output.pixels.len() as f32
    };
    let dev_brdf = deviation(&brdf_only);
    let dev_combined = deviation(&combined);
    assert!(
        dev_combined <= dev_brdf * 1.5 + 1e-6,
        "combined deviation {dev_combined} vs brdf-only {dev_brdf}"
    );
}

#[test]
fn async_render_lifecycle() {
    let scene = Arc::new(Scene::new(&emissive_backdrop(Vec3::ONE)));
    let input = RenderInput {
        pixel_count_x: 32,
        pixel_count_y: 32,
        samples_per_pixel: 4,
        ..small_input()
    };

    let mut render = Render::new(Arc::clone(&scene), input);
    assert_eq!(render.state(), RenderState::Initialized);

    render.begin_work();
    let deadline = Instant::now() + Duration::from_secs(60);
    while !render.work_finished() {
        assert!(Instant::now() < deadline, "render did not finish");
        std::thread::yield_now();
    }

    let intermediate = render.intermediate_output();
    assert_eq!(intermediate.len(), 32 * 32);
    assert!(intermediate.iter().all(|p| p[3] == 1.0));

    let output = render.final_output();
    assert_eq!(output.width, 32);
    assert_eq!(output.height, 32);
    assert!((output.pixels[0][0] - 1.0).abs() < 1e-4);
}

#[test]
fn terminate_stops_a_working_render() {
    let scene = Arc::new(Scene::new(&emissive_backdrop(Vec3::ONE)));
    // Big enough that termination lands mid-flight.
    let input = RenderInput {
        pixel_count_x: 256,
        pixel_count_y: 256,
        samples_per_pixel: 16,
        max_bounce_count: 2,
        ..small_input()
    };

    let mut render = Render::new(scene, input);
    render.begin_work();
    while render.state() == RenderState::Initialized {
        std::thread::yield_now();
    }
    render.terminate();
    let state = render.state();
    assert!(
        state == RenderState::Terminated || state == RenderState::Finished,
        "unexpected state {state:?}"
    );
}

#[test]
fn output_buffer_is_flat_rgb() {
    let scene = Scene::new(&emissive_backdrop(Vec3::ONE));
    let output = scene.render(&small_input());
    let floats = output.as_floats();
    assert_eq!(floats.len(), 16 * 3);
    assert!((floats[0] - 1.0).abs() < 1e-4);
}
