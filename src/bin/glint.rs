//! Demo driver: builds a small box scene, renders it in all three modes and
//! writes the results as PNGs next to the working directory.

use std::f32::consts::PI;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use glam::{Quat, Vec3};
use log::info;

use glint::{
    Eye, InputMaterial, InputTriangle, MaterialStandardDef, PointLightDef, RenderInput,
    RenderMode, RenderOutput, Scene, SceneDef,
};

fn quad(def: &mut SceneDef, corners: [Vec3; 4], material: InputMaterial, two_sided: bool) {
    def.triangles.push(InputTriangle {
        vertices: [corners[0], corners[1], corners[2]],
        two_sided,
        material,
    });
    def.triangles.push(InputTriangle {
        vertices: [corners[0], corners[2], corners[3]],
        two_sided,
        material,
    });
}

fn box_scene() -> SceneDef {
    let mut def = SceneDef::default();

    def.material_standards = vec![
        // White walls.
        MaterialStandardDef {
            albedo_diffuse: Vec3::splat(0.75),
            ..Default::default()
        },
        // Red and green side walls.
        MaterialStandardDef {
            albedo_diffuse: Vec3::new(0.65, 0.08, 0.08),
            ..Default::default()
        },
        MaterialStandardDef {
            albedo_diffuse: Vec3::new(0.08, 0.55, 0.12),
            ..Default::default()
        },
        // Ceiling lamp.
        MaterialStandardDef {
            emissive_diffuse: Vec3::splat(4.0),
            ..Default::default()
        },
    ];

    let white = InputMaterial::Standard(0);
    let red = InputMaterial::Standard(1);
    let green = InputMaterial::Standard(2);
    let lamp = InputMaterial::Standard(3);

    let (lo, hi) = (-2.0f32, 2.0f32);
    // Floor, ceiling, back wall.
    quad(
        &mut def,
        [
            Vec3::new(lo, lo, lo),
            Vec3::new(hi, lo, lo),
            Vec3::new(hi, lo, hi),
            Vec3::new(lo, lo, hi),
        ],
        white,
        false,
    );
    quad(
        &mut def,
        [
            Vec3::new(lo, hi, lo),
            Vec3::new(lo, hi, hi),
            Vec3::new(hi, hi, hi),
            Vec3::new(hi, hi, lo),
        ],
        white,
        false,
    );
    quad(
        &mut def,
        [
            Vec3::new(lo, lo, lo),
            Vec3::new(lo, hi, lo),
            Vec3::new(hi, hi, lo),
            Vec3::new(hi, lo, lo),
        ],
        white,
        false,
    );
    // Side walls.
    quad(
        &mut def,
        [
            Vec3::new(lo, lo, lo),
            Vec3::new(lo, lo, hi),
            Vec3::new(lo, hi, hi),
            Vec3::new(lo, hi, lo),
        ],
        red,
        false,
    );
    quad(
        &mut def,
        [
            Vec3::new(hi, lo, lo),
            Vec3::new(hi, hi, lo),
            Vec3::new(hi, hi, hi),
            Vec3::new(hi, lo, hi),
        ],
        green,
        false,
    );
    // Lamp slightly below the ceiling.
    quad(
        &mut def,
        [
            Vec3::new(-0.7, 1.95, -0.7),
            Vec3::new(-0.7, 1.95, 0.7),
            Vec3::new(0.7, 1.95, 0.7),
            Vec3::new(0.7, 1.95, -0.7),
        ],
        lamp,
        true,
    );
    // A mirror slab leaning on the back wall.
    quad(
        &mut def,
        [
            Vec3::new(-1.2, -2.0, -1.9),
            Vec3::new(-0.2, -2.0, -1.9),
            Vec3::new(-0.2, 0.0, -1.95),
            Vec3::new(-1.2, 0.0, -1.95),
        ],
        InputMaterial::Mirror,
        false,
    );

    def.light_points = vec![PointLightDef {
        position: Vec3::new(1.2, 1.2, 1.2),
        wattage: Vec3::splat(40.0),
    }];

    def
}

fn write_png(path: &str, output: &RenderOutput, gamma: bool) -> Result<()> {
    let mut image = image::RgbImage::new(output.width, output.height);
    for (i, pixel) in output.pixels.iter().enumerate() {
        let x = i as u32 % output.width;
        let y = i as u32 / output.width;
        let encode = |v: f32| {
            let v = if gamma { v.max(0.0).powf(1.0 / 2.2) } else { v };
            (v.clamp(0.0, 1.0) * 255.0) as u8
        };
        image.put_pixel(x, y, image::Rgb([encode(pixel[0]), encode(pixel[1]), encode(pixel[2])]));
    }
    image.save(path).with_context(|| format!("writing {path}"))?;
    info!("wrote {path}");
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();

    let scene = Arc::new(Scene::new(&box_scene()));
    info!("bvh depth: {}", scene.bvh_depth());

    let base = RenderInput {
        pixel_count_x: 320,
        pixel_count_y: 320,
        samples_per_pixel: 32,
        max_bounce_count: 3,
        fov_y: PI / 6.0,
        eye: Eye {
            position: Vec3::new(0.0, 0.0, 9.5),
            orientation: Quat::IDENTITY,
        },
        render_mode: RenderMode::Regular,
        sample_light: true,
        sample_brdf: true,
    };

    for (mode, name, gamma) in [
        (RenderMode::Regular, "render_regular.png", true),
        (RenderMode::Normals, "render_normals.png", false),
        (RenderMode::Depth, "render_depth.png", false),
    ] {
        let input = RenderInput {
            render_mode: mode,
            samples_per_pixel: if mode == RenderMode::Regular {
                base.samples_per_pixel
            } else {
                1
            },
            ..base
        };
        let started = Instant::now();
        let output = scene.render(&input);
        info!("{name}: {:.2}s", started.elapsed().as_secs_f32());
        write_png(name, &output, gamma)?;
    }

    Ok(())
}
