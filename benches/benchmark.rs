use std::f32::consts::PI;

use criterion::{criterion_group, criterion_main, Criterion};
use glam::{Quat, Vec3};

use glint::jobs::{parallel_for, JobSystem};
use glint::rng::RngState;
use glint::{
    Eye, InputMaterial, InputTriangle, MaterialStandardDef, RenderInput, RenderMode, Scene,
    SceneDef,
};

fn soup_def(count: usize) -> SceneDef {
    let mut rng = RngState::new(1);
    let mut def = SceneDef {
        material_standards: vec![MaterialStandardDef {
            albedo_diffuse: Vec3::splat(0.6),
            ..Default::default()
        }],
        ..Default::default()
    };
    for _ in 0..count {
        let base = Vec3::new(
            rng.gen_range(-10.0, 10.0),
            rng.gen_range(-10.0, 10.0),
            rng.gen_range(-10.0, 10.0),
        );
        let b = base
            + Vec3::new(
                rng.gen_range(-0.5, 0.5),
                rng.gen_range(-0.5, 0.5),
                rng.gen_range(-0.5, 0.5),
            );
        let c = base
            + Vec3::new(
                rng.gen_range(-0.5, 0.5),
                rng.gen_range(-0.5, 0.5),
                rng.gen_range(-0.5, 0.5),
            );
        def.triangles.push(InputTriangle {
            vertices: [base, b, c],
            two_sided: true,
            material: InputMaterial::Standard(0),
        });
    }
    def
}

fn bench_bvh_build(c: &mut Criterion) {
    let def = soup_def(10_000);
    c.bench_function("bvh_build_10k", |b| b.iter(|| Scene::new(&def)));
}

fn bench_render(c: &mut Criterion) {
    let scene = Scene::new(&soup_def(2_000));
    let input = RenderInput {
        pixel_count_x: 64,
        pixel_count_y: 64,
        samples_per_pixel: 2,
        max_bounce_count: 2,
        fov_y: PI / 4.0,
        eye: Eye {
            position: Vec3::new(0.0, 0.0, 30.0),
            orientation: Quat::IDENTITY,
        },
        render_mode: RenderMode::Regular,
        sample_light: true,
        sample_brdf: true,
    };
    c.bench_function("render_64x64_soup", |b| b.iter(|| scene.render(&input)));
}

fn bench_parallel_for(c: &mut Criterion) {
    let sys = JobSystem::create(8);
    let mut elements = vec![0u64; 1_000_000];
    c.bench_function("parallel_for_1m", |b| {
        b.iter(|| parallel_for(&sys, &mut elements, |x| *x += 1))
    });
}

criterion_group!(benches, bench_bvh_build, bench_render, bench_parallel_for);
criterion_main!(benches);
