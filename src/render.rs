use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use glam::{Quat, Vec3};
use log::debug;
use parking_lot::Mutex;

use crate::scene::Scene;
use crate::trace;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum RenderState {
    Pending = 0,
    Initialized = 1,
    Working = 2,
    Finished = 3,
    Terminated = 4,
}

impl RenderState {
    fn from_u8(v: u8) -> RenderState {
        match v {
            0 => RenderState::Pending,
            1 => RenderState::Initialized,
            2 => RenderState::Working,
            3 => RenderState::Finished,
            4 => RenderState::Terminated,
            _ => unreachable!("invalid render state"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RenderMode {
    /// Linear radiance estimates.
    Regular,
    /// `(normal + 1) / 2` at the primary hit, zero on miss.
    Normals,
    /// Distance to the primary hit, `-1` sentinel on miss; normalized into
    /// `[0, 1]` by `final_output`, misses painted red.
    Depth,
}

#[derive(Clone, Copy, Debug)]
pub struct Eye {
    pub position: Vec3,
    pub orientation: Quat,
}

#[derive(Clone, Copy, Debug)]
pub struct RenderInput {
    pub pixel_count_x: u32,
    pub pixel_count_y: u32,
    pub samples_per_pixel: u32,
    pub max_bounce_count: u32,
    /// One-sided vertical field of view, radians.
    pub fov_y: f32,
    pub eye: Eye,
    pub render_mode: RenderMode,
    /// Importance-sampling strategy toggles; both false means both enabled.
    pub sample_light: bool,
    pub sample_brdf: bool,
}

impl Default for RenderInput {
    fn default() -> Self {
        Self {
            pixel_count_x: 64,
            pixel_count_y: 64,
            samples_per_pixel: 4,
            max_bounce_count: 4,
            fov_y: std::f32::consts::FRAC_PI_4,
            eye: Eye {
                position: Vec3::ZERO,
                orientation: Quat::IDENTITY,
            },
            render_mode: RenderMode::Regular,
            sample_light: true,
            sample_brdf: true,
        }
    }
}

/// Working pixel: radiance accumulator plus a flag that stays set until the
/// first completed sample batch lands.
#[derive(Clone, Copy, Debug)]
pub struct Pixel {
    pub value: Vec3,
    pub is_null: bool,
}

/// State shared between a render handle and its worker thread. The pixel
/// mutex doubles as the interrupt lock: the worker holds it per pixel, so a
/// reader grabbing it always observes whole pixels.
pub(crate) struct RenderShared {
    pub(crate) pixels: Mutex<Vec<Pixel>>,
    pub(crate) state: AtomicU8,
}

impl RenderShared {
    fn new(pixel_count: usize) -> Self {
        Self {
            pixels: Mutex::new(vec![
                Pixel {
                    value: Vec3::ZERO,
                    is_null: true,
                };
                pixel_count
            ]),
            state: AtomicU8::new(RenderState::Initialized as u8),
        }
    }

    pub(crate) fn state(&self) -> RenderState {
        RenderState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn store_state(&self, state: RenderState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// RGB buffer in row-major order, top row first.
#[derive(Clone, Debug, PartialEq)]
pub struct RenderOutput {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<[f32; 3]>,
}

impl RenderOutput {
    pub fn as_floats(&self) -> &[f32] {
        bytemuck::cast_slice(&self.pixels)
    }
}

/// An in-flight (or completed) render over a shared scene. Dropping the
/// handle terminates and joins the worker.
pub struct Render {
    scene: Arc<Scene>,
    input: RenderInput,
    shared: Arc<RenderShared>,
    worker: Option<JoinHandle<()>>,
}

impl Render {
    pub fn new(scene: Arc<Scene>, input: RenderInput) -> Render {
        let pixel_count = (input.pixel_count_x * input.pixel_count_y) as usize;
        Render {
            scene,
            input,
            shared: Arc::new(RenderShared::new(pixel_count)),
            worker: None,
        }
    }

    pub fn state(&self) -> RenderState {
        self.shared.state()
    }

    /// Spawns the worker thread running the full pixel loop.
    pub fn begin_work(&mut self) {
        assert_eq!(self.shared.state(), RenderState::Initialized);
        assert!(self.worker.is_none());
        let scene = Arc::clone(&self.scene);
        let shared = Arc::clone(&self.shared);
        let input = self.input;
        self.worker = Some(std::thread::spawn(move || {
            shared.store_state(RenderState::Working);
            trace::do_render_work(&scene, &input, &shared);
            // A terminate racing the tail of the loop wins; only a worker
            // that was still nominally working reports completion.
            let _ = shared.state.compare_exchange(
                RenderState::Working as u8,
                RenderState::Finished as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
            debug!("render worker done");
        }));
    }

    pub fn work_finished(&self) -> bool {
        self.shared.state() == RenderState::Finished
    }

    /// Consistent snapshot of the working pixels: RGBA rows with alpha 0 on
    /// pixels no sample has reached yet.
    pub fn intermediate_output(&self) -> Vec<[f32; 4]> {
        let state = self.shared.state();
        assert!(
            state == RenderState::Working || state == RenderState::Finished,
            "intermediate output requires an active or finished render"
        );
        let pixels = self.shared.pixels.lock();
        pixels
            .iter()
            .map(|p| {
                if p.is_null {
                    [0.0; 4]
                } else {
                    [p.value.x, p.value.y, p.value.z, 1.0]
                }
            })
            .collect()
    }

    pub fn final_output(&self) -> RenderOutput {
        assert_eq!(self.shared.state(), RenderState::Finished);
        let pixels = self.shared.pixels.lock();
        finalize_output(&self.input, &pixels)
    }

    /// Asks the worker to stop at its next row/column check, then joins it.
    pub fn terminate(&mut self) {
        let _ = self.shared.state.compare_exchange(
            RenderState::Working as u8,
            RenderState::Terminated as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
        if let Some(worker) = self.worker.take() {
            worker.join().unwrap();
        }
    }
}

impl Drop for Render {
    fn drop(&mut self) {
        self.terminate();
    }
}

impl Scene {
    /// Blocking render on the calling thread.
    pub fn render(&self, input: &RenderInput) -> RenderOutput {
        let pixel_count = (input.pixel_count_x * input.pixel_count_y) as usize;
        let shared = RenderShared::new(pixel_count);
        shared.store_state(RenderState::Working);
        trace::do_render_work(self, input, &shared);
        shared.store_state(RenderState::Finished);
        let pixels = shared.pixels.lock();
        finalize_output(input, &pixels)
    }
}

fn finalize_output(input: &RenderInput, pixels: &[Pixel]) -> RenderOutput {
    let mut out = Vec::with_capacity(pixels.len());
    match input.render_mode {
        RenderMode::Regular | RenderMode::Normals => {
            for p in pixels {
                out.push([p.value.x, p.value.y, p.value.z]);
            }
        }
        RenderMode::Depth => {
            let mut min_depth = f32::MAX;
            let mut max_depth = 0.0f32;
            for p in pixels {
                let depth = p.value.x;
                if depth < 0.0 {
                    continue;
                }
                min_depth = min_depth.min(depth);
                max_depth = max_depth.max(depth);
            }
            let range = max_depth - min_depth;
            for p in pixels {
                let depth = p.value.x;
                if depth < 0.0 {
                    out.push([1.0, 0.0, 0.0]);
                } else {
                    let normalized = if range > 0.0 {
                        (depth - min_depth) / range
                    } else {
                        0.0
                    };
                    out.push([normalized; 3]);
                }
            }
        }
    }
    RenderOutput {
        width: input.pixel_count_x,
        height: input.pixel_count_y,
        pixels: out,
    }
}
