use glam::{Vec2, Vec3};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Sampler state threaded explicitly through everything that draws random
/// numbers. Each pixel gets its own stream so renders are reproducible and
/// worker threads never contend on shared RNG state.
pub struct RngState {
    rng: SmallRng,
}

impl RngState {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    pub fn gen_r1(&mut self) -> f32 {
        self.rng.gen()
    }

    pub fn gen_r2(&mut self) -> Vec2 {
        Vec2::new(self.gen_r1(), self.gen_r1())
    }

    pub fn gen_r3(&mut self) -> Vec3 {
        Vec3::new(self.gen_r1(), self.gen_r1(), self.gen_r1())
    }

    pub fn gen_range(&mut self, lo: f32, hi: f32) -> f32 {
        lo + (hi - lo) * self.gen_r1()
    }
}
