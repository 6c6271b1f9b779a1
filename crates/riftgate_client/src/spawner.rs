use glam::{EulerRot, Quat};
use riftgate_shared::geometry::Transform;
use tracing::{debug, info};

use crate::settings::SpawnSettings;

/// xorshift64* generator; deterministic for a given seed.
#[derive(Debug, Clone)]
pub struct SpawnRng {
    state: u64,
}

impl SpawnRng {
    pub fn new(seed: u64) -> Self {
        Self {
            state: (seed ^ 0x9E37_79B9_7F4A_7C15).max(1),
        }
    }

    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        ((x.wrapping_mul(0x2545_F491_4F6C_DD1D)) >> 32) as u32
    }

    /// Uniform in `[0, 1)`.
    pub fn next_f32(&mut self) -> f32 {
        (self.next_u32() >> 8) as f32 / (1u32 << 24) as f32
    }

    /// Uniform in `[0, len)`; `len` must be non-zero.
    pub fn next_index(&mut self, len: usize) -> usize {
        ((self.next_u32() as u64 * len as u64) >> 32) as usize
    }
}

/// A decorative object rolled at the reticle, waiting for its model to load.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnRequest {
    pub model: String,
    pub catalog_index: usize,
    pub anchor: Transform,
    pub scale: f32,
    pub rotation_degrees: f32,
}

impl SpawnRequest {
    /// Reticle pose with the rolled rotation applied on every axis and the
    /// rolled uniform scale.
    pub fn transform(&self) -> Transform {
        let angle = self.rotation_degrees.to_radians();
        Transform {
            translation: self.anchor.translation,
            rotation: self.anchor.rotation * Quat::from_euler(EulerRot::XYZ, angle, angle, angle),
            scale: glam::Vec3::splat(self.scale),
        }
    }
}

pub struct ObjectSpawner {
    rng: SpawnRng,
    catalog: Vec<String>,
    max_scale: f32,
    max_rotation_degrees: f32,
    rolled: u64,
}

impl ObjectSpawner {
    pub fn new(settings: &SpawnSettings, seed: u64) -> Self {
        Self {
            rng: SpawnRng::new(settings.seed.unwrap_or(seed)),
            catalog: settings.catalog.clone(),
            max_scale: settings.max_scale,
            max_rotation_degrees: settings.max_rotation_degrees,
            rolled: 0,
        }
    }

    pub fn rolled(&self) -> u64 {
        self.rolled
    }

    /// Rolls a spawn at `placement`. Nothing happens without a visible
    /// reticle or with an empty catalog.
    pub fn roll(&mut self, placement: Option<Transform>) -> Option<SpawnRequest> {
        let Some(anchor) = placement else {
            debug!("select ignored: reticle hidden");
            return None;
        };
        if self.catalog.is_empty() {
            debug!("select ignored: spawn catalog is empty");
            return None;
        }

        let catalog_index = self.rng.next_index(self.catalog.len());
        let scale = self.rng.next_f32() * self.max_scale;
        let rotation_degrees = self.rng.next_f32() * self.max_rotation_degrees;
        self.rolled += 1;

        let model = self.catalog[catalog_index].clone();
        info!(
            position = ?anchor.translation,
            scale,
            rotation_degrees,
            "spawning {model}"
        );
        Some(SpawnRequest {
            model,
            catalog_index,
            anchor,
            scale,
            rotation_degrees,
        })
    }
}
