use std::fs;
use std::io;
use std::path::Path;

use glam::Vec3;
use riftgate_shared::hitbox::ZoneShape;
use riftgate_shared::material::DEFAULT_STENCIL_REF;
use serde::{Deserialize, Serialize};

use crate::crossing::ProbeDirection;

pub const SETTINGS_FILE: &str = "riftgate.toml";

pub const DEFAULT_SPAWN_CATALOG: [&str; 9] = [
    "portalmodel",
    "star_of_sun",
    "mercury_planet",
    "purple_planet",
    "saturn_planet",
    "death_row_spaceship",
    "intergalactic_spaceship_only_model",
    "spaceship",
    "pod",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorMode {
    /// Wait for the first surface hit, then fall back to the camera offset.
    #[default]
    FirstHit,
    /// Place immediately at the camera offset.
    CameraOffset,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortalSettings {
    pub anchor_mode: AnchorMode,
    /// Frames to wait for a surface hit before using the camera offset.
    pub hit_timeout_frames: u32,
    /// Offset in the initial camera frame, camera looks down -Z.
    pub fallback_offset: [f32; 3],
    pub uniform_scale: f32,
}

impl Default for PortalSettings {
    fn default() -> Self {
        Self {
            anchor_mode: AnchorMode::FirstHit,
            hit_timeout_frames: 90,
            fallback_offset: [0.0, 0.0, -1.3],
            uniform_scale: 0.8,
        }
    }
}

impl PortalSettings {
    pub fn fallback_offset(&self) -> Vec3 {
        Vec3::from(self.fallback_offset)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    pub stencil_reference: u8,
    /// Added to the portal `time` uniform once per frame.
    pub time_step: f32,
    /// Slow scale pulse on the membrane.
    pub membrane_breathing: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            stencil_reference: DEFAULT_STENCIL_REF,
            time_step: 0.01,
            membrane_breathing: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnSettings {
    pub catalog: Vec<String>,
    /// Exclusive upper bound of the uniform scale.
    pub max_scale: f32,
    /// Exclusive upper bound of the rotation, in degrees.
    pub max_rotation_degrees: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for SpawnSettings {
    fn default() -> Self {
        Self {
            catalog: DEFAULT_SPAWN_CATALOG.iter().map(|id| id.to_string()).collect(),
            max_scale: 0.1,
            max_rotation_degrees: 360.0,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorSettings {
    pub hit_test_supported: bool,
    pub floor_height: f32,
    /// Frames before a hit-test source request resolves.
    pub source_latency_frames: u32,
    /// Farthest floor hit reported along the view ray.
    pub max_hit_distance: f32,
    pub start_position: [f32; 3],
    pub move_speed: f32,
    pub look_sensitivity: f32,
}

impl Default for SimulatorSettings {
    fn default() -> Self {
        Self {
            hit_test_supported: true,
            floor_height: 0.0,
            source_latency_frames: 3,
            max_hit_distance: 8.0,
            start_position: [0.0, 1.6, 1.0],
            move_speed: 1.4,
            look_sensitivity: 0.002,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RiftgateSettings {
    pub probe: ProbeDirection,
    pub portal: PortalSettings,
    pub zones: ZoneShape,
    pub render: RenderSettings,
    pub spawn: SpawnSettings,
    pub simulator: SimulatorSettings,
}

impl RiftgateSettings {
    /// Loads `riftgate.toml` from `dir`. A missing file yields the defaults.
    pub fn load(dir: &Path) -> io::Result<Self> {
        let path = dir.join(SETTINGS_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }

        let toml_string = fs::read_to_string(path)?;
        Self::from_toml(&toml_string)
    }

    pub fn save(&self, dir: &Path) -> io::Result<()> {
        fs::create_dir_all(dir)?;

        let toml_string = toml::to_string_pretty(self).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("failed to serialize settings: {e}"),
            )
        })?;
        fs::write(dir.join(SETTINGS_FILE), toml_string)
    }

    pub fn from_toml(toml_string: &str) -> io::Result<Self> {
        let settings: Self = toml::from_str(toml_string).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("failed to deserialize settings: {e}"),
            )
        })?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> io::Result<()> {
        let invalid = |message: &str| -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::InvalidData, message.to_string()))
        };

        if !(self.portal.uniform_scale.is_finite() && self.portal.uniform_scale > 0.0) {
            return invalid("portal.uniform_scale must be positive");
        }
        if !(self.zones.depth > 0.0 && self.zones.gap >= 0.0 && self.zones.in_plane_margin > 0.0) {
            return invalid("zones need a positive depth and margin and a non-negative gap");
        }
        if !(self.render.time_step.is_finite() && self.render.time_step >= 0.0) {
            return invalid("render.time_step must be non-negative");
        }
        if self.render.stencil_reference == 0 {
            return invalid("render.stencil_reference must be non-zero; the stencil clears to 0");
        }
        let spawn_range = |value: f32| value.is_finite() && value >= 0.0;
        if !(spawn_range(self.spawn.max_scale) && spawn_range(self.spawn.max_rotation_degrees)) {
            return invalid("spawn ranges must be finite and non-negative");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::{AnchorMode, RiftgateSettings, DEFAULT_SPAWN_CATALOG};
    use crate::crossing::ProbeDirection;

    #[test]
    fn defaults_survive_a_toml_round_trip() {
        let settings = RiftgateSettings::default();
        let encoded = toml::to_string_pretty(&settings).expect("serialize");
        let decoded = RiftgateSettings::from_toml(&encoded).expect("deserialize");
        assert_eq!(decoded, settings);
        assert_eq!(decoded.spawn.catalog.len(), DEFAULT_SPAWN_CATALOG.len());
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let settings = RiftgateSettings::from_toml(
            r#"
probe = { fixed = [1.0, 1.0, 1.0] }

[portal]
anchor_mode = "camera_offset"

[spawn]
catalog = ["pod"]
seed = 42
"#,
        )
        .expect("parse");

        assert_eq!(settings.portal.anchor_mode, AnchorMode::CameraOffset);
        assert_eq!(settings.portal.hit_timeout_frames, 90);
        assert_eq!(settings.probe, ProbeDirection::Fixed([1.0, 1.0, 1.0]));
        assert_eq!(settings.spawn.catalog, vec!["pod".to_string()]);
        assert_eq!(settings.spawn.seed, Some(42));
        assert!((settings.render.time_step - 0.01).abs() < f32::EPSILON);
    }

    #[test]
    fn invalid_values_are_reported_as_invalid_data() {
        let err = RiftgateSettings::from_toml("[portal]\nuniform_scale = -1.0\n")
            .expect_err("negative scale");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        let err = RiftgateSettings::from_toml("portal = 3").expect_err("wrong shape");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn zero_stencil_reference_is_rejected() {
        let err = RiftgateSettings::from_toml("[render]\nstencil_reference = 0\n")
            .expect_err("zero reference");
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        let settings = RiftgateSettings::from_toml("[render]\nstencil_reference = 1\n")
            .expect("non-zero reference");
        assert_eq!(settings.render.stencil_reference, 1);
    }

    #[test]
    fn non_finite_spawn_ranges_are_rejected() {
        for body in ["max_scale = inf", "max_scale = nan", "max_rotation_degrees = inf"] {
            let err = RiftgateSettings::from_toml(&format!("[spawn]\n{body}\n"))
                .expect_err(body);
            assert_eq!(err.kind(), io::ErrorKind::InvalidData, "{body}");
        }
    }

    #[test]
    fn missing_file_loads_defaults_and_save_round_trips() {
        let dir = std::env::temp_dir().join(format!("riftgate-settings-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);

        let loaded = RiftgateSettings::load(&dir).expect("defaults");
        assert_eq!(loaded, RiftgateSettings::default());

        let mut settings = RiftgateSettings::default();
        settings.render.stencil_reference = 2;
        settings.save(&dir).expect("save");
        let reloaded = RiftgateSettings::load(&dir).expect("reload");
        assert_eq!(reloaded.render.stencil_reference, 2);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
