use std::env;
use std::fs;
use std::path::Path;

use glam::{Quat, Vec3};
use riftgate_client::crossing::{CrossingDetector, CrossingVerdict, ProbeDirection};
use riftgate_client::portal::{PortalContext, PortalStateMachine, StepReport, PORTAL_BASE_RADIUS};
use riftgate_shared::hitbox::ZoneShape;
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
struct TracePortal {
    position: [f32; 3],
    /// Rotation about +Y; zero faces +Z.
    yaw_degrees: f32,
    radius: f32,
}

impl Default for TracePortal {
    fn default() -> Self {
        Self {
            position: [0.0, 1.6, -0.3],
            yaw_degrees: 0.0,
            radius: PORTAL_BASE_RADIUS * 0.8,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct Walk {
    from: [f32; 3],
    to: [f32; 3],
    steps: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct TraceFile {
    probe: ProbeDirection,
    portal: TracePortal,
    zones: ZoneShape,
    path: Vec<[f32; 3]>,
    walk: Vec<Walk>,
}

impl TraceFile {
    fn positions(&self) -> Vec<Vec3> {
        let mut positions: Vec<Vec3> = self.path.iter().copied().map(Vec3::from_array).collect();
        for walk in &self.walk {
            let from = Vec3::from_array(walk.from);
            let to = Vec3::from_array(walk.to);
            let steps = walk.steps.max(1);
            positions.extend((0..=steps).map(|step| from.lerp(to, step as f32 / steps as f32)));
        }
        positions
    }
}

struct TraceStep {
    position: Vec3,
    verdict: CrossingVerdict,
    context: PortalContext,
    report: StepReport,
}

fn detector(file: &TraceFile) -> CrossingDetector {
    CrossingDetector::around(
        Vec3::from_array(file.portal.position),
        Quat::from_rotation_y(file.portal.yaw_degrees.to_radians()),
        file.portal.radius,
        &file.zones,
        file.probe,
    )
}

fn trace(detector: &CrossingDetector, file: &TraceFile) -> (Vec<TraceStep>, u64) {
    let mut context = PortalContext::default();
    let mut machine = PortalStateMachine::new();

    let steps = file
        .positions()
        .into_iter()
        .map(|position| {
            let verdict = detector.detect(position);
            let report = machine.advance(&mut context, &verdict);
            TraceStep {
                position,
                verdict,
                context,
                report,
            }
        })
        .collect();
    (steps, machine.crossings())
}

fn main() {
    let Some(path) = env::args().nth(1) else {
        eprintln!("Usage: crossing_trace <path/to/trace.toml>");
        std::process::exit(2);
    };

    if let Err(err) = run(Path::new(&path)) {
        eprintln!("crossing_trace error: {err}");
        std::process::exit(1);
    }
}

fn run(path: &Path) -> Result<(), String> {
    let text = fs::read_to_string(path)
        .map_err(|err| format!("failed to read {}: {err}", path.display()))?;
    let file: TraceFile =
        toml::from_str(&text).map_err(|err| format!("failed to parse {}: {err}", path.display()))?;
    if file.path.is_empty() && file.walk.is_empty() {
        return Err("trace has no path or walk entries".to_string());
    }

    let detector = detector(&file);
    let (steps, crossings) = trace(&detector, &file);
    println!("Trace: {}", path.display());
    println!(
        "Portal: ({:.3}, {:.3}, {:.3}) yaw {:.1} radius {:.3}",
        file.portal.position[0],
        file.portal.position[1],
        file.portal.position[2],
        file.portal.yaw_degrees,
        file.portal.radius
    );
    let probe = detector.probe_direction();
    println!("Probe: ({:.3}, {:.3}, {:.3})", probe.x, probe.y, probe.z);
    for hitbox in detector.hitboxes().iter() {
        let center = hitbox.world.transform_point3(Vec3::ZERO);
        println!(
            "  {:<16} center ({:7.3}, {:7.3}, {:7.3})",
            hitbox.volume.name(),
            center.x,
            center.y,
            center.z
        );
    }
    for (index, step) in steps.iter().enumerate() {
        let memory = step.context.memory();
        let mode = step.context.mode();
        println!(
            "  {index:4} ({:7.3}, {:7.3}, {:7.3}) {:?} mem=({}, {}) world={} front={} {:?}",
            step.position.x,
            step.position.y,
            step.position.z,
            step.verdict.state(),
            memory.came_from_front(),
            memory.came_from_back(),
            mode.world_material_active(),
            mode.portal_front_material_active(),
            step.report.transitions,
        );
    }
    println!("Crossings: {crossings}");

    Ok(())
}

#[cfg(test)]
mod tests {
    use glam::Vec3;
    use riftgate_shared::hitbox::HitboxVolume;

    use super::{detector, trace, TraceFile};

    #[test]
    fn walk_through_trace_reports_one_crossing() {
        let file: TraceFile = toml::from_str(
            r#"
            [[walk]]
            from = [0.0, 1.6, 1.0]
            to = [0.0, 1.6, -2.0]
            steps = 150
            "#,
        )
        .expect("valid trace");

        let detector = detector(&file);
        let (steps, crossings) = trace(&detector, &file);
        assert_eq!(steps.len(), 151);
        assert_eq!(crossings, 1);
        let last = steps.last().expect("steps");
        assert!(last.context.mode().world_material_active());
        assert!(!last.context.mode().portal_front_material_active());
    }

    #[test]
    fn fixed_direction_and_zone_layout_follow_the_file() {
        let file: TraceFile = toml::from_str(
            r#"
            probe = { fixed = [0.0, 0.0, 2.0] }
            path = [[0.0, 1.6, 1.0]]

            [portal]
            position = [0.0, 1.6, 0.0]
            "#,
        )
        .expect("valid trace");

        let detector = detector(&file);
        assert!(detector.probe_direction().abs_diff_eq(Vec3::Z, 1.0e-6));

        let names: Vec<&str> = detector
            .hitboxes()
            .iter()
            .map(|hitbox| hitbox.volume.name())
            .collect();
        assert_eq!(names, ["hit_front_outer", "hit_back_outer", "hit_center"]);
        let front = detector.hitboxes().get(HitboxVolume::FrontOuter);
        assert!(front.world.transform_point3(Vec3::ZERO).z > 0.0);
    }
}
