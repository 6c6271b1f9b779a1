use std::f32::consts::FRAC_PI_2;
use std::fmt;
use std::sync::Arc;

use glam::{Quat, Vec3};
use riftgate_core::events::{channel, EventReceiver, EventSender};
use riftgate_core::jobs::JobSystem;
use riftgate_shared::geometry::Transform;
use riftgate_shared::material::Material;
use riftgate_shared::mesh::{cuboid, disc, ring, torus, uv_sphere, MeshData};
use riftgate_shared::scene::{ModelContent, ModelNode};
use rustc_hash::FxHashMap;
use tracing::{error, info};

use crate::spawner::SpawnRequest;

pub const SKYBOX_ASSET: &str = "space_sphere";
pub const GATE_ASSET: &str = "xenon_gate";
pub const SKYBOX_RADIUS: f32 = 40.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetError {
    UnknownAsset(String),
    Build { id: String, reason: String },
}

impl fmt::Display for AssetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownAsset(id) => write!(f, "unknown asset '{id}'"),
            Self::Build { id, reason } => write!(f, "failed to build asset '{id}': {reason}"),
        }
    }
}

impl std::error::Error for AssetError {}

/// Produces model templates by identifier. Called from worker threads.
pub trait AssetSource: Send + Sync {
    fn load(&self, id: &str) -> Result<ModelNode, AssetError>;
}

/// Built-in procedural stand-ins for the skybox, the gate and the spawn
/// catalog.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProceduralAssets;

impl AssetSource for ProceduralAssets {
    fn load(&self, id: &str) -> Result<ModelNode, AssetError> {
        let model = match id {
            SKYBOX_ASSET => space_sphere(),
            GATE_ASSET => xenon_gate(),
            "portalmodel" => ModelNode::group(
                id,
                vec![
                    ModelNode::mesh("frame", torus(2.0, 0.25, 32, 8), glow([0.3, 0.6, 1.0])),
                    ModelNode::mesh(
                        "membrane",
                        disc(1.9, 32),
                        Material::unlit([0.4, 0.2, 0.8, 0.6]),
                    ),
                ],
            ),
            "star_of_sun" => ModelNode::mesh(
                id,
                uv_sphere(3.0, 16, 24),
                Material::emissive([1.0, 0.85, 0.3, 1.0], [1.0, 0.6, 0.1], 2.0),
            ),
            "mercury_planet" => planet(id, 1.5, [0.55, 0.52, 0.5, 1.0], None),
            "purple_planet" => planet(id, 2.0, [0.55, 0.25, 0.8, 1.0], None),
            "saturn_planet" => planet(
                id,
                2.2,
                [0.85, 0.75, 0.5, 1.0],
                Some([0.75, 0.68, 0.55, 0.8]),
            ),
            "death_row_spaceship" => spaceship(id, 3.0, [0.35, 0.35, 0.4, 1.0], [1.0, 0.2, 0.1]),
            "intergalactic_spaceship_only_model" => {
                spaceship(id, 4.0, [0.8, 0.82, 0.9, 1.0], [0.2, 0.7, 1.0])
            }
            "spaceship" => spaceship(id, 2.5, [0.6, 0.6, 0.65, 1.0], [0.3, 1.0, 0.4]),
            "pod" => ModelNode::group(
                id,
                vec![
                    ModelNode::mesh(
                        "hull",
                        uv_sphere(1.0, 12, 16),
                        Material::unlit([0.9, 0.9, 0.92, 1.0]),
                    ),
                    ModelNode::mesh(
                        "hatch",
                        cuboid(Vec3::new(0.4, 0.4, 0.1)),
                        glow([0.2, 0.9, 1.0]),
                    )
                    .with_transform(Transform::from_translation(Vec3::new(0.0, 0.0, 0.95))),
                ],
            ),
            other => return Err(AssetError::UnknownAsset(other.to_string())),
        };
        validate_model(id, &model)?;
        Ok(model)
    }
}

fn glow(color: [f32; 3]) -> Material {
    Material::emissive([color[0], color[1], color[2], 1.0], color, 1.3)
}

fn space_sphere() -> ModelNode {
    let nebula = uv_sphere(SKYBOX_RADIUS, 24, 48).flipped().with_vertex_colors(|p| {
        let height = (p.y / SKYBOX_RADIUS).clamp(-1.0, 1.0);
        let swirl = ((p.x * 0.15).sin() * (p.z * 0.11).cos()) * 0.5 + 0.5;
        [
            0.05 + 0.25 * swirl,
            0.02 + 0.08 * (1.0 - height.abs()),
            0.15 + 0.3 * (height * 0.5 + 0.5),
            1.0,
        ]
    });
    ModelNode::group(
        SKYBOX_ASSET,
        vec![ModelNode::mesh("nebula", nebula, Material::unlit([1.0, 1.0, 1.0, 1.0]))],
    )
}

/// Two concentric rings facing +Z; children[1] is the inner ring.
fn xenon_gate() -> ModelNode {
    ModelNode::group(
        GATE_ASSET,
        vec![
            ModelNode::mesh("outer_ring", torus(1.42, 0.08, 48, 12), glow([1.0, 0.5, 0.2])),
            ModelNode::mesh("inner_ring", torus(1.32, 0.04, 48, 8), glow([0.4, 0.7, 1.0])),
        ],
    )
}

fn planet(id: &str, radius: f32, color: [f32; 4], rings: Option<[f32; 4]>) -> ModelNode {
    let mut children = vec![ModelNode::mesh(
        "body",
        uv_sphere(radius, 16, 24),
        Material::unlit(color),
    )];
    if let Some(ring_color) = rings {
        let mut material = Material::unlit(ring_color);
        material.double_sided = true;
        children.push(ModelNode::mesh(
            "rings",
            ring(radius * 1.3, radius * 2.0, 48).rotated(Quat::from_rotation_x(-FRAC_PI_2 + 0.3)),
            material,
        ));
    }
    ModelNode::group(id, children)
}

fn spaceship(id: &str, length: f32, hull: [f32; 4], engine: [f32; 3]) -> ModelNode {
    let half = length * 0.5;
    ModelNode::group(
        id,
        vec![
            ModelNode::mesh(
                "hull",
                cuboid(Vec3::new(length * 0.12, length * 0.08, half)),
                Material::unlit(hull),
            ),
            ModelNode::mesh(
                "wings",
                cuboid(Vec3::new(length * 0.4, length * 0.015, length * 0.12)),
                Material::unlit(hull),
            )
            .with_transform(Transform::from_translation(Vec3::new(0.0, 0.0, half * 0.3))),
            ModelNode::mesh("engine", uv_sphere(length * 0.07, 8, 12), glow(engine))
                .with_transform(Transform::from_translation(Vec3::new(0.0, 0.0, half))),
        ],
    )
}

fn validate_model(id: &str, model: &ModelNode) -> Result<(), AssetError> {
    let build_error = |reason: String| AssetError::Build {
        id: id.to_string(),
        reason,
    };
    match &model.content {
        ModelContent::Group(children) => {
            if model.mesh_count() == 0 {
                return Err(build_error("model has no meshes".to_string()));
            }
            children.iter().try_for_each(|child| validate_model(id, child))
        }
        ModelContent::Mesh { mesh, .. } => validate_mesh(mesh).map_err(build_error),
    }
}

fn validate_mesh(mesh: &MeshData) -> Result<(), String> {
    let count = mesh.vertex_count() as u32;
    if mesh.geometry.triangles.is_empty() {
        return Err("mesh has no triangles".to_string());
    }
    if mesh.geometry.triangles.iter().flatten().any(|index| *index >= count) {
        return Err("triangle index out of range".to_string());
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetTicket(u64);

#[derive(Debug, Clone, PartialEq)]
pub enum LoadPurpose {
    Skybox,
    Gate,
    Spawn(SpawnRequest),
}

impl LoadPurpose {
    /// Required assets gate the "loading complete" notice.
    pub fn is_required(&self) -> bool {
        matches!(self, Self::Skybox | Self::Gate)
    }
}

pub struct AssetEvent {
    ticket: AssetTicket,
    result: Result<ModelNode, AssetError>,
}

/// A completed load, matched back to what requested it.
#[derive(Debug)]
pub struct LoadedAsset {
    pub ticket: AssetTicket,
    pub id: String,
    pub purpose: LoadPurpose,
    pub result: Result<ModelNode, AssetError>,
}

struct PendingLoad {
    id: String,
    purpose: LoadPurpose,
}

/// Runs asset builds on the job system and hands completions back to the
/// frame tick. Without a job system loads run inline but still complete
/// through the event queue.
pub struct AssetLoader {
    source: Arc<dyn AssetSource>,
    jobs: Option<JobSystem>,
    sender: EventSender<AssetEvent>,
    receiver: EventReceiver<AssetEvent>,
    next_ticket: u64,
    pending: FxHashMap<AssetTicket, PendingLoad>,
    items_total: usize,
    items_done: usize,
    items_failed: usize,
    required_pending: usize,
    required_complete_logged: bool,
}

impl AssetLoader {
    pub fn new(source: Arc<dyn AssetSource>, jobs: Option<JobSystem>) -> Self {
        let (sender, receiver) = channel();
        Self {
            source,
            jobs,
            sender,
            receiver,
            next_ticket: 1,
            pending: FxHashMap::default(),
            items_total: 0,
            items_done: 0,
            items_failed: 0,
            required_pending: 0,
            required_complete_logged: false,
        }
    }

    pub fn inline(source: Arc<dyn AssetSource>) -> Self {
        Self::new(source, None)
    }

    pub fn request(&mut self, id: &str, purpose: LoadPurpose) -> AssetTicket {
        let ticket = AssetTicket(self.next_ticket);
        self.next_ticket += 1;
        self.items_total += 1;
        if purpose.is_required() {
            self.required_pending += 1;
        }
        info!(
            "started loading {id} (loaded {} of {})",
            self.items_done, self.items_total
        );
        self.pending.insert(
            ticket,
            PendingLoad {
                id: id.to_string(),
                purpose,
            },
        );

        let source = Arc::clone(&self.source);
        let sender = self.sender.clone();
        let id = id.to_string();
        let job = move || {
            let result = source.load(&id);
            sender.send_or_drop(AssetEvent { ticket, result });
        };
        match self.jobs.as_ref() {
            Some(jobs) => jobs.spawn(job),
            None => job(),
        }
        ticket
    }

    /// Completions received since the last call, in arrival order.
    pub fn poll(&mut self) -> Vec<LoadedAsset> {
        let mut completed = Vec::new();
        for event in self.receiver.drain() {
            let Some(pending) = self.pending.remove(&event.ticket) else {
                continue;
            };
            self.items_done += 1;
            match &event.result {
                Ok(_) => info!(
                    "loaded {} (loaded {} of {})",
                    pending.id, self.items_done, self.items_total
                ),
                Err(err) => {
                    self.items_failed += 1;
                    error!("there was an error loading {}: {err}", pending.id);
                }
            }
            if pending.purpose.is_required() {
                self.required_pending = self.required_pending.saturating_sub(1);
            }
            completed.push(LoadedAsset {
                ticket: event.ticket,
                id: pending.id,
                purpose: pending.purpose,
                result: event.result,
            });
        }

        if self.required_pending == 0 && self.items_total > 0 && !self.required_complete_logged {
            self.required_complete_logged = true;
            info!("loading complete ({} failed)", self.items_failed);
        }
        completed
    }

    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    pub fn failed(&self) -> usize {
        self.items_failed
    }

    /// True once every skybox and gate request has succeeded or failed.
    pub fn required_settled(&self) -> bool {
        self.required_pending == 0
    }
}
