use std::sync::Arc;

use glam::{Mat4, Vec3};
use riftgate_core::events::{channel, EventReceiver, EventSender};
use riftgate_shared::material::{Material, PortalUniforms};
use riftgate_shared::mesh::disc;
use riftgate_shared::scene::{ModelNode, NodeId, Scene};
use tracing::{debug, info, warn};

use crate::animation::{gate_glow, inner_ring_spin, membrane_transform, GlowVisitor};
use crate::assets::{AssetLoader, LoadPurpose, LoadedAsset, GATE_ASSET, SKYBOX_ASSET};
use crate::camera::Camera;
use crate::crossing::{CrossingDetector, CrossingVerdict};
use crate::portal::{
    generate_portal, PortalAnchor, PortalContext, PortalPlacement, PortalStateMachine,
    RenderMode, StepReport, PORTAL_BASE_RADIUS,
};
use crate::reticle::ReticleController;
use crate::settings::{AnchorMode, RiftgateSettings};
use crate::spawner::ObjectSpawner;
use crate::switcher::{MaterialSwitcher, SwitchReport, SwitchTargets};
use crate::xr::{ArSession, HitTestOutcome, SessionId, SurfaceHitTester, XrEvent};

/// Everything that reaches the frame tick from outside it.
#[derive(Debug)]
pub enum FrameEvent {
    Xr(XrEvent),
    Asset(LoadedAsset),
    /// Screen tap, controller trigger or mouse click.
    Select,
    Resized { width: u32, height: u32 },
}

/// What the renderer receives once per tick.
pub struct RenderFrame<'a> {
    pub scene: &'a Scene,
    pub view_projection: Mat4,
    pub camera_position: Vec3,
    pub uniforms: PortalUniforms,
    pub mode: RenderMode,
    pub stencil_reference: u8,
}

pub trait FrameSink {
    fn submit(&mut self, frame: &RenderFrame<'_>);
}

#[derive(Debug, Clone, Default)]
pub struct TickReport {
    pub frame: u64,
    /// Skybox and gate requests have all succeeded or failed.
    pub assets_ready: bool,
    pub hit_test: Option<HitTestOutcome>,
    pub portal_generated: bool,
    pub verdict: Option<CrossingVerdict>,
    pub step: Option<StepReport>,
    pub switch: Option<SwitchReport>,
    pub spawn_requests: usize,
    pub spawned: usize,
}

#[derive(Debug, Default, Clone, Copy)]
struct PortalNodes {
    membrane: Option<NodeId>,
    skybox: Option<NodeId>,
    gate: Option<NodeId>,
    gate_inner: Option<NodeId>,
}

/// Per-frame orchestration: events, hit testing, anchor, animation, crossing
/// detection, state machine, material switch, submit.
pub struct FrameDriver {
    settings: RiftgateSettings,
    session: Option<Box<dyn ArSession>>,
    last_session: Option<SessionId>,
    xr_sender: EventSender<XrEvent>,
    xr_events: EventReceiver<XrEvent>,
    input_sender: EventSender<FrameEvent>,
    input_events: EventReceiver<FrameEvent>,
    hit_tester: SurfaceHitTester,
    reticle: ReticleController,
    assets: AssetLoader,
    spawner: ObjectSpawner,
    scene: Scene,
    anchor: Option<PortalAnchor>,
    detector: Option<CrossingDetector>,
    context: PortalContext,
    machine: PortalStateMachine,
    switcher: MaterialSwitcher,
    uniforms: PortalUniforms,
    nodes: PortalNodes,
    gate_template: Option<ModelNode>,
    initial_camera: Option<Mat4>,
    frames_waiting_for_hit: u32,
    frame: u64,
}

impl FrameDriver {
    pub fn new(settings: RiftgateSettings, mut assets: AssetLoader, seed: u64) -> Self {
        let (xr_sender, xr_events) = channel();
        let (input_sender, input_events) = channel();
        let mut scene = Scene::new();
        let mut reticle = ReticleController::new();
        reticle.attach(&mut scene);

        assets.request(SKYBOX_ASSET, LoadPurpose::Skybox);
        assets.request(GATE_ASSET, LoadPurpose::Gate);

        Self {
            spawner: ObjectSpawner::new(&settings.spawn, seed),
            switcher: MaterialSwitcher::new(settings.render.stencil_reference),
            settings,
            session: None,
            last_session: None,
            xr_sender,
            xr_events,
            input_sender,
            input_events,
            hit_tester: SurfaceHitTester::new(),
            reticle,
            assets,
            scene,
            anchor: None,
            detector: None,
            context: PortalContext::default(),
            machine: PortalStateMachine::new(),
            uniforms: PortalUniforms::default(),
            nodes: PortalNodes::default(),
            gate_template: None,
            initial_camera: None,
            frames_waiting_for_hit: 0,
            frame: 0,
        }
    }

    /// Queue for select and resize events.
    pub fn sender(&self) -> EventSender<FrameEvent> {
        self.input_sender.clone()
    }

    pub fn settings(&self) -> &RiftgateSettings {
        &self.settings
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn context(&self) -> PortalContext {
        self.context
    }

    pub fn anchor(&self) -> Option<&PortalAnchor> {
        self.anchor.as_ref()
    }

    pub fn reticle(&self) -> &ReticleController {
        &self.reticle
    }

    pub fn uniforms(&self) -> PortalUniforms {
        self.uniforms
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|session| session.session_id())
    }

    /// Generation for the next session; never reuses an earlier one.
    pub fn next_session_id(&self) -> SessionId {
        self.last_session
            .map(SessionId::next)
            .unwrap_or(SessionId::FIRST)
    }

    pub fn start_session(&mut self, session: Box<dyn ArSession>) {
        self.end_session();
        let id = session.session_id();
        info!("{id}: attached to frame driver");
        self.last_session = Some(id);
        self.session = Some(session);
    }

    /// Ends the current session and clears hit-test state before returning.
    pub fn end_session(&mut self) {
        let Some(mut session) = self.session.take() else {
            return;
        };
        session.end();
        self.hit_tester.on_session_ended(session.session_id());
        self.reticle.hide();
    }

    pub fn tick(&mut self, camera: &mut Camera, sink: &mut dyn FrameSink) -> TickReport {
        self.frame += 1;
        let mut report = TickReport {
            frame: self.frame,
            ..TickReport::default()
        };

        for event in self.collect_events() {
            self.dispatch(event, camera, &mut report);
        }
        report.assets_ready = self.assets.required_settled();

        let camera_world = camera.world_matrix();
        if self.initial_camera.is_none() {
            self.initial_camera = Some(camera_world);
        }

        let outcome = self.update_hit_test(&camera_world);
        report.hit_test = Some(outcome);

        if self.anchor.is_none() {
            report.portal_generated = self.try_generate_portal(&outcome, camera.position);
        }

        self.uniforms.advance(self.settings.render.time_step);
        self.animate();

        if let Some(detector) = self.detector.as_ref() {
            let verdict = detector.detect(camera.position);
            report.step = Some(self.machine.advance(&mut self.context, &verdict));
            report.verdict = Some(verdict);
        }

        let targets = SwitchTargets {
            portal: self.nodes.membrane,
            skybox: self.nodes.skybox,
        };
        report.switch = Some(self.switcher.apply(self.context.mode(), &mut self.scene, &targets));

        self.reticle.sync(&mut self.scene);
        sink.submit(&RenderFrame {
            scene: &self.scene,
            view_projection: camera.view_projection_matrix(),
            camera_position: camera.position,
            uniforms: self.uniforms,
            mode: self.context.mode(),
            stencil_reference: self.switcher.stencil_reference(),
        });
        report
    }

    fn collect_events(&mut self) -> Vec<FrameEvent> {
        let mut events: Vec<FrameEvent> = self
            .xr_events
            .drain()
            .into_iter()
            .map(FrameEvent::Xr)
            .collect();
        events.extend(self.assets.poll().into_iter().map(FrameEvent::Asset));
        events.extend(self.input_events.drain());
        events
    }

    fn dispatch(&mut self, event: FrameEvent, camera: &mut Camera, report: &mut TickReport) {
        match event {
            FrameEvent::Xr(XrEvent::HitTestSourceReady { session, source }) => {
                self.hit_tester.on_source_ready(session, source);
            }
            FrameEvent::Xr(XrEvent::HitTestSourceFailed { session, error }) => {
                self.hit_tester.on_source_failed(session, &error);
            }
            FrameEvent::Xr(XrEvent::SessionEnded { session }) => {
                if self.session_id() == Some(session) {
                    self.end_session();
                } else {
                    debug!("ignoring end of stale {session}");
                }
            }
            FrameEvent::Asset(loaded) => {
                if self.on_asset_loaded(loaded) {
                    report.spawned += 1;
                }
            }
            FrameEvent::Select => {
                if let Some(request) = self.spawner.roll(self.reticle.placement()) {
                    let model = request.model.clone();
                    self.assets.request(&model, LoadPurpose::Spawn(request));
                    report.spawn_requests += 1;
                }
            }
            FrameEvent::Resized { width, height } => {
                self.uniforms.set_resolution(width, height);
                camera.set_viewport(width, height);
            }
        }
    }

    /// Returns true when a spawned object entered the scene.
    fn on_asset_loaded(&mut self, loaded: LoadedAsset) -> bool {
        let model = match loaded.result {
            Ok(model) => model,
            Err(err) => {
                warn!("{} unavailable, continuing without it: {err}", loaded.id);
                return false;
            }
        };

        match loaded.purpose {
            LoadPurpose::Skybox => {
                self.nodes.skybox = Some(self.scene.instantiate(&model, None));
                false
            }
            LoadPurpose::Gate => {
                self.gate_template = Some(model);
                self.place_gate();
                false
            }
            LoadPurpose::Spawn(request) => {
                let template = model.with_transform(request.transform());
                self.scene.instantiate(&template, None);
                true
            }
        }
    }

    fn update_hit_test(&mut self, camera_world: &Mat4) -> HitTestOutcome {
        let Some(session) = self.session.as_deref_mut() else {
            self.reticle.apply(&HitTestOutcome::Unavailable);
            return HitTestOutcome::Unavailable;
        };

        self.hit_tester.ensure_requested(session, &self.xr_sender);
        session.begin_frame(camera_world);
        let outcome = self.hit_tester.poll(session);
        self.reticle.apply(&outcome);
        outcome
    }

    fn try_generate_portal(&mut self, outcome: &HitTestOutcome, camera_position: Vec3) -> bool {
        let portal = &self.settings.portal;
        let placement = match (portal.anchor_mode, outcome) {
            (AnchorMode::FirstHit, HitTestOutcome::Anchor(pose)) => {
                Some(PortalPlacement::SurfaceHit {
                    pose: *pose,
                    camera_position,
                })
            }
            (AnchorMode::FirstHit, HitTestOutcome::Pending | HitTestOutcome::NoAnchor)
                if self.frames_waiting_for_hit < portal.hit_timeout_frames =>
            {
                self.frames_waiting_for_hit += 1;
                None
            }
            _ => self.initial_camera.map(|camera_world| PortalPlacement::CameraOffset {
                camera_world,
                offset: portal.fallback_offset(),
            }),
        };
        let Some(placement) = placement else {
            return false;
        };

        let anchor = generate_portal(placement, portal.uniform_scale);
        self.detector = Some(CrossingDetector::for_anchor(
            &anchor,
            &self.settings.zones,
            self.settings.probe,
        ));

        let membrane = self.scene.add_mesh(Arc::new(disc(PORTAL_BASE_RADIUS, 64)));
        self.nodes.membrane = Some(self.scene.add_mesh_node(
            "portal",
            anchor.transform(),
            membrane,
            Material::pass_through(),
            None,
        ));
        self.anchor = Some(anchor);
        self.place_gate();
        true
    }

    /// Instantiates the gate once both the model and the anchor exist.
    fn place_gate(&mut self) {
        if self.nodes.gate.is_some() {
            return;
        }
        let Some(anchor) = self.anchor.as_ref() else {
            return;
        };
        let Some(template) = self.gate_template.take() else {
            return;
        };

        let gate = self
            .scene
            .instantiate(&template.with_transform(anchor.transform()), None);
        self.nodes.gate = Some(gate);
        self.nodes.gate_inner = self
            .scene
            .get(gate)
            .and_then(|node| node.children().get(1).copied());
    }

    fn animate(&mut self) {
        let time = self.uniforms.time;

        if let (Some(anchor), Some(membrane)) = (self.anchor.as_ref(), self.nodes.membrane) {
            let transform = membrane_transform(
                anchor.transform(),
                time,
                self.settings.render.membrane_breathing,
            );
            self.scene.set_transform(membrane, transform);
        }

        let Some(gate) = self.nodes.gate.filter(|_| self.assets.required_settled()) else {
            return;
        };
        self.scene.walk_mut(gate, &mut GlowVisitor::new(gate_glow(time)));
        if let Some(inner) = self.nodes.gate_inner {
            if let Some(node) = self.scene.get_mut(inner) {
                node.transform.rotation = inner_ring_spin(time);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use glam::Vec3;
    use riftgate_shared::material::{ShaderKind, StencilFunc};
    use riftgate_shared::scene::ModelNode;

    use super::{FrameDriver, FrameEvent, FrameSink, RenderFrame};
    use crate::assets::{AssetError, AssetLoader, AssetSource, ProceduralAssets};
    use crate::camera::Camera;
    use crate::portal::{AnchorSource, DirectionalMemory, RenderMode};
    use crate::settings::{AnchorMode, RiftgateSettings};
    use crate::switcher::PortalBinding;
    use crate::xr::{
        HitTestOutcome, HitTestSource, ReferenceSpace, ReferenceSpaceKind, SimulatedArSession,
        XrEvent,
    };

    #[derive(Debug, Clone, Copy, PartialEq)]
    struct FrameSnapshot {
        binding: Option<PortalBinding>,
        bound_portal_materials: usize,
        skybox_stencil: Option<StencilFunc>,
        skybox_draws: usize,
        mode: RenderMode,
        time: f32,
    }

    #[derive(Default)]
    struct RecordingSink {
        frames: Vec<FrameSnapshot>,
    }

    impl FrameSink for RecordingSink {
        fn submit(&mut self, frame: &RenderFrame<'_>) {
            let draws = frame.scene.draw_list();
            let masks = draws.iter().filter(|draw| draw.material.writes_stencil()).count();
            let pass_through = draws
                .iter()
                .filter(|draw| draw.material.shader == ShaderKind::PassThrough)
                .count();
            let binding = match (masks, pass_through) {
                (1, 0) => Some(PortalBinding::Mask),
                (0, 1) => Some(PortalBinding::PassThrough),
                _ => None,
            };
            let skybox: Vec<_> = draws
                .iter()
                .filter(|draw| {
                    !draw.material.writes_stencil()
                        && draw.material.shader != ShaderKind::PassThrough
                })
                .filter(|draw| draw.material.stencil.is_some())
                .collect();
            self.frames.push(FrameSnapshot {
                binding,
                bound_portal_materials: masks + pass_through,
                skybox_stencil: skybox
                    .first()
                    .and_then(|draw| draw.material.stencil)
                    .map(|stencil| stencil.func),
                skybox_draws: skybox.len(),
                mode: frame.mode,
                time: frame.uniforms.time,
            });
        }
    }

    struct FailingSource;

    impl AssetSource for FailingSource {
        fn load(&self, id: &str) -> Result<ModelNode, AssetError> {
            Err(AssetError::UnknownAsset(id.to_string()))
        }
    }

    fn driver_with(settings: RiftgateSettings) -> FrameDriver {
        FrameDriver::new(settings, AssetLoader::inline(Arc::new(ProceduralAssets)), 11)
    }

    fn offset_settings() -> RiftgateSettings {
        let mut settings = RiftgateSettings::default();
        settings.portal.anchor_mode = AnchorMode::CameraOffset;
        settings
    }

    fn looking_at_floor() -> Camera {
        let mut camera = Camera::default();
        camera.pitch = -0.7;
        camera
    }

    fn attach_simulated(driver: &mut FrameDriver) {
        let id = driver.next_session_id();
        let session = SimulatedArSession::new(id, &driver.settings().simulator);
        driver.start_session(Box::new(session));
    }

    #[test]
    fn walking_through_the_portal_switches_to_the_virtual_world() {
        let mut driver = driver_with(offset_settings());
        let mut sink = RecordingSink::default();
        let mut camera = Camera::default();

        let report = driver.tick(&mut camera, &mut sink);
        assert!(report.assets_ready);
        assert!(driver.nodes.gate.is_some());
        let anchor = *driver.anchor().expect("portal generated on first tick");
        assert_eq!(anchor.source(), AnchorSource::CameraOffset);
        assert!(anchor.position().abs_diff_eq(Vec3::new(0.0, 1.6, -0.3), 1.0e-4));

        for _ in 0..150 {
            camera.position.z -= 0.02;
            driver.tick(&mut camera, &mut sink);
        }

        let first = sink.frames[1];
        assert_eq!(first.binding, Some(PortalBinding::Mask));
        assert_eq!(first.skybox_stencil, Some(StencilFunc::Equal));
        assert_eq!(first.mode, RenderMode::new(false, true));

        let last = *sink.frames.last().expect("frames");
        assert_eq!(last.mode, RenderMode::new(true, false));
        assert_eq!(last.binding, Some(PortalBinding::PassThrough));
        assert_eq!(last.skybox_draws, 0);
        assert_eq!(driver.context().memory(), DirectionalMemory::new(true, true));
    }

    #[test]
    fn exactly_one_portal_material_every_tick() {
        let mut driver = driver_with(offset_settings());
        let mut sink = RecordingSink::default();
        let mut camera = Camera::default();

        for step in 0..300 {
            let phase = step as f32 * 0.04;
            camera.position.z = -0.3 + phase.sin() * 1.4;
            driver.tick(&mut camera, &mut sink);
        }

        for (index, frame) in sink.frames.iter().enumerate() {
            assert_eq!(frame.bound_portal_materials, 1, "frame {index}");
            let expected = if frame.mode.portal_front_material_active() {
                PortalBinding::Mask
            } else {
                PortalBinding::PassThrough
            };
            assert_eq!(frame.binding, Some(expected), "frame {index}");
        }
    }

    #[test]
    fn uniform_time_advances_by_fixed_step() {
        let mut driver = driver_with(offset_settings());
        let mut sink = RecordingSink::default();
        let mut camera = Camera::default();
        for _ in 0..50 {
            driver.tick(&mut camera, &mut sink);
        }
        assert!((sink.frames[49].time - 0.5).abs() < 1.0e-4);
    }

    #[test]
    fn first_hit_places_portal_on_the_floor() {
        let mut driver = driver_with(RiftgateSettings::default());
        attach_simulated(&mut driver);
        let mut sink = RecordingSink::default();
        let mut camera = looking_at_floor();

        for _ in 0..10 {
            driver.tick(&mut camera, &mut sink);
            if driver.anchor().is_some() {
                break;
            }
        }

        let anchor = driver.anchor().expect("anchored from hit");
        assert_eq!(anchor.source(), AnchorSource::SurfaceHit);
        assert!((anchor.position().y - anchor.radius()).abs() < 1.0e-4);
        assert!(anchor.signed_distance(camera.position) > 0.0);
    }

    #[test]
    fn missing_hit_testing_falls_back_to_camera_offset() {
        let mut settings = RiftgateSettings::default();
        settings.simulator.hit_test_supported = false;
        let mut driver = driver_with(settings);
        attach_simulated(&mut driver);
        let mut sink = RecordingSink::default();
        let mut camera = looking_at_floor();

        let report = driver.tick(&mut camera, &mut sink);
        assert!(report.portal_generated);
        assert_eq!(
            driver.anchor().map(|anchor| anchor.source()),
            Some(AnchorSource::CameraOffset)
        );
        assert!(!driver.reticle().is_visible());
    }

    #[test]
    fn no_hits_before_timeout_falls_back_to_camera_offset() {
        let mut settings = RiftgateSettings::default();
        settings.portal.hit_timeout_frames = 5;
        let mut driver = driver_with(settings);
        attach_simulated(&mut driver);
        let mut sink = RecordingSink::default();
        let mut camera = Camera::default();

        let mut generated_at = None;
        for _ in 0..20 {
            let report = driver.tick(&mut camera, &mut sink);
            if report.portal_generated {
                generated_at = Some(report.frame);
            }
        }

        assert_eq!(generated_at, Some(6));
        assert_eq!(
            driver.anchor().map(|anchor| anchor.source()),
            Some(AnchorSource::CameraOffset)
        );
    }

    #[test]
    fn reticle_hides_on_the_next_tick_after_hits_stop() {
        let mut driver = driver_with(offset_settings());
        attach_simulated(&mut driver);
        let mut sink = RecordingSink::default();
        let mut camera = looking_at_floor();

        for _ in 0..10 {
            driver.tick(&mut camera, &mut sink);
        }
        assert!(driver.reticle().is_visible());

        camera.pitch = 0.3;
        driver.tick(&mut camera, &mut sink);
        assert!(!driver.reticle().is_visible());
    }

    #[test]
    fn select_spawns_at_reticle_once_model_arrives() {
        let mut driver = driver_with(offset_settings());
        attach_simulated(&mut driver);
        let mut sink = RecordingSink::default();
        let mut camera = looking_at_floor();
        for _ in 0..10 {
            driver.tick(&mut camera, &mut sink);
        }
        let before = driver.scene().node_count();

        driver.sender().send(FrameEvent::Select).expect("queue select");
        let requested = driver.tick(&mut camera, &mut sink);
        assert_eq!(requested.spawn_requests, 1);

        let arrived = driver.tick(&mut camera, &mut sink);
        assert_eq!(arrived.spawned, 1);
        assert!(driver.scene().node_count() > before);
    }

    #[test]
    fn select_without_reticle_does_nothing() {
        let mut driver = driver_with(offset_settings());
        let mut sink = RecordingSink::default();
        let mut camera = Camera::default();

        driver.sender().send(FrameEvent::Select).expect("queue select");
        let report = driver.tick(&mut camera, &mut sink);
        assert_eq!(report.spawn_requests, 0);
    }

    #[test]
    fn stale_source_after_session_restart_is_ignored() {
        let mut driver = driver_with(offset_settings());
        attach_simulated(&mut driver);
        let mut sink = RecordingSink::default();
        let mut camera = looking_at_floor();
        let first = driver.session_id().expect("session");
        driver.tick(&mut camera, &mut sink);

        driver.end_session();
        assert!(driver.session_id().is_none());
        assert!(!driver.reticle().is_visible());

        attach_simulated(&mut driver);
        assert_ne!(driver.session_id(), Some(first));
        let stale = HitTestSource {
            session: first,
            id: 99,
            space: ReferenceSpace {
                session: first,
                kind: ReferenceSpaceKind::Viewer,
            },
        };
        driver
            .xr_sender
            .send(XrEvent::HitTestSourceReady {
                session: first,
                source: stale,
            })
            .expect("queue stale source");
        driver.tick(&mut camera, &mut sink);

        assert!(driver.hit_tester.source().is_none());
        assert!(!driver.reticle().is_visible());
    }

    #[test]
    fn ending_mid_request_ignores_the_late_source() {
        let mut driver = driver_with(RiftgateSettings::default());
        attach_simulated(&mut driver);
        let mut sink = RecordingSink::default();
        let mut camera = looking_at_floor();
        let ended = driver.session_id().expect("session");

        let first = driver.tick(&mut camera, &mut sink);
        assert_eq!(first.hit_test, Some(HitTestOutcome::Pending));
        assert!(driver.anchor().is_none());

        driver.end_session();
        let late = HitTestSource {
            session: ended,
            id: 1,
            space: ReferenceSpace {
                session: ended,
                kind: ReferenceSpaceKind::Viewer,
            },
        };
        driver
            .xr_sender
            .send(XrEvent::HitTestSourceReady {
                session: ended,
                source: late,
            })
            .expect("queue late source");

        for _ in 0..5 {
            let report = driver.tick(&mut camera, &mut sink);
            assert_eq!(report.hit_test, Some(HitTestOutcome::Unavailable));
            assert!(driver.hit_tester.source().is_none());
            assert!(!driver.reticle().is_visible());
        }
        assert_eq!(
            driver.anchor().map(|anchor| anchor.source()),
            Some(AnchorSource::CameraOffset)
        );
    }

    #[test]
    fn session_ended_event_detaches_the_current_session() {
        let mut driver = driver_with(offset_settings());
        attach_simulated(&mut driver);
        let mut sink = RecordingSink::default();
        let mut camera = looking_at_floor();
        for _ in 0..10 {
            driver.tick(&mut camera, &mut sink);
        }
        assert!(driver.reticle().is_visible());

        let current = driver.session_id().expect("session");
        driver
            .xr_sender
            .send(XrEvent::SessionEnded { session: current })
            .expect("queue end");
        driver.tick(&mut camera, &mut sink);

        assert!(driver.session_id().is_none());
        assert!(!driver.hit_tester.is_requested());
        assert!(!driver.reticle().is_visible());
    }

    #[test]
    fn resize_updates_resolution_and_aspect() {
        let mut driver = driver_with(offset_settings());
        let mut sink = RecordingSink::default();
        let mut camera = Camera::default();

        driver
            .sender()
            .send(FrameEvent::Resized {
                width: 1000,
                height: 500,
            })
            .expect("queue resize");
        driver.tick(&mut camera, &mut sink);

        assert_eq!(driver.uniforms().resolution, glam::Vec2::new(1000.0, 500.0));
        assert!((camera.aspect - 2.0).abs() < 1.0e-6);
    }

    #[test]
    fn failed_assets_leave_the_portal_logic_running() {
        let assets = AssetLoader::inline(Arc::new(FailingSource));
        let mut driver = FrameDriver::new(offset_settings(), assets, 3);
        let mut sink = RecordingSink::default();
        let mut camera = Camera::default();

        for _ in 0..80 {
            camera.position.z -= 0.03;
            driver.tick(&mut camera, &mut sink);
        }

        let last = sink.frames.last().expect("frames");
        assert!(driver.assets.required_settled());
        assert_eq!(driver.assets.failed(), 2);
        assert_eq!(last.skybox_draws, 0);
        assert_eq!(last.mode, RenderMode::new(true, false));
        assert_eq!(last.bound_portal_materials, 1);
    }
}
