use std::fmt;

use glam::{Mat4, Vec3};
use riftgate_core::events::EventSender;
use riftgate_shared::geometry::{ray_plane, Ray};
use tracing::{debug, info, warn};

use crate::settings::SimulatorSettings;

/// Generation tag of an AR session. Results carrying an older tag are stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u32);

impl SessionId {
    pub const FIRST: SessionId = SessionId(1);

    pub fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceSpaceKind {
    Viewer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceSpace {
    pub session: SessionId,
    pub kind: ReferenceSpaceKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HitTestSource {
    pub session: SessionId,
    pub id: u32,
    pub space: ReferenceSpace,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HitTestResult {
    pub pose: Mat4,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HitTestError {
    Unsupported,
    SessionEnded(SessionId),
    Denied(String),
}

impl fmt::Display for HitTestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported => write!(f, "surface hit testing is not supported"),
            Self::SessionEnded(session) => write!(f, "{session} ended before the request resolved"),
            Self::Denied(reason) => write!(f, "hit test request denied: {reason}"),
        }
    }
}

impl std::error::Error for HitTestError {}

/// Completions delivered from the AR runtime into the frame tick.
#[derive(Debug, Clone, PartialEq)]
pub enum XrEvent {
    HitTestSourceReady {
        session: SessionId,
        source: HitTestSource,
    },
    HitTestSourceFailed {
        session: SessionId,
        error: HitTestError,
    },
    SessionEnded {
        session: SessionId,
    },
}

/// The AR device surface the frame loop talks to.
pub trait ArSession {
    fn session_id(&self) -> SessionId;

    fn is_active(&self) -> bool;

    fn request_reference_space(
        &mut self,
        kind: ReferenceSpaceKind,
    ) -> Result<ReferenceSpace, HitTestError>;

    /// Resolves later through `completion`.
    fn request_hit_test_source(
        &mut self,
        space: ReferenceSpace,
        completion: EventSender<XrEvent>,
    ) -> Result<(), HitTestError>;

    /// Called once per frame with the viewer's world pose.
    fn begin_frame(&mut self, viewer: &Mat4);

    fn hit_test_results(&self, source: &HitTestSource) -> Vec<HitTestResult>;

    /// Fails any pending source request and reports `SessionEnded`.
    fn end(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HitTestOutcome {
    /// No source yet; the frame skips hit testing.
    Pending,
    /// Hit testing failed for this session.
    Unavailable,
    NoAnchor,
    Anchor(Mat4),
}

/// Requests one hit-test source per session and reports the first hit each
/// frame.
#[derive(Debug, Default)]
pub struct SurfaceHitTester {
    requested: bool,
    session: Option<SessionId>,
    source: Option<HitTestSource>,
    unavailable: bool,
}

impl SurfaceHitTester {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_requested(&self) -> bool {
        self.requested
    }

    pub fn source(&self) -> Option<&HitTestSource> {
        self.source.as_ref()
    }

    pub fn is_unavailable(&self) -> bool {
        self.unavailable
    }

    pub fn ensure_requested(
        &mut self,
        session: &mut dyn ArSession,
        completion: &EventSender<XrEvent>,
    ) {
        let session_id = session.session_id();
        if self.requested && self.session == Some(session_id) {
            return;
        }
        if !session.is_active() {
            return;
        }

        self.requested = true;
        self.session = Some(session_id);
        self.source = None;
        self.unavailable = false;

        let request = session
            .request_reference_space(ReferenceSpaceKind::Viewer)
            .and_then(|space| session.request_hit_test_source(space, completion.clone()));
        match request {
            Ok(()) => info!("{session_id}: hit test source requested"),
            Err(err) => {
                warn!("{session_id}: {err}; portal will use the camera offset");
                self.unavailable = true;
            }
        }
    }

    /// Returns false when the source belongs to another session.
    pub fn on_source_ready(&mut self, session: SessionId, source: HitTestSource) -> bool {
        if self.session != Some(session) || source.session != session {
            debug!("ignoring hit test source from stale {session}");
            return false;
        }
        info!("{session}: hit test source ready");
        self.source = Some(source);
        true
    }

    pub fn on_source_failed(&mut self, session: SessionId, error: &HitTestError) -> bool {
        if self.session != Some(session) {
            debug!("ignoring hit test failure from stale {session}");
            return false;
        }
        warn!("{session}: {error}");
        self.unavailable = true;
        true
    }

    pub fn on_session_ended(&mut self, session: SessionId) {
        if self.session.is_some_and(|current| current != session) {
            return;
        }
        self.requested = false;
        self.source = None;
        self.session = None;
        self.unavailable = false;
        info!("{session}: ended, hit test source cleared");
    }

    pub fn poll(&self, session: &dyn ArSession) -> HitTestOutcome {
        if self.unavailable {
            return HitTestOutcome::Unavailable;
        }
        let Some(source) = self.source.as_ref() else {
            return HitTestOutcome::Pending;
        };
        if source.session != session.session_id() {
            return HitTestOutcome::Pending;
        }

        match session.hit_test_results(source).first() {
            Some(hit) => HitTestOutcome::Anchor(hit.pose),
            None => HitTestOutcome::NoAnchor,
        }
    }
}

struct PendingSource {
    frames_left: u32,
    source: HitTestSource,
    completion: EventSender<XrEvent>,
}

/// Desktop stand-in for an AR runtime: a horizontal floor plane hit along the
/// viewer's forward ray, with hit-test sources that resolve a few frames
/// after being requested.
pub struct SimulatedArSession {
    id: SessionId,
    active: bool,
    supported: bool,
    floor_height: f32,
    max_hit_distance: f32,
    latency_frames: u32,
    viewer: Mat4,
    next_source_id: u32,
    pending: Option<PendingSource>,
    live_sources: Vec<u32>,
    /// Lifecycle events go to the queue of the latest source request.
    events: Option<EventSender<XrEvent>>,
}

impl SimulatedArSession {
    pub fn new(id: SessionId, settings: &SimulatorSettings) -> Self {
        info!("{id}: simulated AR session started");
        Self {
            id,
            active: true,
            supported: settings.hit_test_supported,
            floor_height: settings.floor_height,
            max_hit_distance: settings.max_hit_distance,
            latency_frames: settings.source_latency_frames,
            viewer: Mat4::IDENTITY,
            next_source_id: 1,
            pending: None,
            live_sources: Vec::new(),
            events: None,
        }
    }
}

impl ArSession for SimulatedArSession {
    fn session_id(&self) -> SessionId {
        self.id
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn request_reference_space(
        &mut self,
        kind: ReferenceSpaceKind,
    ) -> Result<ReferenceSpace, HitTestError> {
        if !self.active {
            return Err(HitTestError::SessionEnded(self.id));
        }
        Ok(ReferenceSpace {
            session: self.id,
            kind,
        })
    }

    fn request_hit_test_source(
        &mut self,
        space: ReferenceSpace,
        completion: EventSender<XrEvent>,
    ) -> Result<(), HitTestError> {
        if !self.active || space.session != self.id {
            return Err(HitTestError::SessionEnded(space.session));
        }
        if !self.supported {
            return Err(HitTestError::Unsupported);
        }

        let source = HitTestSource {
            session: self.id,
            id: self.next_source_id,
            space,
        };
        self.next_source_id += 1;
        self.events = Some(completion.clone());
        self.pending = Some(PendingSource {
            frames_left: self.latency_frames,
            source,
            completion,
        });
        Ok(())
    }

    fn begin_frame(&mut self, viewer: &Mat4) {
        self.viewer = *viewer;
        let Some(pending) = self.pending.as_mut() else {
            return;
        };
        if pending.frames_left > 0 {
            pending.frames_left -= 1;
            return;
        }

        if let Some(pending) = self.pending.take() {
            self.live_sources.push(pending.source.id);
            pending.completion.send_or_drop(XrEvent::HitTestSourceReady {
                session: self.id,
                source: pending.source,
            });
        }
    }

    fn hit_test_results(&self, source: &HitTestSource) -> Vec<HitTestResult> {
        if !self.active || source.session != self.id || !self.live_sources.contains(&source.id) {
            return Vec::new();
        }

        let origin = self.viewer.transform_point3(Vec3::ZERO);
        let forward = self.viewer.transform_vector3(Vec3::NEG_Z);
        let ray = Ray::new(origin, forward);
        let floor = Vec3::new(0.0, self.floor_height, 0.0);
        let Some(t) = ray_plane(&ray, floor, Vec3::Y) else {
            return Vec::new();
        };
        if t * forward.length() > self.max_hit_distance {
            return Vec::new();
        }

        vec![HitTestResult {
            pose: Mat4::from_translation(ray.at(t)),
        }]
    }

    fn end(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(pending) = self.pending.take() {
            pending.completion.send_or_drop(XrEvent::HitTestSourceFailed {
                session: self.id,
                error: HitTestError::SessionEnded(self.id),
            });
        }
        self.live_sources.clear();
        if let Some(events) = self.events.take() {
            events.send_or_drop(XrEvent::SessionEnded { session: self.id });
        }
        info!("{}: simulated AR session ended", self.id);
    }
}
