use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use glam::{Vec2, Vec3};
use riftgate_core::events::EventSender;
use riftgate_core::jobs::JobSystem;
use tracing::{error, info, warn};
use winit::application::ApplicationHandler;
use winit::event::{DeviceEvent, ElementState, MouseButton, WindowEvent};
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{CursorGrabMode, Window, WindowId};

use crate::assets::{AssetLoader, ProceduralAssets};
use crate::camera::Camera;
use crate::frame::{FrameDriver, FrameEvent};
use crate::input::InputState;
use crate::renderer::Renderer;
use crate::settings::RiftgateSettings;
use crate::xr::SimulatedArSession;

const MAX_FRAME_DELTA: f32 = 0.1;

struct RiftgateApp {
    settings: RiftgateSettings,
    window: Option<Arc<Window>>,
    renderer: Option<Renderer>,
    driver: FrameDriver,
    frame_events: EventSender<FrameEvent>,
    camera: Camera,
    input: InputState,
    cursor_grabbed: bool,
    last_frame: Option<Instant>,
    last_world_active: bool,
}

impl RiftgateApp {
    fn new(settings: RiftgateSettings, seed: u64) -> Self {
        let jobs = match JobSystem::for_loading() {
            Ok(jobs) => Some(jobs),
            Err(err) => {
                warn!("asset job pool unavailable, loading inline: {err}");
                None
            }
        };
        let assets = AssetLoader::new(Arc::new(ProceduralAssets), jobs);
        let driver = FrameDriver::new(settings.clone(), assets, seed);
        let frame_events = driver.sender();
        let camera = Camera::at(Vec3::from_array(settings.simulator.start_position));

        Self {
            settings,
            window: None,
            renderer: None,
            driver,
            frame_events,
            camera,
            input: InputState::default(),
            cursor_grabbed: false,
            last_frame: None,
            last_world_active: false,
        }
    }

    fn start_simulated_session(&mut self) {
        let id = self.driver.next_session_id();
        let session = SimulatedArSession::new(id, &self.settings.simulator);
        self.driver.start_session(Box::new(session));
    }

    fn set_cursor_grab(&mut self, enabled: bool) {
        let Some(window) = self.window.as_ref() else {
            self.cursor_grabbed = false;
            return;
        };

        let grabbed = if enabled {
            window
                .set_cursor_grab(CursorGrabMode::Locked)
                .or_else(|_| window.set_cursor_grab(CursorGrabMode::Confined))
                .is_ok()
        } else {
            let _ = window.set_cursor_grab(CursorGrabMode::None);
            false
        };

        if !enabled {
            self.input.left_click = false;
        }
        window.set_cursor_visible(!grabbed);
        self.cursor_grabbed = grabbed;
    }

    fn handle_key(&mut self, code: KeyCode, state: ElementState) {
        match state {
            ElementState::Pressed => self.input.press_key(code),
            ElementState::Released => {
                self.input.release_key(code);
                return;
            }
        }

        match code {
            KeyCode::Escape => self.set_cursor_grab(false),
            KeyCode::KeyR => {
                info!("restarting AR session");
                self.start_simulated_session();
            }
            KeyCode::KeyX => {
                info!("ending AR session");
                self.driver.end_session();
            }
            _ => {}
        }
    }

    fn update_camera(&mut self, dt: f32) {
        self.camera
            .update_look(&self.input, self.settings.simulator.look_sensitivity);

        let mut motion = self.camera.horizontal_movement_dir(&self.input);
        if self.input.is_pressed(KeyCode::Space) {
            motion.y += 1.0;
        }
        if self.input.is_pressed(KeyCode::ShiftLeft) {
            motion.y -= 1.0;
        }
        self.camera.position += motion * self.settings.simulator.move_speed * dt;
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let now = Instant::now();
        let dt = self
            .last_frame
            .map(|last| now.duration_since(last).as_secs_f32())
            .unwrap_or(0.0)
            .min(MAX_FRAME_DELTA);
        self.last_frame = Some(now);

        self.update_camera(dt);
        if self.input.consume_select() {
            self.frame_events.send_or_drop(FrameEvent::Select);
        }

        let (Some(window), Some(renderer)) = (self.window.as_ref(), self.renderer.as_mut()) else {
            return;
        };
        self.driver.tick(&mut self.camera, renderer);
        self.input.clear_frame();

        let world_active = self.driver.context().mode().world_material_active();
        if world_active != self.last_world_active {
            self.last_world_active = world_active;
            window.set_title(if world_active {
                "Riftgate - virtual world"
            } else {
                "Riftgate"
            });
        }

        let size = window.inner_size();
        match renderer.take_surface_error() {
            None => {}
            Some(wgpu::SurfaceError::Outdated | wgpu::SurfaceError::Lost) => {
                renderer.resize(size.width, size.height);
            }
            Some(wgpu::SurfaceError::OutOfMemory) => {
                error!("Out of GPU memory; shutting down event loop");
                event_loop.exit();
            }
            Some(wgpu::SurfaceError::Timeout | wgpu::SurfaceError::Other) => {}
        }
    }
}

impl ApplicationHandler for RiftgateApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let attrs = Window::default_attributes().with_title("Riftgate");
        match event_loop.create_window(attrs) {
            Ok(window) => {
                let window = Arc::new(window);
                match Renderer::new(window.clone()) {
                    Ok(renderer) => {
                        let size = window.inner_size();
                        self.frame_events.send_or_drop(FrameEvent::Resized {
                            width: size.width,
                            height: size.height,
                        });
                        info!("window and renderer initialized");
                        self.window = Some(window);
                        self.renderer = Some(renderer);
                        self.last_frame = Some(Instant::now());
                        self.start_simulated_session();
                    }
                    Err(err) => {
                        error!("failed to initialize renderer: {err}");
                        event_loop.exit();
                    }
                }
            }
            Err(err) => {
                error!("failed to create window: {err}");
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        event: WindowEvent,
    ) {
        if self.window.as_ref().map(|window| window.id()) != Some(window_id) {
            return;
        }

        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested; ending session");
                self.driver.end_session();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.resize(size.width, size.height);
                }
                self.frame_events.send_or_drop(FrameEvent::Resized {
                    width: size.width,
                    height: size.height,
                });
            }
            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(code) = event.physical_key else {
                    return;
                };
                self.handle_key(code, event.state);
            }
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } => {
                if self.cursor_grabbed {
                    self.input.left_click = true;
                } else {
                    self.set_cursor_grab(true);
                }
            }
            WindowEvent::Focused(false) => self.set_cursor_grab(false),
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn device_event(
        &mut self,
        _event_loop: &ActiveEventLoop,
        _device_id: winit::event::DeviceId,
        event: DeviceEvent,
    ) {
        if !self.cursor_grabbed {
            return;
        }

        if let DeviceEvent::MouseMotion { delta } = event {
            self.input
                .add_mouse_delta(Vec2::new(delta.0 as f32, delta.1 as f32));
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}

pub fn random_seed() -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_nanos() as u64)
        .unwrap_or(0);
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    now.hash(&mut hasher);
    std::process::id().hash(&mut hasher);
    hasher.finish()
}

pub fn run(settings: RiftgateSettings, seed: u64) {
    let _ = tracing_subscriber::fmt().with_target(false).try_init();
    info!("Riftgate starting (spawn seed {seed:#x})");

    let event_loop = match EventLoop::new() {
        Ok(loop_handle) => loop_handle,
        Err(err) => {
            eprintln!("Failed to create event loop: {err}");
            return;
        }
    };

    let mut app = RiftgateApp::new(settings, seed);
    if let Err(err) = event_loop.run_app(&mut app) {
        eprintln!("Event loop exited with error: {err}");
    }
}
