// =============================================================================
// VISOR DEMO - a handful of cubes and a fly-through camera
// =============================================================================
//
// CONTROLS:
//   W/S A/D Q/E   move forward/back, left/right, down/up
//   right drag    look around
//   left click    pick the entity under the crosshair and spin it
//   N             spawn a cube in front of the camera
//   Delete        remove the last picked entity
//   Esc           quit
//
// FRAME FLOW:
// 1. winit delivers window events; input state is updated
// 2. On redraw: advance the camera from input, render, present
// 3. Any render error ends the loop after the renderer has been torn down
//
// =============================================================================

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Instant;
use visor::backend::{EntityKey, Renderer};
use visor::config::Config;
use visor::input::InputState;
use visor::math::Vector3;
use visor::scene::{Camera, Entity, Mesh};
use visor::window::AppWindow;
use winit::{
    application::ApplicationHandler,
    event::{ElementState, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
};

const VERTEX_SHADER: &str = "shaders/mesh.vert.spv";
const FRAGMENT_SHADER: &str = "shaders/mesh.frag.spv";

/// Keeps the camera from flipping over the poles.
const PITCH_LIMIT: f32 = std::f32::consts::FRAC_PI_2 - 0.01;

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    // Load configuration from config.toml
    let (config, load_error) = Config::load();

    init_logging(&config);
    if let Some(e) = load_error {
        log::warn!("Failed to load config.toml: {:#}. Using defaults.", e);
    }
    log::info!("Starting visor");
    log::info!(
        "Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        config.window.title
    );

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    match app.failure.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// `RUST_LOG` wins over the configured level.
fn init_logging(config: &Config) {
    use env_logger::Builder;

    let mut builder = Builder::new();
    builder.filter_level(config.debug.level_filter());
    builder.parse_default_env();
    builder.init();
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

struct App {
    config: Config,

    // Renderer before window: it must be gone before the surface's window is
    renderer: Option<Renderer>,
    window: Option<AppWindow>,

    camera: Camera,
    input: InputState,
    mesh: Arc<Mesh>,
    scene: Vec<(EntityKey, Entity)>,
    picked: Option<EntityKey>,

    last_tick: Instant,
    frames: u64,
    failure: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config) -> Self {
        let mut camera = Camera::new(config.camera.fov, Vector3::ZERO);
        // Start facing the first cube; the origin is never the target
        let _ = camera.look_at(Vector3::new(0.0, 0.0, 3.0));

        Self {
            config,
            renderer: None,
            window: None,
            camera,
            input: InputState::new(),
            mesh: Arc::new(Mesh::cube(VERTEX_SHADER, FRAGMENT_SHADER)),
            scene: Vec::new(),
            picked: None,
            last_tick: Instant::now(),
            frames: 0,
            failure: None,
        }
    }

    fn initial_entities(&self) -> Vec<Entity> {
        vec![
            Entity::new(Vector3::new(0.0, 0.0, 3.0), self.mesh.clone()),
            Entity::new(Vector3::new(-2.5, 0.5, 6.0), self.mesh.clone()).with_orientation(0.6, 0.3, 0.0),
            Entity::new(Vector3::new(2.5, -0.5, 5.0), self.mesh.clone())
                .with_scale(Vector3::new(1.0, 2.0, 1.0))
                .with_orientation(-0.4, 0.0, 0.2),
            Entity::new(Vector3::new(0.0, -2.0, 8.0), self.mesh.clone()).with_scale(Vector3::new(6.0, 0.2, 6.0)),
        ]
    }

    fn init_renderer(&mut self, window: &AppWindow) -> Result<()> {
        let validation = self.config.debug.validation_layers && cfg!(debug_assertions);
        let entities = self.initial_entities();

        let (renderer, keys) = Renderer::with_entities(window, &self.config.graphics, validation, &entities)
            .context("Failed to start renderer")?;

        self.scene = keys.into_iter().zip(entities).collect();
        self.renderer = Some(renderer);
        Ok(())
    }

    /// Tear down GPU state, remember why, and leave the event loop.
    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("{:#}", error);
        self.renderer = None;
        self.failure = Some(error);
        event_loop.exit();
    }

    // =========================================================================
    // PER-FRAME UPDATE
    // =========================================================================

    fn update_camera(&mut self, dt: f32) {
        let settings = &self.config.camera;
        let input = &self.input;

        let movement = self.camera.forward() * input.axis(KeyCode::KeyS, KeyCode::KeyW)
            + self.camera.right() * input.axis(KeyCode::KeyA, KeyCode::KeyD)
            + Vector3::Y * input.axis(KeyCode::KeyQ, KeyCode::KeyE);
        self.camera.position += movement * settings.move_speed * dt;

        if input.is_button_pressed(MouseButton::Right) {
            let (dx, dy) = input.mouse_delta();
            self.camera.yaw -= dx * settings.mouse_sensitivity;
            self.camera.pitch = (self.camera.pitch - dy * settings.mouse_sensitivity).clamp(-PITCH_LIMIT, PITCH_LIMIT);
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let now = Instant::now();
        let dt = now.duration_since(self.last_tick).as_secs_f32();
        self.last_tick = now;

        self.update_camera(dt);
        self.input.begin_tick();

        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };

        match renderer.render(&self.camera) {
            Ok(()) => {
                self.frames += 1;
                if self.frames % 600 == 0 {
                    log::debug!("{} frames, {:.2} ms last frame", self.frames, dt * 1000.0);
                }
            }
            Err(e) => self.fail(event_loop, anyhow::Error::new(e).context("Render failed")),
        }
    }

    // =========================================================================
    // SCENE EDITING
    // =========================================================================

    /// Nearest entity whose world bounds the camera ray hits.
    fn pick(&mut self) -> Result<()> {
        let ray = self.camera.ray();

        let hit = self
            .scene
            .iter_mut()
            .filter_map(|(key, entity)| {
                let bounds = entity.world_bounds()?;
                ray.intersect(&bounds).map(|hit| (hit.distance, *key, entity))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0));

        let Some((distance, key, entity)) = hit else {
            log::info!("Nothing picked");
            self.picked = None;
            return Ok(());
        };

        log::info!("Picked entity {:?} at distance {:.2}", key, distance);
        entity.yaw += 0.3;
        self.picked = Some(key);

        if let Some(renderer) = self.renderer.as_mut() {
            renderer.update_entity(key, entity)?;
        }
        Ok(())
    }

    fn spawn(&mut self) -> Result<()> {
        let Some(renderer) = self.renderer.as_mut() else {
            return Ok(());
        };

        let position = self.camera.position + self.camera.forward() * 3.0;
        let mut entity = Entity::new(position, self.mesh.clone()).with_scale(Vector3::splat(0.5));
        entity.look_at(self.camera.position)?;

        let key = renderer.register_entity(&entity)?;
        log::info!("Spawned entity {:?}, {} live", key, renderer.entity_count());
        self.scene.push((key, entity));
        Ok(())
    }

    fn remove_picked(&mut self) -> Result<()> {
        let (Some(key), Some(renderer)) = (self.picked.take(), self.renderer.as_mut()) else {
            return Ok(());
        };

        renderer.unregister_entity(key)?;
        self.scene.retain(|(k, _)| *k != key);
        log::info!("Removed entity {:?}, {} live", key, renderer.entity_count());
        Ok(())
    }
}

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let window = match AppWindow::create(event_loop, &self.config.window) {
            Ok(w) => w,
            Err(e) => {
                self.fail(event_loop, anyhow::Error::new(e).context("Failed to create window"));
                return;
            }
        };

        if let Err(e) = self.init_renderer(&window) {
            self.fail(event_loop, e);
            return;
        }

        self.last_tick = Instant::now();
        self.window = Some(window);
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: winit::window::WindowId, event: WindowEvent) {
        self.input.handle_event(&event);

        let outcome = match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                self.renderer = None;
                event_loop.exit();
                Ok(())
            }

            WindowEvent::RedrawRequested => {
                self.redraw(event_loop);
                Ok(())
            }

            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } => self.pick(),

            WindowEvent::KeyboardInput { event, .. } if event.state.is_pressed() && !event.repeat => {
                match event.physical_key {
                    PhysicalKey::Code(KeyCode::Escape) => {
                        log::info!("ESC pressed, exiting...");
                        self.renderer = None;
                        event_loop.exit();
                        Ok(())
                    }
                    PhysicalKey::Code(KeyCode::KeyN) => self.spawn(),
                    PhysicalKey::Code(KeyCode::Delete) => self.remove_picked(),
                    _ => Ok(()),
                }
            }

            _ => Ok(()),
        };

        if let Err(e) = outcome {
            self.fail(event_loop, e);
        }
    }

    /// Called when the event loop is about to block waiting for events.
    /// We use this to request continuous redraws.
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}
