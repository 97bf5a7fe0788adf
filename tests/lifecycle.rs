// Full renderer lifecycle against a real GPU and window: start with no
// entities, render a cleared frame, then register, update and unregister
// an entity with frames in between, and shut down.
//
// winit needs the main thread, so this runs without the libtest harness.
// Set VISOR_GPU_TESTS=1 to run it.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use visor::config::GraphicsConfig;
use visor::math::Vector3;
use visor::scene::{Camera, Entity, Mesh};
use visor::window::AppWindow;
use visor::{RenderError, Renderer};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};

fn shader(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("shaders").join(name)
}

#[derive(Default)]
struct Lifecycle {
    outcome: Option<Result<(), String>>,
}

impl Lifecycle {
    fn run(&self, event_loop: &ActiveEventLoop) -> Result<(), String> {
        let config = visor::config::WindowConfig {
            title: "visor lifecycle".to_string(),
            width: 320,
            height: 240,
        };
        let window = AppWindow::create(event_loop, &config).map_err(|e| e.to_string())?;

        let mut renderer =
            Renderer::new(&window, &GraphicsConfig::default(), false).map_err(|e| format!("start: {e}"))?;
        if renderer.entity_count() != 0 {
            return Err("renderer started with entities".into());
        }

        match Renderer::new(&window, &GraphicsConfig::default(), false) {
            Err(RenderError::AlreadyRunning) => {}
            Err(e) => return Err(format!("second start failed with the wrong error: {e}")),
            Ok(_) => return Err("second renderer started while the first was alive".into()),
        }

        let camera = Camera::default();
        renderer.render(&camera).map_err(|e| format!("render: {e}"))?;

        let cube = Arc::new(Mesh::cube(shader("mesh.vert.spv"), shader("mesh.frag.spv")));
        let mut entity = Entity::new(Vector3::new(0.0, 0.0, 3.0), cube);
        let key = renderer.register_entity(&entity).map_err(|e| format!("register: {e}"))?;
        if !renderer.contains(key) || renderer.entity_count() != 1 {
            return Err("registered entity is not tracked".into());
        }
        renderer.render(&camera).map_err(|e| format!("render with entity: {e}"))?;

        entity.yaw += 0.5;
        renderer.update_entity(key, &entity).map_err(|e| format!("update: {e}"))?;
        renderer.render(&camera).map_err(|e| format!("render after update: {e}"))?;

        // A mesh whose shaders are missing is refused and leaves nothing behind
        let broken = Arc::new(Mesh::cube(shader("missing.vert.spv"), shader("missing.frag.spv")));
        match renderer.register_entity(&Entity::new(Vector3::new(1.0, 0.0, 3.0), broken)) {
            Err(RenderError::ShaderRead { .. }) => {}
            Err(e) => return Err(format!("missing shader failed with the wrong error: {e}")),
            Ok(_) => return Err("entity with missing shaders was registered".into()),
        }
        if renderer.entity_count() != 1 {
            return Err("failed registration changed the entity count".into());
        }
        renderer.render(&camera).map_err(|e| format!("render after failed register: {e}"))?;

        renderer.unregister_entity(key).map_err(|e| format!("unregister: {e}"))?;
        if renderer.contains(key) || renderer.entity_count() != 0 {
            return Err("unregistered entity is still tracked".into());
        }
        match renderer.unregister_entity(key) {
            Err(RenderError::UnknownEntity) => {}
            other => return Err(format!("second unregister gave {other:?}")),
        }
        match renderer.update_entity(key, &entity) {
            Err(RenderError::UnknownEntity) => {}
            other => return Err(format!("update of a removed entity gave {other:?}")),
        }

        // Several frames in a row: each one waits on the fence the last submit signalled
        for frame in 0..3 {
            renderer.render(&camera).map_err(|e| format!("render {frame} after unregister: {e}"))?;
        }
        drop(renderer);

        // Terminated: a new backend may start again
        let again = Renderer::new(&window, &GraphicsConfig::default(), false).map_err(|e| format!("restart: {e}"))?;
        drop(again);

        Ok(())
    }
}

impl ApplicationHandler for Lifecycle {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.outcome.is_none() {
            self.outcome = Some(self.run(event_loop));
        }
        event_loop.exit();
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: winit::window::WindowId, _event: WindowEvent) {}
}

fn main() -> ExitCode {
    if std::env::var("VISOR_GPU_TESTS").as_deref() != Ok("1") {
        println!("lifecycle: skipped (set VISOR_GPU_TESTS=1 to run)");
        return ExitCode::SUCCESS;
    }

    let _ = env_logger::builder().is_test(true).try_init();

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            eprintln!("lifecycle: no event loop: {e}");
            return ExitCode::FAILURE;
        }
    };

    let mut test = Lifecycle::default();
    if let Err(e) = event_loop.run_app(&mut test) {
        eprintln!("lifecycle: event loop error: {e}");
        return ExitCode::FAILURE;
    }

    match test.outcome {
        Some(Ok(())) => {
            println!("lifecycle: ok");
            ExitCode::SUCCESS
        }
        Some(Err(e)) => {
            eprintln!("lifecycle: FAILED: {e}");
            ExitCode::FAILURE
        }
        None => {
            eprintln!("lifecycle: FAILED: event loop never resumed");
            ExitCode::FAILURE
        }
    }
}
