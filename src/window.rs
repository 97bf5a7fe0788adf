// winit window as a presentation target

use ash::{vk, Entry};
use std::ffi::c_char;
use std::sync::Arc;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Window, WindowAttributes};

use crate::backend::surface::{raw_create_surface, raw_required_extensions};
use crate::backend::SurfaceProvider;
use crate::config::WindowConfig;
use crate::error::RenderResult;

/// The single application window.
#[derive(Debug, Clone)]
pub struct AppWindow {
    window: Arc<Window>,
    title: String,
}

impl AppWindow {
    /// Open a window sized and titled from `config`. Resizing is disabled
    /// since the swapchain is fixed for the renderer's lifetime.
    pub fn create(event_loop: &ActiveEventLoop, config: &WindowConfig) -> Result<Self, winit::error::OsError> {
        let attributes = WindowAttributes::default()
            .with_title(&config.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(config.width, config.height))
            .with_resizable(false);

        let window = event_loop.create_window(attributes)?;
        Ok(Self::new(Arc::new(window), &config.title))
    }

    pub fn new(window: Arc<Window>, title: &str) -> Self {
        Self {
            window,
            title: title.to_string(),
        }
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    pub fn request_redraw(&self) {
        self.window.request_redraw();
    }
}

impl SurfaceProvider for AppWindow {
    fn extent(&self) -> vk::Extent2D {
        let size = self.window.inner_size();
        vk::Extent2D {
            width: size.width,
            height: size.height,
        }
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn required_instance_extensions(&self) -> RenderResult<Vec<*const c_char>> {
        raw_required_extensions(self.window.as_ref())
    }

    unsafe fn create_surface(&self, entry: &Entry, instance: &ash::Instance) -> RenderResult<vk::SurfaceKHR> {
        raw_create_surface(self.window.as_ref(), entry, instance)
    }
}
