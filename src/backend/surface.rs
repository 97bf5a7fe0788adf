// Window side of presentation
//
// The backend never talks to a windowing library directly. Whatever owns the
// window describes it through this trait and binds the native surface.

use ash::{vk, Entry};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::ffi::c_char;

use crate::error::{RenderResult, VkResultExt};

pub trait SurfaceProvider {
    /// Drawable size in pixels.
    fn extent(&self) -> vk::Extent2D;

    fn title(&self) -> &str;

    /// Instance extensions the platform needs to present to this window.
    fn required_instance_extensions(&self) -> RenderResult<Vec<*const c_char>>;

    /// Bind a presentation surface to `instance`.
    ///
    /// # Safety
    /// The window must outlive the returned surface, and `instance` must have
    /// been created with [`SurfaceProvider::required_instance_extensions`].
    unsafe fn create_surface(&self, entry: &Entry, instance: &ash::Instance) -> RenderResult<vk::SurfaceKHR>;
}

/// Instance extensions for any window exposing raw handles.
pub fn raw_required_extensions<W>(window: &W) -> RenderResult<Vec<*const c_char>>
where
    W: HasRawDisplayHandle,
{
    let extensions = ash_window::enumerate_required_extensions(window.raw_display_handle())
        .op("vkEnumerateRequiredExtensions")?;
    Ok(extensions.to_vec())
}

/// Surface for any window exposing raw handles.
///
/// # Safety
/// Same contract as [`SurfaceProvider::create_surface`].
pub unsafe fn raw_create_surface<W>(window: &W, entry: &Entry, instance: &ash::Instance) -> RenderResult<vk::SurfaceKHR>
where
    W: HasRawDisplayHandle + HasRawWindowHandle,
{
    ash_window::create_surface(
        entry,
        instance,
        window.raw_display_handle(),
        window.raw_window_handle(),
        None,
    )
    .op("vkCreateSurfaceKHR")
}
