// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Instance creation bound to the window's platform extensions
// - Validation layer + debug messenger (optional)
// - Presentation surface
// - Physical device selection (prefer discrete GPU)
// - Queue family selection (graphics + compute + transfer + present)
// - Logical device + queue creation with dynamic rendering enabled

use ash::extensions::{ext::DebugUtils, khr};
use ash::{vk, Entry};
use std::ffi::{c_char, CStr, CString};
use std::sync::Arc;

use super::SurfaceProvider;
use crate::error::{RenderError, RenderResult, VkResultExt};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Vulkan device wrapper with automatic cleanup
pub struct VulkanDevice {
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub instance: ash::Instance,
    // Keeps the Vulkan library loaded
    _entry: Entry,

    // Presentation
    pub surface: vk::SurfaceKHR,
    pub surface_loader: khr::Surface,

    // Queue handles
    pub queue: vk::Queue,
    pub queue_family: u32,

    // Debug utils (if validation enabled)
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,

    // Device properties (cached)
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl VulkanDevice {
    /// Create the Vulkan device for `window`.
    ///
    /// # Arguments
    /// * `window` - Provides instance extensions and the surface
    /// * `enable_validation` - Enable the Khronos validation layer
    pub fn new(window: &dyn SurfaceProvider, enable_validation: bool) -> RenderResult<Arc<Self>> {
        log::info!("Creating Vulkan device for '{}'", window.title());

        // Step 1: Load Vulkan library
        let entry = unsafe { Entry::load() }?;

        // Step 2: Create instance
        let enable_validation = enable_validation && Self::has_validation_layer(&entry);
        let instance = Self::create_instance(&entry, window, enable_validation)?;
        let mut scope = InstanceScope::new(instance.clone());

        // Step 3: Setup debug messenger if validation enabled
        if enable_validation {
            scope.debug_utils = Some(Self::setup_debug_messenger(&entry, &instance)?);
        }

        // Step 4: Bind the window surface
        let surface_loader = khr::Surface::new(&entry, &instance);
        let surface = unsafe { window.create_surface(&entry, &instance) }?;
        scope.surface = Some((surface_loader.clone(), surface));

        // Step 5: Pick physical device (GPU) and a queue family that does everything
        let physical_device = Self::pick_physical_device(&instance)?;
        let queue_family = Self::find_queue_family(&instance, &surface_loader, physical_device, surface)?;

        // Step 6: Create logical device
        let (device, queue) = Self::create_logical_device(&instance, physical_device, queue_family)?;
        let debug_utils = scope.release();

        // Step 7: Cache device properties
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(physical_device) };

        log::info!(
            "API Version: {}.{}.{}, queue family {}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version),
            queue_family
        );

        Ok(Arc::new(Self {
            device,
            physical_device,
            instance,
            _entry: entry,
            surface,
            surface_loader,
            queue,
            queue_family,
            debug_utils,
            properties,
            memory_properties,
        }))
    }

    fn has_validation_layer(entry: &Entry) -> bool {
        let available = entry
            .enumerate_instance_layer_properties()
            .unwrap_or_default()
            .iter()
            .any(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) } == VALIDATION_LAYER);

        if !available {
            log::warn!("{:?} requested but not installed, continuing without it", VALIDATION_LAYER);
        }
        available
    }

    fn create_instance(
        entry: &Entry,
        window: &dyn SurfaceProvider,
        enable_validation: bool,
    ) -> RenderResult<ash::Instance> {
        // interior NULs cannot come from a sane title; drop them rather than fail
        let title = CString::new(window.title().replace('\0', "")).unwrap_or_default();

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&title)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&title)
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_3);

        // Platform surface extensions come from the window
        let mut extensions: Vec<*const c_char> = window.required_instance_extensions()?;
        if enable_validation {
            extensions.push(DebugUtils::name().as_ptr());
        }

        let layer_names = if enable_validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        unsafe { entry.create_instance(&create_info, None) }.op("vkCreateInstance")
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> RenderResult<(DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = DebugUtils::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .op("vkCreateDebugUtilsMessengerEXT")?;

        Ok((debug_utils, messenger))
    }

    /// First discrete GPU, otherwise whatever was enumerated first.
    fn pick_physical_device(instance: &ash::Instance) -> RenderResult<vk::PhysicalDevice> {
        let devices = unsafe { instance.enumerate_physical_devices() }.op("vkEnumeratePhysicalDevices")?;
        let first = *devices.first().ok_or(RenderError::NoPhysicalDevice)?;

        let name = |device: vk::PhysicalDevice| {
            let props = unsafe { instance.get_physical_device_properties(device) };
            unsafe { CStr::from_ptr(props.device_name.as_ptr()) }
                .to_string_lossy()
                .into_owned()
        };

        let discrete = devices.iter().copied().find(|&device| {
            let props = unsafe { instance.get_physical_device_properties(device) };
            props.device_type == vk::PhysicalDeviceType::DISCRETE_GPU
        });

        match discrete {
            Some(device) => {
                log::info!("Discrete GPU found: {}", name(device));
                Ok(device)
            }
            None => {
                log::info!("No discrete GPU found, falling back to: {}", name(first));
                Ok(first)
            }
        }
    }

    fn find_queue_family(
        instance: &ash::Instance,
        surface_loader: &khr::Surface,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> RenderResult<u32> {
        let families = unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

        for (index, family) in families.iter().enumerate() {
            let index = index as u32;
            let present = unsafe {
                surface_loader.get_physical_device_surface_support(physical_device, index, surface)
            }
            .op("vkGetPhysicalDeviceSurfaceSupportKHR")?;

            if present && supports_all_work(family.queue_flags) {
                return Ok(index);
            }
        }

        Err(RenderError::NoQueueFamily)
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        queue_family: u32,
    ) -> RenderResult<(ash::Device, vk::Queue)> {
        let queue_priorities = [1.0];
        let queue_create_info = vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(queue_family)
            .queue_priorities(&queue_priorities)
            .build();

        let extensions = [khr::Swapchain::name().as_ptr()];

        // Vulkan 1.3 core: render straight into image views, no render pass objects
        let mut dynamic_rendering = vk::PhysicalDeviceDynamicRenderingFeatures::builder().dynamic_rendering(true);

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(std::slice::from_ref(&queue_create_info))
            .enabled_extension_names(&extensions)
            .push_next(&mut dynamic_rendering);

        let device = unsafe { instance.create_device(physical_device, &create_info, None) }.op("vkCreateDevice")?;
        let queue = unsafe { device.get_device_queue(queue_family, 0) };

        Ok((device, queue))
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> RenderResult<()> {
        unsafe { self.device.device_wait_idle() }.op("vkDeviceWaitIdle")
    }
}

/// Instance-level objects created so far. Dropped on a failed startup,
/// released once the device exists and owns them.
struct InstanceScope {
    instance: Option<ash::Instance>,
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    surface: Option<(khr::Surface, vk::SurfaceKHR)>,
}

impl InstanceScope {
    fn new(instance: ash::Instance) -> Self {
        Self {
            instance: Some(instance),
            debug_utils: None,
            surface: None,
        }
    }

    fn release(mut self) -> Option<(DebugUtils, vk::DebugUtilsMessengerEXT)> {
        self.instance = None;
        self.surface = None;
        self.debug_utils.take()
    }
}

impl Drop for InstanceScope {
    fn drop(&mut self) {
        let Some(instance) = self.instance.take() else {
            return;
        };

        unsafe {
            if let Some((loader, surface)) = self.surface.take() {
                loader.destroy_surface(surface, None);
            }
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            instance.destroy_instance(None);
        }
    }
}

/// A single queue family must cover every kind of work the renderer submits.
fn supports_all_work(flags: vk::QueueFlags) -> bool {
    flags.contains(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER)
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        if let Err(e) = self.wait_idle() {
            log::error!("Device did not go idle before teardown: {}", e);
        }

        // device, then surface, then instance
        unsafe {
            self.device.destroy_device(None);
            self.surface_loader.destroy_surface(self.surface, None);

            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}
