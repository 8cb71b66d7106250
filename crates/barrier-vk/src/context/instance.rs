use std::{
    ffi::{CStr, CString},
    mem::MaybeUninit,
    ptr::addr_of_mut,
    sync::Arc,
};

use ash::vk::{self, BaseOutStructure, TaggedStructure};

use crate::error::InstanceError;

use super::PhysicalDeviceFilter;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";
const UNKNOWN_ID: &CStr = c"unknown id";
const NO_MSG: &CStr = c"no message";

///The external callback that forwards validation messages to the log crate, or stdout if logging is disabled.
pub unsafe extern "system" fn vulkan_debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    #[allow(unused)] message_types: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _p_user_data: *mut core::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() {
        #[cfg(feature = "logging")]
        log::error!("BarrierDebugMsg: Got Msg, but no data!");
        return vk::FALSE;
    }

    let data = unsafe { &*p_callback_data };
    let idname = if data.p_message_id_name.is_null() {
        UNKNOWN_ID
    } else {
        unsafe { CStr::from_ptr(data.p_message_id_name) }
    };
    let msg = if data.p_message.is_null() {
        NO_MSG
    } else {
        unsafe { CStr::from_ptr(data.p_message) }
    };
    let id = data.message_id_number;

    #[cfg(feature = "logging")]
    {
        if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
            log::error!("[{}: {:?}]: {:?}", id, idname, msg);
        } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
            log::warn!("[{}: {:?}]: {:?}", id, idname, msg);
        } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
            log::info!("[{}: {:?}]: {:?}", id, idname, msg);
        } else {
            log::trace!("[{}: {:?}]: {:?}", id, idname, msg);
        }
    }

    #[cfg(not(feature = "logging"))]
    println!(
        "BarrierDebugMsg: Level: {:?}, Type: {:?}\nId[{}]: {:?}\nMsg: {:?}",
        message_severity, message_types, id, idname, msg
    );

    //never abort the call that triggered the message
    vk::FALSE
}

///Owns the debug messenger that is created when validation is enabled.
pub struct Debugger {
    pub debug_instance: ash::ext::debug_utils::Instance,
    pub debug_messenger: vk::DebugUtilsMessengerEXT,
}

impl Debugger {
    fn new(entry: &ash::Entry, instance: &ash::Instance) -> Result<Self, InstanceError> {
        let debug_instance = ash::ext::debug_utils::Instance::new(entry, instance);
        let info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::ERROR
                    | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::INFO,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(vulkan_debug_callback));

        let debug_messenger =
            unsafe { debug_instance.create_debug_utils_messenger(&info, None)? };
        Ok(Debugger {
            debug_instance,
            debug_messenger,
        })
    }
}

impl Drop for Debugger {
    fn drop(&mut self) {
        unsafe {
            self.debug_instance
                .destroy_debug_utils_messenger(self.debug_messenger, None)
        };
    }
}

///Instance configuration as well as the source entry point. Usually this struct is created via [Instance::load]
pub struct InstanceBuilder {
    pub entry: ash::Entry,
    pub validation: bool,
    pub enabled_layers: Vec<CString>,
    pub enabled_extensions: Vec<CString>,
    available_layers: Vec<vk::LayerProperties>,
    available_extensions: Vec<vk::ExtensionProperties>,
}

impl InstanceBuilder {
    fn from_entry(entry: ash::Entry) -> Result<Self, InstanceError> {
        let available_layers = unsafe { entry.enumerate_instance_layer_properties()? };
        let available_extensions = unsafe { entry.enumerate_instance_extension_properties(None)? };

        Ok(InstanceBuilder {
            entry,
            validation: false,
            enabled_extensions: Vec::new(),
            enabled_layers: Vec::new(),
            available_layers,
            available_extensions,
        })
    }

    ///Builds the instance from the current information. If validation is enabled, the Khronos validation layer
    /// is loaded and its messages are forwarded to the log.
    pub fn build(mut self) -> Result<Arc<Instance>, InstanceError> {
        if self.validation {
            self = self.with_layer(VALIDATION_LAYER.to_owned())?;
            self = self.with_extension(ash::ext::debug_utils::NAME.to_owned())?;
        }

        let InstanceBuilder {
            entry,
            validation,
            enabled_layers,
            enabled_extensions,
            available_layers: _,
            available_extensions: _,
        } = self;

        let app_desc = vk::ApplicationInfo::default()
            .application_name(c"barrier-cts")
            .api_version(vk::make_api_version(
                0,
                Instance::API_VERSION_MAJOR,
                Instance::API_VERSION_MINOR,
                Instance::API_VERSION_PATCH,
            ));

        #[cfg(feature = "logging")]
        {
            log::info!("Instance creation:");
            let apiversion = app_desc.api_version;
            log::info!(
                "  Vulkan version: {}.{}.{}",
                vk::api_version_major(apiversion),
                vk::api_version_minor(apiversion),
                vk::api_version_patch(apiversion),
            );
            log::info!("  Layers:");
            for l in &enabled_layers {
                log::info!("    {:?}", l);
            }
            log::info!("  Extensions:");
            for e in &enabled_extensions {
                log::info!("    {:?}", e);
            }
        }

        let extension_ptrs = enabled_extensions
            .iter()
            .map(|ext| ext.as_ptr())
            .collect::<Vec<_>>();
        let layer_ptrs = enabled_layers
            .iter()
            .map(|l| l.as_ptr())
            .collect::<Vec<_>>();

        let create_info = vk::InstanceCreateInfo::default()
            .application_info(&app_desc)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);

        let instance = unsafe { entry.create_instance(&create_info, None)? };

        let debugger = if validation {
            match Debugger::new(&entry, &instance) {
                Ok(d) => Some(d),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        Ok(Arc::new(Instance {
            entry,
            inner: instance,
            debugger,
        }))
    }

    pub fn is_layer_available(&self, name: &CStr) -> bool {
        self.available_layers
            .iter()
            .any(|al| al.layer_name_as_c_str().map(|n| n == name).unwrap_or(false))
    }

    ///Returns true if a instance-extension with the given name was found
    pub fn is_extension_available(&self, extension_name: &CStr) -> bool {
        self.available_extensions.iter().any(|ext| {
            ext.extension_name_as_c_str()
                .map(|n| n == extension_name)
                .unwrap_or(false)
        })
    }

    ///adds an extensions with the given name, if it was not added yet.
    pub fn with_extension(mut self, name: CString) -> Result<Self, InstanceError> {
        if !self.is_extension_available(name.as_c_str()) {
            return Err(InstanceError::MissingExtension(name));
        }

        if self.enabled_extensions.contains(&name) {
            #[cfg(feature = "logging")]
            log::warn!("Tried to enable extension twice: {:?}", name);
            return Ok(self);
        }

        #[cfg(feature = "logging")]
        log::info!("Enabling instance-extension: {:?}", name);
        self.enabled_extensions.push(name);

        Ok(self)
    }

    ///adds an layer with the given name to the list of layers
    pub fn with_layer(mut self, name: CString) -> Result<Self, InstanceError> {
        if !self.is_layer_available(&name) {
            return Err(InstanceError::MissingLayer(name));
        }

        if self.enabled_layers.contains(&name) {
            #[cfg(feature = "logging")]
            log::warn!("Tried to enable layer twice: {:?}", name);
            return Ok(self);
        }

        self.enabled_layers.push(name);
        Ok(self)
    }

    ///Enables the validation layer. Messages are printed either via [println](println), or via the log crate if the `logging` feature is enabled.
    pub fn enable_validation(mut self) -> Self {
        self.validation = true;
        self
    }
}

///Wraps the entry point as well as the created instance into one object.
///
/// # Safety
///
/// This struct is un-clonable for a reason. It implements [Drop] which takes care of destroying the vulkan instance, as well as the debug
/// messenger if it was loaded.
pub struct Instance {
    pub entry: ash::Entry,
    pub inner: ash::Instance,
    pub debugger: Option<Debugger>,
}

impl Instance {
    ///The major version of Vulkan loaded.
    pub const API_VERSION_MAJOR: u32 = 1;
    ///The minor version of Vulkan loaded.
    pub const API_VERSION_MINOR: u32 = 3;
    ///The patch version of Vulkan loaded.
    pub const API_VERSION_PATCH: u32 = 0;

    ///Creates instance loaded by using [Entry::load](ash::Entry::load)
    pub fn load() -> Result<InstanceBuilder, InstanceError> {
        let entry = unsafe { ash::Entry::load()? };
        InstanceBuilder::from_entry(entry)
    }

    pub fn validation_enabled(&self) -> bool {
        self.debugger.is_some()
    }

    ///Returns the queried feature struct `E` of `physical_device`.
    pub fn get_feature<E: vk::ExtendsPhysicalDeviceFeatures2 + TaggedStructure>(
        &self,
        physical_device: &vk::PhysicalDevice,
    ) -> E {
        //Feature structs are plain 32bit fields apart from s_type and p_next, so a zeroed value with the
        // right s_type is a valid query target.
        let mut q: MaybeUninit<E> = MaybeUninit::zeroed();
        let qptr = q.as_mut_ptr();
        unsafe {
            addr_of_mut!((*(qptr as *mut BaseOutStructure)).s_type).write(E::STRUCTURE_TYPE);
        }
        let mut features2 =
            vk::PhysicalDeviceFeatures2::default().push_next(unsafe { &mut *q.as_mut_ptr() });

        unsafe {
            self.inner
                .get_physical_device_features2(*physical_device, &mut features2);
        }
        //p_next points into the query chain which is dropped now.
        let mut query = unsafe { q.assume_init() };
        unsafe {
            addr_of_mut!((*(&mut query as *mut E as *mut BaseOutStructure)).p_next)
                .write(std::ptr::null_mut());
        }
        query
    }

    ///Same as [get_feature](Self::get_feature) but for property structs.
    pub fn get_property<P: vk::ExtendsPhysicalDeviceProperties2 + TaggedStructure>(
        &self,
        physical_device: &vk::PhysicalDevice,
    ) -> P {
        let mut q: MaybeUninit<P> = MaybeUninit::zeroed();
        let qptr = q.as_mut_ptr();
        unsafe {
            addr_of_mut!((*(qptr as *mut BaseOutStructure)).s_type).write(P::STRUCTURE_TYPE);
        }
        let mut properties2 =
            vk::PhysicalDeviceProperties2::default().push_next(unsafe { &mut *q.as_mut_ptr() });

        unsafe {
            self.inner
                .get_physical_device_properties2(*physical_device, &mut properties2);
        }
        let mut query = unsafe { q.assume_init() };
        unsafe {
            addr_of_mut!((*(&mut query as *mut P as *mut BaseOutStructure)).p_next)
                .write(std::ptr::null_mut());
        }
        query
    }
}

pub trait GetDeviceFilter {
    fn create_physical_device_filter(&self) -> Result<PhysicalDeviceFilter, InstanceError>;
}

impl GetDeviceFilter for Arc<Instance> {
    fn create_physical_device_filter(&self) -> Result<PhysicalDeviceFilter, InstanceError> {
        let devices = unsafe { self.inner.enumerate_physical_devices()? };
        Ok(PhysicalDeviceFilter::new(&self.inner, devices))
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        //the messenger must go before the instance
        self.debugger.take();
        unsafe {
            self.inner.destroy_instance(None);
        }
    }
}
