use std::ffi::{c_char, c_ulong, CStr};
use std::path::Path;

use ladspa_sys as ffi;
use libloading::Library;
use tracing::info;

use super::{AudioPlugin, PluginLoader, PortHint, PortInfo, PortKind};
use crate::error::FilterError;

/// Loads plugins from LADSPA shared libraries.
#[derive(Debug, Default, Clone, Copy)]
pub struct LadspaLoader;

impl PluginLoader for LadspaLoader {
    fn load(
        &self,
        path: &Path,
        label: &str,
        sample_rate: u32,
    ) -> Result<Box<dyn AudioPlugin>, FilterError> {
        let plugin = LadspaPlugin::load(path, label, sample_rate)?;
        Ok(Box::new(plugin))
    }
}

/// A LADSPA plugin instance and the library that provides it.
///
/// Each instance opens its own library handle with a local symbol namespace so
/// two instances of the same library never share global state through the
/// dynamic linker.
pub struct LadspaPlugin {
    instance: Instance,
    // Declared last so the library outlives the instance during drop.
    _library: Library,
}

impl LadspaPlugin {
    pub fn load(path: &Path, label: &str, sample_rate: u32) -> Result<Self, FilterError> {
        let library = open_local(path).map_err(|source| FilterError::LibraryOpen {
            path: path.to_path_buf(),
            source,
        })?;

        let descriptor_fn: ffi::LADSPA_Descriptor_Function = unsafe {
            let symbol = library
                .get::<ffi::LADSPA_Descriptor_Function>(ffi::LADSPA_DESCRIPTOR_SYMBOL)
                .map_err(|source| FilterError::MissingSymbol {
                    path: path.to_path_buf(),
                    source,
                })?;
            *symbol
        };

        // SAFETY: `descriptor_fn` comes from `library`, which the plugin keeps
        // open for as long as the instance exists.
        let instance = unsafe { Instance::new(descriptor_fn, path, label, sample_rate)? };
        info!(
            path = %path.display(),
            label,
            name = %instance.name,
            ports = instance.ports.len(),
            "loaded LADSPA plugin"
        );

        Ok(Self {
            instance,
            _library: library,
        })
    }
}

/// An instantiated descriptor. Cleans itself up on drop.
struct Instance {
    descriptor: *const ffi::LADSPA_Descriptor,
    handle: ffi::LADSPA_Handle,
    label: String,
    name: String,
    ports: Vec<PortInfo>,
    inplace_broken: bool,
    cleaned_up: bool,
}

// The instance is only ever driven from one thread at a time, behind the
// owning channel's lock.
unsafe impl Send for Instance {}

impl Instance {
    /// Finds `label` through `descriptor_fn` and instantiates it.
    ///
    /// # Safety
    /// `descriptor_fn` and every descriptor it returns must stay valid for the
    /// lifetime of the returned instance.
    unsafe fn new(
        descriptor_fn: ffi::LADSPA_Descriptor_Function,
        path: &Path,
        label: &str,
        sample_rate: u32,
    ) -> Result<Self, FilterError> {
        let descriptor =
            find_descriptor(descriptor_fn, label).ok_or_else(|| FilterError::LabelNotFound {
                label: label.to_owned(),
                path: path.to_path_buf(),
            })?;
        let desc = &*descriptor;

        let missing = |entry| FilterError::MissingEntryPoint {
            label: label.to_owned(),
            entry,
        };
        let instantiate = desc.instantiate.ok_or_else(|| missing("instantiate"))?;
        desc.connect_port.ok_or_else(|| missing("connect_port"))?;
        desc.run.ok_or_else(|| missing("run"))?;

        let handle = instantiate(descriptor, sample_rate as c_ulong);
        if handle.is_null() {
            return Err(FilterError::Instantiate {
                label: label.to_owned(),
            });
        }

        Ok(Self {
            descriptor,
            handle,
            label: label.to_owned(),
            name: c_string(desc.Name),
            ports: read_ports(desc),
            inplace_broken: ffi::is_inplace_broken(desc.Properties),
            cleaned_up: false,
        })
    }

    fn descriptor(&self) -> &ffi::LADSPA_Descriptor {
        // SAFETY: the descriptor outlives the instance, see `Instance::new`.
        unsafe { &*self.descriptor }
    }

    fn cleanup(&mut self) {
        if self.cleaned_up {
            return;
        }
        self.cleaned_up = true;
        if let Some(cleanup) = self.descriptor().cleanup {
            unsafe { cleanup(self.handle) };
        }
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        self.cleanup();
    }
}

impl AudioPlugin for LadspaPlugin {
    fn label(&self) -> &str {
        &self.instance.label
    }

    fn name(&self) -> &str {
        &self.instance.name
    }

    fn ports(&self) -> &[PortInfo] {
        &self.instance.ports
    }

    fn inplace_broken(&self) -> bool {
        self.instance.inplace_broken
    }

    unsafe fn connect_port(&mut self, port: usize, data: *mut f32) {
        if let Some(connect) = self.instance.descriptor().connect_port {
            connect(self.instance.handle, port as c_ulong, data);
        }
    }

    fn activate(&mut self) {
        if let Some(activate) = self.instance.descriptor().activate {
            unsafe { activate(self.instance.handle) };
        }
    }

    fn deactivate(&mut self) {
        if let Some(deactivate) = self.instance.descriptor().deactivate {
            unsafe { deactivate(self.instance.handle) };
        }
    }

    unsafe fn run(&mut self, samples: usize) {
        if let Some(run) = self.instance.descriptor().run {
            run(self.instance.handle, samples as c_ulong);
        }
    }

    fn cleanup(&mut self) {
        self.instance.cleanup();
    }
}

#[cfg(unix)]
fn open_local(path: &Path) -> Result<Library, libloading::Error> {
    use libloading::os::unix::{Library as UnixLibrary, RTLD_LOCAL, RTLD_NOW};
    unsafe { UnixLibrary::open(Some(path), RTLD_NOW | RTLD_LOCAL) }.map(Library::from)
}

#[cfg(not(unix))]
fn open_local(path: &Path) -> Result<Library, libloading::Error> {
    unsafe { Library::new(path) }
}

unsafe fn find_descriptor(
    descriptor_fn: ffi::LADSPA_Descriptor_Function,
    label: &str,
) -> Option<*const ffi::LADSPA_Descriptor> {
    let mut index: c_ulong = 0;
    loop {
        let descriptor = descriptor_fn(index);
        if descriptor.is_null() {
            return None;
        }
        let candidate = (*descriptor).Label;
        if !candidate.is_null() && CStr::from_ptr(candidate).to_bytes() == label.as_bytes() {
            return Some(descriptor);
        }
        index += 1;
    }
}

unsafe fn read_ports(desc: &ffi::LADSPA_Descriptor) -> Vec<PortInfo> {
    let count = desc.PortCount as usize;
    let mut ports = Vec::with_capacity(count);
    for port in 0..count {
        let kind = if desc.PortDescriptors.is_null() {
            None
        } else {
            PortKind::from_descriptor(*desc.PortDescriptors.add(port))
        };
        let name = if desc.PortNames.is_null() {
            format!("port {port}")
        } else {
            c_string(*desc.PortNames.add(port))
        };
        let hint = if desc.PortRangeHints.is_null() {
            PortHint::default()
        } else {
            let raw = &*desc.PortRangeHints.add(port);
            PortHint::new(raw.HintDescriptor, raw.LowerBound, raw.UpperBound)
        };
        ports.push(PortInfo { name, kind, hint });
    }
    ports
}

unsafe fn c_string(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    CStr::from_ptr(ptr).to_string_lossy().into_owned()
}
