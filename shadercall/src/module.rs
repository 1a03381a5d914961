//! Loaded shader modules.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::device::Device;
use crate::error::{BridgeError, Result};
use crate::shader::{CompiledShader, ShaderComposer};
use crate::signature::{ArgumentBinding, Arguments, Signature};
use crate::value::Value;

/// A compiled shader module bound to the device it was loaded on.
///
/// A module is an immutable snapshot of its source at load time. Loading the
/// same path again (or calling [`reload`](Self::reload)) recompiles from
/// disk and yields an independent module.
#[derive(Debug)]
pub struct ShaderModule {
    device: Device,
    path: PathBuf,
    include_paths: Vec<PathBuf>,
    shader: CompiledShader,
    entry_points: BTreeMap<String, Signature>,
}

impl ShaderModule {
    /// Load a module using the device's include search paths.
    pub fn load(device: &Device, path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with_includes(device, path, &device.params().include_paths)
    }

    /// Load a module, searching `include_paths` in order for `#include` files.
    ///
    /// Relative paths are resolved against the device's base directory.
    pub fn load_with_includes<P: AsRef<Path>>(
        device: &Device,
        path: impl AsRef<Path>,
        include_paths: &[P],
    ) -> Result<Self> {
        let path = device.resolve(path.as_ref());
        let include_paths: Vec<PathBuf> = include_paths
            .iter()
            .map(|p| device.resolve(p.as_ref()))
            .collect();

        log::debug!(
            "Loading module {} (include paths: {:?})",
            path.display(),
            include_paths
        );

        let composer = ShaderComposer::new(device.source().clone(), include_paths);
        let shader = composer.compile_file(&path)?;
        let include_paths = composer.include_paths().to_vec();

        let entry_points: BTreeMap<String, Signature> = shader
            .module
            .functions
            .iter()
            .filter_map(|(_, function)| Signature::from_naga(&shader.module, function))
            .map(|signature| (signature.name().to_string(), signature))
            .collect();

        log::debug!(
            "Loaded {} with {} entry point(s)",
            path.display(),
            entry_points.len()
        );

        Ok(Self {
            device: device.clone(),
            path,
            include_paths,
            shader,
            entry_points,
        })
    }

    /// Load the same path with the same include paths again.
    pub fn reload(&self) -> Result<Self> {
        Self::load_with_includes(&self.device, &self.path, &self.include_paths)
    }

    /// Look up an exported function by name.
    pub fn resolve(&self, name: &str) -> Result<&Signature> {
        self.entry_points
            .get(name)
            .ok_or_else(|| BridgeError::EntryPointNotFound {
                module: self.path.clone(),
                name: name.to_string(),
            })
    }

    /// Exported functions, sorted by name.
    pub fn entry_points(&self) -> impl Iterator<Item = &Signature> {
        self.entry_points.values()
    }

    /// Resolved path of the module source.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolved include search paths used for this module.
    pub fn include_paths(&self) -> &[PathBuf] {
        &self.include_paths
    }

    /// Composed source with all includes expanded.
    pub fn source(&self) -> &str {
        &self.shader.source
    }

    /// The device this module executes on.
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Execute `name` with a validated binding and return its result.
    pub fn invoke(&self, name: &str, binding: &ArgumentBinding) -> Result<Value> {
        let signature = self.resolve(name)?;
        let arguments = signature.marshal(binding)?;

        if !signature.return_type().is_marshalable() {
            return Err(BridgeError::Execution(format!(
                "`{}` returns {}, which cannot cross to the host",
                signature.name(),
                signature.return_type()
            )));
        }

        log::debug!(
            "Invoking {signature} on {} with {:?}",
            self.device.backend_name(),
            arguments
        );
        let result = self
            .device
            .backend()
            .execute(&self.shader, signature, &arguments)?;
        log::debug!("{} returned {}", signature.name(), result);
        Ok(result)
    }

    /// Bind `arguments` to `name` and invoke it.
    pub fn invoke_with(&self, name: &str, arguments: Arguments) -> Result<Value> {
        let binding = self.resolve(name)?.bind(arguments)?;
        self.invoke(name, &binding)
    }

    /// Invoke `name` with positional arguments.
    pub fn call<V: Into<Value>>(
        &self,
        name: &str,
        values: impl IntoIterator<Item = V>,
    ) -> Result<Value> {
        self.invoke_with(name, Arguments::positional(values))
    }

    /// Invoke `name` with named arguments.
    pub fn call_named<K: Into<String>, V: Into<Value>>(
        &self,
        name: &str,
        pairs: impl IntoIterator<Item = (K, V)>,
    ) -> Result<Value> {
        self.invoke_with(name, Arguments::named(pairs))
    }
}
