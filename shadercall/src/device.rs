//! Device handle and configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::backend::{BackendType, ExecutionBackend, create_backend};
use crate::backend::cpu::DEFAULT_STEP_LIMIT;
use crate::error::Result;
use crate::module::ShaderModule;
use crate::source::{FileSystemSource, SourceProvider};

/// Parameters for device creation.
#[derive(Debug, Clone)]
pub struct DeviceParameters {
    /// Which execution backend to use.
    pub backend: BackendType,
    /// Ordered directories searched for `#include` files.
    pub include_paths: Vec<PathBuf>,
    /// Directory relative module and include paths are resolved against.
    pub base_dir: PathBuf,
    /// Enable wgpu instance validation layers.
    pub validation: bool,
    /// Maximum statements a CPU invocation may execute.
    pub step_limit: u64,
}

impl Default for DeviceParameters {
    fn default() -> Self {
        Self {
            backend: BackendType::Auto,
            include_paths: Vec::new(),
            base_dir: std::env::current_dir().unwrap_or_default(),
            validation: cfg!(debug_assertions),
            step_limit: DEFAULT_STEP_LIMIT,
        }
    }
}

impl DeviceParameters {
    /// Create new device parameters with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the execution backend.
    pub fn with_backend(mut self, backend: BackendType) -> Self {
        self.backend = backend;
        self
    }

    /// Append an include search path.
    pub fn with_include_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.include_paths.push(path.into());
        self
    }

    /// Replace the include search paths.
    pub fn with_include_paths<P: Into<PathBuf>>(
        mut self,
        paths: impl IntoIterator<Item = P>,
    ) -> Self {
        self.include_paths = paths.into_iter().map(Into::into).collect();
        self
    }

    /// Set the base directory for relative paths.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = dir.into();
        self
    }

    /// Enable or disable validation.
    pub fn with_validation(mut self, enabled: bool) -> Self {
        self.validation = enabled;
        self
    }

    /// Set the CPU executor's step limit.
    pub fn with_step_limit(mut self, limit: u64) -> Self {
        self.step_limit = limit;
        self
    }
}

/// A handle to an execution environment.
///
/// Cloning is cheap; clones share the same backend and source provider.
/// Modules keep a clone of the device they were loaded on.
#[derive(Clone)]
pub struct Device {
    params: Arc<DeviceParameters>,
    source: Arc<dyn SourceProvider>,
    backend: Arc<dyn ExecutionBackend>,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("backend", &self.backend.name())
            .field("include_paths", &self.params.include_paths)
            .field("base_dir", &self.params.base_dir)
            .finish()
    }
}

impl Device {
    /// Create a device reading modules from the filesystem.
    pub fn new(params: DeviceParameters) -> Result<Self> {
        Self::with_source(params, FileSystemSource)
    }

    /// Create a device reading modules from `source`.
    pub fn with_source(params: DeviceParameters, source: impl SourceProvider) -> Result<Self> {
        let backend = create_backend(&params)?;
        log::info!(
            "Device created: backend={}, include_paths={:?}",
            backend.name(),
            params.include_paths
        );
        Ok(Self {
            params: Arc::new(params),
            source: Arc::new(source),
            backend,
        })
    }

    /// Create a CPU device over an in-memory or custom source.
    pub fn cpu(source: impl SourceProvider) -> Result<Self> {
        Self::with_source(DeviceParameters::new().with_backend(BackendType::Cpu), source)
    }

    /// Get the device parameters.
    pub fn params(&self) -> &DeviceParameters {
        &self.params
    }

    /// The backend actually selected.
    pub fn backend_type(&self) -> BackendType {
        self.backend.kind()
    }

    /// Get the backend name.
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Default include search paths, resolved against the base directory.
    pub fn include_paths(&self) -> Vec<PathBuf> {
        self.resolve_all(&self.params.include_paths)
    }

    /// Load a module using the device's include paths.
    pub fn load_module(&self, path: impl AsRef<Path>) -> Result<ShaderModule> {
        ShaderModule::load(self, path)
    }

    pub(crate) fn backend(&self) -> &Arc<dyn ExecutionBackend> {
        &self.backend
    }

    pub(crate) fn source(&self) -> &Arc<dyn SourceProvider> {
        &self.source
    }

    /// Resolve `path` against the base directory.
    pub(crate) fn resolve(&self, path: &Path) -> PathBuf {
        crate::source::path::resolve(&self.params.base_dir, path)
    }

    pub(crate) fn resolve_all(&self, paths: &[PathBuf]) -> Vec<PathBuf> {
        paths.iter().map(|p| self.resolve(p)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    #[test]
    fn test_parameters_builder() {
        let params = DeviceParameters::new()
            .with_backend(BackendType::Cpu)
            .with_include_path("a")
            .with_include_path("b")
            .with_base_dir("/shaders")
            .with_validation(false)
            .with_step_limit(10);
        assert_eq!(params.backend, BackendType::Cpu);
        assert_eq!(params.include_paths, vec![PathBuf::from("a"), PathBuf::from("b")]);
        assert!(!params.validation);
        assert_eq!(params.step_limit, 10);

        let params = params.with_include_paths(["c"]);
        assert_eq!(params.include_paths, vec![PathBuf::from("c")]);
    }

    #[test]
    fn test_include_paths_resolve_against_base_dir() {
        let params = DeviceParameters::new()
            .with_backend(BackendType::Cpu)
            .with_base_dir("/project/shaders")
            .with_include_paths(["common", "/abs/lib", "../shared"]);
        let device = Device::with_source(params, MemorySource::new()).unwrap();
        assert_eq!(
            device.include_paths(),
            vec![
                PathBuf::from("/project/shaders/common"),
                PathBuf::from("/abs/lib"),
                PathBuf::from("/project/shared"),
            ]
        );
    }

    #[test]
    fn test_cpu_device() {
        let device = Device::cpu(MemorySource::new()).unwrap();
        assert_eq!(device.backend_type(), BackendType::Cpu);
        let clone = device.clone();
        assert_eq!(clone.backend_name(), device.backend_name());
    }
}
