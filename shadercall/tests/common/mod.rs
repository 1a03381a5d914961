//! Common utilities for shadercall integration tests.

use std::path::PathBuf;

use shadercall::{BackendType, Device, DeviceParameters, ShaderModule};

/// Execution backends exercised by the integration tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// CPU executor (always available).
    Cpu,
    /// GPU through wgpu (requires the feature and an adapter).
    Wgpu,
}

impl Backend {
    /// Check if this backend was compiled in.
    pub fn is_available(&self) -> bool {
        match self {
            Backend::Cpu => true,
            Backend::Wgpu => shadercall::backend::has_gpu_backend(),
        }
    }

    fn backend_type(self) -> BackendType {
        match self {
            Backend::Cpu => BackendType::Cpu,
            Backend::Wgpu => BackendType::Wgpu,
        }
    }
}

/// Directory holding the WGSL fixtures.
pub fn shader_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/shaders")
}

/// Device parameters rooted at the fixture directory.
pub fn test_parameters(backend: Backend) -> DeviceParameters {
    DeviceParameters::new()
        .with_backend(backend.backend_type())
        .with_base_dir(shader_dir())
        .with_include_path("lib")
}

/// A device over the fixture directory.
pub struct TestContext {
    pub backend: Backend,
    pub device: Device,
}

impl TestContext {
    /// Create a new test context for the given backend.
    ///
    /// Returns `None` if the backend is not available.
    pub fn new(backend: Backend) -> Option<Self> {
        let _ = env_logger::builder().is_test(true).try_init();

        if !backend.is_available() {
            return None;
        }

        let device = Device::new(test_parameters(backend)).ok()?;
        Some(Self { backend, device })
    }

    /// Load a fixture module, panicking on failure.
    pub fn load(&self, name: &str) -> ShaderModule {
        ShaderModule::load(&self.device, name)
            .unwrap_or_else(|e| panic!("failed to load {name} on {:?}: {e}", self.backend))
    }
}
