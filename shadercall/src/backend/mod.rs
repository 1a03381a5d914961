//! Execution backends.
//!
//! A backend runs one exported function of a compiled shader with arguments
//! that have already been bound and marshalled to the declared types.
//!
//! # Available Backends
//!
//! - `cpu` (always available): evaluates the naga IR on the host
//! - `wgpu-backend`: dispatches a one-invocation compute kernel through wgpu

pub mod cpu;

#[cfg(feature = "wgpu-backend")]
pub mod wgpu_backend;

use std::fmt;
use std::sync::Arc;

use crate::device::DeviceParameters;
use crate::error::{BridgeError, Result};
use crate::shader::CompiledShader;
use crate::signature::Signature;
use crate::value::Value;

/// Which execution backend a device uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BackendType {
    /// Use wgpu when an adapter is available, otherwise the CPU executor.
    #[default]
    Auto,
    /// Require a wgpu adapter.
    Wgpu,
    /// Always use the CPU executor.
    Cpu,
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Auto => "auto",
            Self::Wgpu => "wgpu",
            Self::Cpu => "cpu",
        })
    }
}

/// An environment able to execute a shader function.
pub trait ExecutionBackend: Send + Sync + 'static {
    /// Get the backend name.
    fn name(&self) -> &'static str;

    /// The concrete backend type (never [`BackendType::Auto`]).
    fn kind(&self) -> BackendType;

    /// Run `signature`'s function once and return its result.
    ///
    /// `arguments` match the declared parameter types one-to-one. This is a
    /// blocking call.
    fn execute(
        &self,
        shader: &CompiledShader,
        signature: &Signature,
        arguments: &[Value],
    ) -> Result<Value>;
}

/// Create the backend requested by `params`.
pub fn create_backend(params: &DeviceParameters) -> Result<Arc<dyn ExecutionBackend>> {
    match params.backend {
        BackendType::Cpu => {
            log::info!("Using CPU backend");
            Ok(Arc::new(cpu::CpuBackend::with_step_limit(params.step_limit)))
        }
        BackendType::Wgpu => create_wgpu_backend(params),
        BackendType::Auto => match create_wgpu_backend(params) {
            Ok(backend) => Ok(backend),
            Err(e) => {
                log::warn!("Failed to create wgpu backend: {}", e);
                log::info!("Using CPU backend");
                Ok(Arc::new(cpu::CpuBackend::with_step_limit(params.step_limit)))
            }
        },
    }
}

#[cfg(feature = "wgpu-backend")]
fn create_wgpu_backend(params: &DeviceParameters) -> Result<Arc<dyn ExecutionBackend>> {
    let backend = wgpu_backend::WgpuBackend::with_params(params)?;
    log::info!("Using wgpu backend");
    Ok(Arc::new(backend))
}

#[cfg(not(feature = "wgpu-backend"))]
fn create_wgpu_backend(_params: &DeviceParameters) -> Result<Arc<dyn ExecutionBackend>> {
    Err(BridgeError::InitializationFailed(
        "built without the `wgpu-backend` feature".to_string(),
    ))
}

/// Check if a GPU backend was compiled in.
pub fn has_gpu_backend() -> bool {
    cfg!(feature = "wgpu-backend")
}

/// Find the naga function exported as `name`.
pub(crate) fn find_function(
    module: &naga::Module,
    name: &str,
) -> Result<naga::Handle<naga::Function>> {
    module
        .functions
        .iter()
        .find(|(_, function)| function.name.as_deref() == Some(name))
        .map(|(handle, _)| handle)
        .ok_or_else(|| BridgeError::Execution(format!("function `{name}` is not in the module")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_backend_selection() {
        let params = DeviceParameters::new().with_backend(BackendType::Cpu);
        let backend = create_backend(&params).unwrap();
        assert_eq!(backend.kind(), BackendType::Cpu);
    }

    #[test]
    fn test_auto_never_fails() {
        let params = DeviceParameters::new();
        let backend = create_backend(&params).unwrap();
        assert_ne!(backend.kind(), BackendType::Auto);
    }

    #[cfg(not(feature = "wgpu-backend"))]
    #[test]
    fn test_wgpu_unavailable_without_feature() {
        let params = DeviceParameters::new().with_backend(BackendType::Wgpu);
        assert!(matches!(
            create_backend(&params),
            Err(BridgeError::InitializationFailed(_))
        ));
    }

    #[test]
    fn test_backend_type_display() {
        assert_eq!(BackendType::default().to_string(), "auto");
        assert_eq!(BackendType::Cpu.to_string(), "cpu");
    }
}
