//! # shadercall
//!
//! Call functions in WGSL shader modules from Rust.
//!
//! ## Overview
//!
//! This crate provides:
//! - [`Device`] - Explicit execution environment handle (wgpu or CPU)
//! - [`ShaderModule`] - A compiled module with `#include` resolution
//! - [`Signature`] - Reflected parameter list of an exported function
//! - [`ArgumentBinding`] - Positional or named arguments validated against a signature
//!
//! Every named WGSL function that returns a value is exported. Arguments and
//! results are scalars (`bool`, `i32`, `u32`, `f32`) or vectors of them.
//!
//! ## Example
//!
//! ```
//! use shadercall::{Device, MemorySource, ShaderModule};
//!
//! let source = MemorySource::new();
//! source.insert("/shaders/reservoir.wgsl", "fn add(a: f32, b: f32) -> f32 { return a + b; }");
//!
//! let device = Device::cpu(source).unwrap();
//! let module = ShaderModule::load(&device, "/shaders/reservoir.wgsl").unwrap();
//!
//! let positional = module.call("add", [1.0f32, 2.0]).unwrap();
//! let named = module.call_named("add", [("a", 1.0f32), ("b", 2.0)]).unwrap();
//! assert_eq!(positional, named);
//! assert_eq!(positional.as_f32(), Some(3.0));
//! ```

pub mod backend;
pub mod device;
pub mod error;
pub mod module;
pub mod shader;
pub mod signature;
pub mod source;
pub mod types;
pub mod value;

// Re-export main types for convenience
pub use backend::{BackendType, ExecutionBackend};
pub use device::{Device, DeviceParameters};
pub use error::{BridgeError, Result};
pub use module::ShaderModule;
pub use signature::{ArgumentBinding, Arguments, Parameter, Signature};
pub use source::{FileSystemSource, MemorySource, SourceError, SourceProvider};
pub use types::{ScalarType, ShaderType};
pub use value::{ParseValueError, Scalar, Value};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Log the library version. Optional; nothing requires it to be called.
pub fn init() {
    log::info!("shadercall v{} initialized", VERSION);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_positional_and_named_agree() {
        let source = MemorySource::new();
        source.insert("/m.wgsl", "fn sub(a: i32, b: i32) -> i32 { return a - b; }");
        let device = Device::cpu(source).unwrap();
        let module = ShaderModule::load(&device, "/m.wgsl").unwrap();
        assert_eq!(module.call("sub", [5, 3]).unwrap(), Value::from(2));
        assert_eq!(
            module.call_named("sub", [("b", 3), ("a", 5)]).unwrap(),
            Value::from(2)
        );
    }
}
