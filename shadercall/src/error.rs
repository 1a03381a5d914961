//! Bridge error types.

use std::fmt;
use std::path::PathBuf;

use crate::source::SourceError;
use crate::types::ShaderType;

/// Errors that can occur while loading, binding, or invoking shader functions.
///
/// Every failure the bridge can detect has its own variant, so callers can tell
/// a wrong argument name apart from a wrong argument count or a module that
/// failed to compile.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// The module source file does not exist.
    ModuleNotFound(PathBuf),
    /// The module source (or one of its includes) failed to compose, parse, or validate.
    CompilationFailed {
        /// Path of the module being loaded.
        path: PathBuf,
        /// Diagnostic text.
        message: String,
    },
    /// No exported function with the requested name.
    EntryPointNotFound {
        /// Path of the module that was searched.
        module: PathBuf,
        /// The requested name.
        name: String,
    },
    /// A positional binding supplied the wrong number of values.
    ArityMismatch {
        /// Entry point name.
        entry: String,
        /// Declared parameter count.
        expected: usize,
        /// Number of values supplied.
        found: usize,
    },
    /// A declared parameter received no value.
    MissingArgument {
        /// Entry point name.
        entry: String,
        /// Parameter without a value.
        parameter: String,
    },
    /// A named binding used a name the entry point does not declare.
    UnknownArgument {
        /// Entry point name.
        entry: String,
        /// The unrecognized name.
        name: String,
    },
    /// A named binding supplied the same parameter twice.
    DuplicateArgument {
        /// Entry point name.
        entry: String,
        /// The repeated name.
        parameter: String,
    },
    /// A bound value cannot be converted to the parameter's declared type.
    TypeMismatch {
        /// Parameter name.
        parameter: String,
        /// Declared type.
        expected: ShaderType,
        /// Description of the supplied value.
        found: String,
    },
    /// The execution environment reported a fault.
    Execution(String),
    /// The device or its backend could not be created.
    InitializationFailed(String),
    /// Reading module source failed for a reason other than absence.
    Io(String),
}

impl fmt::Display for BridgeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ModuleNotFound(path) => write!(f, "module not found: {}", path.display()),
            Self::CompilationFailed { path, message } => {
                write!(f, "compilation of {} failed: {message}", path.display())
            }
            Self::EntryPointNotFound { module, name } => {
                write!(f, "entry point `{name}` not found in {}", module.display())
            }
            Self::ArityMismatch {
                entry,
                expected,
                found,
            } => write!(
                f,
                "`{entry}` takes {expected} argument(s) but {found} were supplied"
            ),
            Self::MissingArgument { entry, parameter } => {
                write!(f, "missing argument `{parameter}` for `{entry}`")
            }
            Self::UnknownArgument { entry, name } => {
                write!(f, "`{entry}` has no parameter named `{name}`")
            }
            Self::DuplicateArgument { entry, parameter } => {
                write!(f, "argument `{parameter}` supplied more than once for `{entry}`")
            }
            Self::TypeMismatch {
                parameter,
                expected,
                found,
            } => write!(
                f,
                "cannot convert {found} to {expected} for parameter `{parameter}`"
            ),
            Self::Execution(msg) => write!(f, "execution failed: {msg}"),
            Self::InitializationFailed(msg) => write!(f, "initialization failed: {msg}"),
            Self::Io(msg) => write!(f, "I/O error: {msg}"),
        }
    }
}

impl std::error::Error for BridgeError {}

impl From<SourceError> for BridgeError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::NotFound(path) => Self::ModuleNotFound(path),
            SourceError::Io { path, message } => Self::Io(format!("{}: {message}", path.display())),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScalarType;

    #[test]
    fn test_error_display() {
        let err = BridgeError::ModuleNotFound(PathBuf::from("missing.wgsl"));
        assert_eq!(err.to_string(), "module not found: missing.wgsl");

        let err = BridgeError::ArityMismatch {
            entry: "add".to_string(),
            expected: 2,
            found: 3,
        };
        assert_eq!(
            err.to_string(),
            "`add` takes 2 argument(s) but 3 were supplied"
        );

        let err = BridgeError::TypeMismatch {
            parameter: "flag".to_string(),
            expected: ShaderType::Scalar(ScalarType::Bool),
            found: "f32 1.0".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "cannot convert f32 1.0 to bool for parameter `flag`"
        );
    }

    #[test]
    fn test_source_error_conversion() {
        let err: BridgeError = SourceError::NotFound(PathBuf::from("a/b.wgsl")).into();
        assert_eq!(err, BridgeError::ModuleNotFound(PathBuf::from("a/b.wgsl")));

        let err: BridgeError = SourceError::Io {
            path: PathBuf::from("a.wgsl"),
            message: "denied".to_string(),
        }
        .into();
        assert!(matches!(err, BridgeError::Io(msg) if msg.contains("denied")));
    }
}
