//! Command line arguments.
//!
//! Uses clap for CLI parsing with:
//! - Help text (`--help`)
//! - Validation and clear error messages

use std::path::PathBuf;

use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use shadercall::{Arguments, BackendType, DeviceParameters, Value};

/// Execution backend selection for CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum CliBackend {
    /// Use the GPU when available, otherwise the CPU executor.
    #[default]
    Auto,
    /// Require a GPU through wgpu.
    Wgpu,
    /// Always use the CPU executor.
    Cpu,
}

impl From<CliBackend> for BackendType {
    fn from(value: CliBackend) -> Self {
        match value {
            CliBackend::Auto => BackendType::Auto,
            CliBackend::Wgpu => BackendType::Wgpu,
            CliBackend::Cpu => BackendType::Cpu,
        }
    }
}

/// Invoke a function exported by a WGSL module.
#[derive(Parser, Debug)]
#[command(
    name = "shadercall",
    version,
    about = "Invoke a function exported by a WGSL module",
    long_about = "Loads a WGSL module, resolving #include directives against the include \
                  paths, and calls one of its functions.\n\n\
                  Arguments are either all positional (`1.0 2.0`) or all named \
                  (`a=1.0 b=2.0`). Literals: true, 7 (i32), 7u (u32), 1.5 (f32), [1.0, 2.0] (vector)."
)]
pub struct CliArgs {
    /// Path of the module to load.
    pub module: PathBuf,

    /// Function to invoke. Required unless --list is given.
    #[arg(required_unless_present = "list")]
    pub entry: Option<String>,

    /// Arguments: literals, or name=literal pairs.
    #[arg(allow_negative_numbers = true)]
    pub args: Vec<String>,

    /// Directory searched for #include files (repeatable, searched in order).
    #[arg(short = 'I', long = "include")]
    pub include: Vec<PathBuf>,

    /// Directory relative paths are resolved against (default: current directory).
    #[arg(long)]
    pub base_dir: Option<PathBuf>,

    /// Execution backend to use.
    #[arg(long, default_value = "auto", value_enum)]
    pub backend: CliBackend,

    /// List the module's exported functions and exit.
    #[arg(long)]
    pub list: bool,

    /// Enable GPU validation layers.
    #[arg(long, conflicts_with = "no_validation")]
    pub validation: bool,

    /// Disable GPU validation layers.
    #[arg(long, conflicts_with = "validation")]
    pub no_validation: bool,
}

impl CliArgs {
    /// Device parameters described by the flags.
    pub fn device_parameters(&self) -> DeviceParameters {
        let mut params = DeviceParameters::new()
            .with_backend(self.backend.into())
            .with_include_paths(self.include.iter().cloned());
        if let Some(dir) = &self.base_dir {
            params = params.with_base_dir(dir.clone());
        }
        if self.validation {
            params = params.with_validation(true);
        } else if self.no_validation {
            params = params.with_validation(false);
        }
        params
    }

    /// Parse the call arguments, reporting bad literals as a usage error.
    pub fn call_arguments(&self) -> Result<Arguments, clap::Error> {
        parse_call_arguments(&self.args)
            .map_err(|message| Self::command().error(ErrorKind::InvalidValue, message))
    }
}

/// Parse literals into positional or named arguments.
///
/// An argument is named when it has the form `identifier=literal`. Mixing
/// both styles is rejected.
pub fn parse_call_arguments(raw: &[String]) -> Result<Arguments, String> {
    let mut positional = Vec::new();
    let mut named = Vec::new();

    for arg in raw {
        match split_named(arg) {
            Some((name, literal)) => {
                let value = parse_literal(literal)?;
                named.push((name.to_string(), value));
            }
            None => positional.push(parse_literal(arg)?),
        }
    }

    match (positional.is_empty(), named.is_empty()) {
        (_, true) => Ok(Arguments::Positional(positional)),
        (true, false) => Ok(Arguments::Named(named)),
        (false, false) => Err("cannot mix positional and named arguments".to_string()),
    }
}

fn split_named(arg: &str) -> Option<(&str, &str)> {
    let (name, literal) = arg.split_once('=')?;
    let mut chars = name.chars();
    let first = chars.next()?;
    let is_identifier = (first.is_alphabetic() || first == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_');
    is_identifier.then_some((name, literal))
}

fn parse_literal(literal: &str) -> Result<Value, String> {
    literal.parse::<Value>().map_err(|e| e.to_string())
}
