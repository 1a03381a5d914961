//! Shader source composition and compilation.
//!
//! WGSL has no preprocessor, so module sources are first composed: every
//! `#include` line is replaced by the text of the file it names, searched
//! for in the ordered include paths. The composed text is then parsed and
//! validated by naga.
//!
//! # Include Syntax
//!
//! ```wgsl
//! #include "common/math.wgsl"
//! #include <common/color.wgsl>
//! ```
//!
//! Each include path is tried in order and the first existing file wins.
//! A file is included at most once per composition, so include cycles and
//! diamond includes are harmless.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{BridgeError, Result};
use crate::source::{SourceProvider, path};

/// A parsed and validated shader.
#[derive(Debug)]
pub struct CompiledShader {
    /// Composed WGSL source (all includes expanded).
    pub source: String,
    /// naga IR of the composed source.
    pub module: naga::Module,
    /// Validation results for `module`.
    pub info: naga::valid::ModuleInfo,
}

/// Composes module sources by resolving `#include` directives.
pub struct ShaderComposer {
    provider: Arc<dyn SourceProvider>,
    include_paths: Vec<PathBuf>,
}

impl ShaderComposer {
    /// Create a composer that searches `include_paths` in order.
    pub fn new(provider: Arc<dyn SourceProvider>, include_paths: Vec<PathBuf>) -> Self {
        Self {
            provider,
            include_paths,
        }
    }

    /// Ordered include search paths.
    pub fn include_paths(&self) -> &[PathBuf] {
        &self.include_paths
    }

    /// Read the module at `path` and expand its includes.
    ///
    /// Fails with [`BridgeError::ModuleNotFound`] if the module itself does not
    /// exist, and with [`BridgeError::CompilationFailed`] if an include cannot
    /// be found.
    pub fn compose_file(&self, path: &Path) -> Result<String> {
        let source = self.provider.read_to_string(path)?;
        let mut included = HashSet::new();
        included.insert(path::normalize(path));
        self.resolve_includes(path, &source, &mut included)
    }

    /// Compose, parse, and validate the module at `path`.
    pub fn compile_file(&self, path: &Path) -> Result<CompiledShader> {
        let source = self.compose_file(path)?;
        compile_source(path, source)
    }

    /// Resolve `#include "path"` directives recursively.
    fn resolve_includes(
        &self,
        origin: &Path,
        source: &str,
        included: &mut HashSet<PathBuf>,
    ) -> Result<String> {
        let mut result = String::with_capacity(source.len());

        for line in source.lines() {
            let Some(include) = parse_include_directive(line.trim()) else {
                result.push_str(line);
                result.push('\n');
                continue;
            };

            let resolved = self.find_include(include).ok_or_else(|| {
                BridgeError::CompilationFailed {
                    path: origin.to_path_buf(),
                    message: format!("include not found: \"{include}\""),
                }
            })?;

            // Skip if already included (prevent double-inclusion)
            if !included.insert(resolved.clone()) {
                log::trace!("skipping repeated include {}", resolved.display());
                continue;
            }
            log::trace!("including {} from {}", resolved.display(), origin.display());

            let include_source = self.provider.read_to_string(&resolved).map_err(|e| {
                BridgeError::CompilationFailed {
                    path: origin.to_path_buf(),
                    message: format!("failed to read include \"{include}\": {e}"),
                }
            })?;
            let expanded = self.resolve_includes(&resolved, &include_source, included)?;
            result.push_str(&expanded);
        }

        Ok(result)
    }

    /// First include path containing `include`.
    fn find_include(&self, include: &str) -> Option<PathBuf> {
        self.include_paths
            .iter()
            .map(|dir| path::resolve(dir, Path::new(include)))
            .find(|candidate| self.provider.exists(candidate))
    }
}

/// Parse and validate composed WGSL.
pub fn compile_source(path: &Path, source: String) -> Result<CompiledShader> {
    let module = naga::front::wgsl::parse_str(&source).map_err(|e| {
        BridgeError::CompilationFailed {
            path: path.to_path_buf(),
            message: format!("WGSL parse error:\n{}", e.emit_to_string(&source)),
        }
    })?;

    let mut validator = naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    );
    let info = validator
        .validate(&module)
        .map_err(|e| BridgeError::CompilationFailed {
            path: path.to_path_buf(),
            message: format!("validation error: {e}"),
        })?;

    Ok(CompiledShader {
        source,
        module,
        info,
    })
}

/// Parse a `#include "path"` directive, returning the path if found.
fn parse_include_directive(line: &str) -> Option<&str> {
    let rest = line.strip_prefix("#include")?;
    let rest = rest.trim();
    // Support both #include "path" and #include <path>
    if let Some(inner) = rest.strip_prefix('"') {
        inner.strip_suffix('"')
    } else if let Some(inner) = rest.strip_prefix('<') {
        inner.strip_suffix('>')
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    fn composer(mem: &MemorySource, include_paths: &[&str]) -> ShaderComposer {
        ShaderComposer::new(
            Arc::new(mem.clone()),
            include_paths.iter().map(PathBuf::from).collect(),
        )
    }

    #[test]
    fn test_include_resolution() {
        let mem = MemorySource::new();
        mem.insert("lib/math.wgsl", "fn twice(x: f32) -> f32 { return x * 2.0; }");
        mem.insert(
            "main.wgsl",
            "#include \"math.wgsl\"\nfn quad(x: f32) -> f32 { return twice(twice(x)); }",
        );

        let compiled = composer(&mem, &["lib"])
            .compile_file(Path::new("main.wgsl"))
            .unwrap();
        assert!(compiled.source.contains("fn twice"));
        assert_eq!(compiled.module.functions.len(), 2);
    }

    #[test]
    fn test_first_include_path_wins() {
        let mem = MemorySource::new();
        mem.insert("first/value.wgsl", "const VALUE: f32 = 1.0;");
        mem.insert("second/value.wgsl", "const VALUE: f32 = 2.0;");
        mem.insert("main.wgsl", "#include <value.wgsl>");

        let composed = composer(&mem, &["first", "second"])
            .compose_file(Path::new("main.wgsl"))
            .unwrap();
        assert!(composed.contains("1.0"));
        assert!(!composed.contains("2.0"));

        let composed = composer(&mem, &["missing", "second"])
            .compose_file(Path::new("main.wgsl"))
            .unwrap();
        assert!(composed.contains("2.0"));
    }

    #[test]
    fn test_double_include_prevention() {
        let mem = MemorySource::new();
        mem.insert("inc/shared.wgsl", "const SHARED: f32 = 42.0;");
        mem.insert("inc/a.wgsl", "#include \"shared.wgsl\"");
        mem.insert(
            "main.wgsl",
            "#include \"a.wgsl\"\n\
             #include \"shared.wgsl\"\n\
             fn shared_value() -> f32 { return SHARED; }",
        );

        let compiled = composer(&mem, &["inc"])
            .compile_file(Path::new("main.wgsl"))
            .unwrap();
        assert_eq!(compiled.source.matches("const SHARED").count(), 1);
    }

    #[test]
    fn test_include_cycle_terminates() {
        let mem = MemorySource::new();
        mem.insert("inc/a.wgsl", "#include \"b.wgsl\"\nconst A: f32 = 1.0;");
        mem.insert("inc/b.wgsl", "#include \"a.wgsl\"\nconst B: f32 = 2.0;");
        mem.insert("main.wgsl", "#include \"a.wgsl\"");

        let composed = composer(&mem, &["inc"])
            .compose_file(Path::new("main.wgsl"))
            .unwrap();
        assert_eq!(composed.matches("const A").count(), 1);
        assert_eq!(composed.matches("const B").count(), 1);
    }

    #[test]
    fn test_missing_include() {
        let mem = MemorySource::new();
        mem.insert("main.wgsl", "#include \"nonexistent.wgsl\"");

        let err = composer(&mem, &["lib"])
            .compose_file(Path::new("main.wgsl"))
            .unwrap_err();
        let BridgeError::CompilationFailed { message, .. } = &err else {
            panic!("unexpected error: {err}");
        };
        assert!(message.contains("nonexistent.wgsl"), "{message}");
    }

    #[test]
    fn test_missing_module() {
        let mem = MemorySource::new();
        let err = composer(&mem, &[])
            .compile_file(Path::new("absent.wgsl"))
            .unwrap_err();
        assert_eq!(err, BridgeError::ModuleNotFound(PathBuf::from("absent.wgsl")));
    }

    #[test]
    fn test_parse_error_is_compilation_failure() {
        let err = compile_source(Path::new("bad.wgsl"), "fn broken( -> f32 {".to_string())
            .unwrap_err();
        assert!(matches!(err, BridgeError::CompilationFailed { .. }));
    }

    #[test]
    fn test_validation_error_is_compilation_failure() {
        // Returning a bool from an f32 function parses but fails validation.
        let err = compile_source(
            Path::new("bad.wgsl"),
            "fn f() -> f32 { return true; }".to_string(),
        )
        .unwrap_err();
        assert!(matches!(err, BridgeError::CompilationFailed { .. }));
    }

    #[test]
    fn test_parse_include_directive() {
        assert_eq!(
            parse_include_directive(r#"#include "foo/bar.wgsl""#),
            Some("foo/bar.wgsl")
        );
        assert_eq!(
            parse_include_directive(r#"#include <foo/bar.wgsl>"#),
            Some("foo/bar.wgsl")
        );
        assert_eq!(parse_include_directive("#define FOO"), None);
        assert_eq!(parse_include_directive("// #include \"x\""), None);
    }
}
