use std::path::{Component, Path, PathBuf};

/// Lexically normalize a path.
///
/// - Treats backslashes as separators
/// - Drops `.` segments
/// - Resolves `..` against the preceding segment; leading `..` segments of a
///   relative path are kept, and `..` directly under a root is dropped
///
/// The filesystem is never consulted, so symlinks are not resolved.
pub fn normalize(path: &Path) -> PathBuf {
    let text = path.to_string_lossy().replace('\\', "/");
    let mut normalized = PathBuf::new();
    let mut depth = 0usize;

    for component in Path::new(&text).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if depth > 0 {
                    normalized.pop();
                    depth -= 1;
                } else if !normalized.has_root() {
                    normalized.push("..");
                }
            }
            Component::Normal(segment) => {
                normalized.push(segment);
                depth += 1;
            }
            Component::RootDir | Component::Prefix(_) => normalized.push(component.as_os_str()),
        }
    }

    normalized
}

/// Join `path` onto `base` unless it is already absolute, then normalize.
pub fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&base.join(path))
    }
}
