use std::path::Path;

use super::{SourceError, SourceProvider};

/// Reads module sources from the native filesystem.
///
/// All I/O is blocking (`std::fs`), matching the synchronous load contract.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSystemSource;

impl FileSystemSource {
    pub fn new() -> Self {
        Self
    }
}

impl SourceProvider for FileSystemSource {
    fn read_to_string(&self, path: &Path) -> Result<String, SourceError> {
        std::fs::read_to_string(path).map_err(|err| SourceError::from_io(path, err))
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_is_not_found() {
        let provider = FileSystemSource::new();
        let path = Path::new("definitely/not/here.wgsl");
        assert!(!provider.exists(path));
        assert_eq!(
            provider.read_to_string(path),
            Err(SourceError::NotFound(path.to_path_buf()))
        );
    }

    #[test]
    fn reads_existing_file() {
        let path = std::env::temp_dir().join(format!("shadercall-fs-{}.wgsl", std::process::id()));
        std::fs::write(&path, "fn one() -> f32 { return 1.0; }").unwrap();

        let provider = FileSystemSource::new();
        assert!(provider.exists(&path));
        assert!(provider.read_to_string(&path).unwrap().contains("fn one"));

        std::fs::remove_file(&path).unwrap();
    }
}
