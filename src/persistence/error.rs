//! Persistence-specific error helpers

use std::fs;
use std::io::Write;
use std::path::Path;

use crate::persistence::{PersistenceError, PersistenceResult};

/// Helper trait for persistence-specific error contexts
pub trait PersistenceErrorContext<T> {
    fn persistence_context(self, context: &str) -> PersistenceResult<T>;
}

impl<T, E> PersistenceErrorContext<T> for Result<T, E>
where
    E: std::error::Error + 'static,
{
    fn persistence_context(self, context: &str) -> PersistenceResult<T> {
        self.map_err(|e| {
            PersistenceError::IoError(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("{}: {}", context, e),
            ))
        })
    }
}

/// Write `data` to `path` so that readers see either the old file or the
/// complete new one, never a partial write.
pub fn atomic_write<P: AsRef<Path>>(path: P, data: &[u8]) -> PersistenceResult<()> {
    let path = path.as_ref();
    let file_name = path
        .file_name()
        .ok_or_else(|| corrupted_data(format!("not a file path: {}", path.display())))?;
    let mut temp_name = file_name.to_os_string();
    temp_name.push(".tmp");
    let temp_path = path.with_file_name(temp_name);

    let result = (|| -> std::io::Result<()> {
        let mut file = fs::File::create(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        fs::rename(&temp_path, path)
    })();

    if let Err(e) = result {
        // The original file is untouched; only the temp file may be left over
        let _ = fs::remove_file(&temp_path);
        return Err(PersistenceError::IoError(std::io::Error::new(
            e.kind(),
            format!("Save failed for {}: {}", path.display(), e),
        )));
    }
    Ok(())
}

/// Create a corrupted data error
pub fn corrupted_data(reason: impl Into<String>) -> PersistenceError {
    PersistenceError::CorruptedData(reason.into())
}

/// Create a version mismatch error
pub fn version_mismatch(expected: u32, found: u32) -> PersistenceError {
    PersistenceError::VersionMismatch { expected, found }
}
