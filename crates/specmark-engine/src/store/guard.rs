use relative_path::RelativePath;

use super::{ConflictDescriptor, DocumentStore, StoreError};

/// Write `content` only if the document has not changed since it was read.
///
/// `expected_mtime` is the modification time the caller last saw. When it
/// is given and `force` is false, the current time is read first and a
/// mismatch refuses the write with [`StoreError::Conflict`]; nothing is
/// written in that case. `force` skips the check. On success the new
/// modification time is returned, to be passed as `expected_mtime` next
/// time.
///
/// The check and the write are two separate store calls, so a writer that
/// lands between them is not detected.
pub fn check_and_write<S: DocumentStore + ?Sized>(
    store: &S,
    path: &RelativePath,
    content: &str,
    expected_mtime: Option<i64>,
    force: bool,
) -> Result<i64, StoreError> {
    if !force && let Some(expected_mtime) = expected_mtime {
        let actual_mtime = store.modified_at(path)?;
        if actual_mtime != expected_mtime {
            log::warn!(
                "refusing to write {path}: modified at {actual_mtime}, expected {expected_mtime}"
            );
            return Err(StoreError::Conflict(ConflictDescriptor {
                expected_mtime,
                actual_mtime,
            }));
        }
    }
    if force {
        log::info!("force-writing {path}");
    }

    let written = store.write_unchecked(path, content)?;
    log::info!("saved {path} ({} bytes)", content.len());
    Ok(written)
}
