//! Shared plumbing for file-backed text sources.

use std::path::Path;

use strata_core::MetadataHandle;
use tracing::warn;

/// Read a file as UTF-8, enforcing the shared file-source rules:
/// binary content is rejected (recorded as an error), and a file whose
/// extension is not one of the expected ones draws a warning but is
/// still parsed.
pub(crate) fn read_utf8(
    path: &Path,
    expected_exts: &[&str],
    handle: &MetadataHandle,
) -> Option<String> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    if !expected_exts.contains(&ext.as_str()) {
        warn!(
            path = %path.display(),
            extension = %ext,
            "unexpected file extension, attempting to parse anyway"
        );
    }

    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => {
            handle.record_failure(format!("failed to read {}: {err}", path.display()));
            return None;
        }
    };

    match String::from_utf8(bytes) {
        Ok(text) => Some(text),
        Err(_) => {
            handle.record_failure(format!(
                "{} contains binary or non-UTF-8 content",
                path.display()
            ));
            None
        }
    }
}

/// Availability rule shared by all file sources.
pub(crate) fn file_available(path: &Path) -> bool {
    path.is_file()
}

/// Best-effort size for metadata.
pub(crate) fn file_size(path: &Path) -> Option<u64> {
    std::fs::metadata(path).map(|m| m.len()).ok()
}
