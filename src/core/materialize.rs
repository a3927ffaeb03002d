use std::fs;
use std::path::Path;

use crate::core::{Error, Result};

/// Ensure an editable config file exists, seeding it from its default
/// template exactly once. An existing target is left untouched, edits
/// included. Returns true when the file was created.
pub fn ensure(component_id: &str, target: &Path, template: &Path) -> Result<bool> {
    if target.exists() {
        return Ok(false);
    }

    let content = fs::read(template).map_err(|_| {
        Error::materialize_template_missing(component_id, template.display().to_string())
    })?;

    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            Error::internal_io(e, Some(format!("create {}", parent.display())))
        })?;
    }

    // Atomic write: write to temp file, then rename
    let filename = target.file_name().ok_or_else(|| {
        Error::internal_unexpected(format!("Invalid target path: {}", target.display()))
    })?;
    let tmp = target.with_file_name(format!("{}.tmp", filename.to_string_lossy()));

    fs::write(&tmp, &content)
        .map_err(|e| Error::internal_io(e, Some("write temp file".to_string())))?;
    fs::rename(&tmp, target)
        .map_err(|e| Error::internal_io(e, Some("rename temp file".to_string())))?;

    Ok(true)
}
