use crate::capture::model::{Capture, EndpointKind};
use crate::error::{CoreError, CoreResult};
use std::fs;
use std::path::Path;
use walkdir::WalkDir;

/// Reads every `core.<endpoint>.xml` directly inside `dir`, ordered by endpoint.
pub fn load_capture_dir(dir: &Path) -> CoreResult<Vec<Capture>> {
    if !dir.is_dir() {
        return Err(CoreError::InvalidInput(format!(
            "capture directory {} does not exist",
            dir.display()
        )));
    }
    let mut captures = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| CoreError::Io(e.into()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        match EndpointKind::from_file_name(&name) {
            Some(endpoint) => {
                let text = fs::read_to_string(entry.path())?;
                captures.push(Capture::new(endpoint, text));
            }
            None => tracing::debug!(file = %name, "ignoring non-capture file"),
        }
    }
    if captures.is_empty() {
        return Err(CoreError::InvalidInput(format!(
            "no core.<endpoint>.xml captures found in {}",
            dir.display()
        )));
    }
    captures.sort_by_key(|c| c.endpoint);
    Ok(captures)
}
