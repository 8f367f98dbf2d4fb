//! Path resolution and the directory-escape guard (§4.5).

use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

/// Reject any requested file name that could walk outside the directory it's
/// being resolved under — no `..`, no absolute paths. Pure and lexical: it
/// never touches the filesystem, so it works equally for outputs that don't
/// exist yet.
pub fn join_within(root: &Path, requested: &str) -> Result<PathBuf> {
    let requested_path = Path::new(requested);
    let escapes = requested_path
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_) | Component::RootDir));
    if escapes {
        return Err(Error::PathEscapesStageDirectory(requested_path.to_path_buf()));
    }
    Ok(root.join(requested_path))
}
