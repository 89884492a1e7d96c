//! Destination path resolution.

use crate::error::AppError;
use std::ffi::OsStr;
use std::path::{Path, PathBuf, is_separator};

/// Where the patched image goes, and which parts came from defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputTarget {
    pub path: PathBuf,
    /// The file name was taken from the input.
    pub default_name: bool,
    /// The directory was taken from the configured default.
    pub default_dir: bool,
}

impl OutputTarget {
    #[must_use]
    pub fn file_name(&self) -> &OsStr {
        self.path.file_name().unwrap_or_default()
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }
}

/// Resolves the destination for `input`.
///
/// - no output: `default_dir/<input name>`
/// - output ending in a separator, or naming an existing directory:
///   `output/<input name>`
/// - otherwise `output` itself, under `default_dir` when it has no parent
///
/// # Errors
/// [`AppError::InputNotFound`] when `input` has no file name and
/// [`AppError::InvalidOutput`] when `output` names neither a directory nor a file.
pub fn resolve(input: &Path, output: Option<&Path>, default_dir: &Path) -> Result<OutputTarget, AppError> {
    let input_name = input
        .file_name()
        .ok_or_else(|| AppError::InputNotFound { path: input.to_path_buf(), context: None })?;

    let Some(output) = output.filter(|o| !o.as_os_str().is_empty()) else {
        return Ok(OutputTarget { path: default_dir.join(input_name), default_name: true, default_dir: true });
    };

    if names_directory(output) {
        return Ok(OutputTarget { path: output.join(input_name), default_name: true, default_dir: false });
    }

    let name = output
        .file_name()
        .ok_or_else(|| AppError::invalid_output(format!("{} has no file name", output.display())))?;

    match output.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => Ok(OutputTarget { path: parent.join(name), default_name: false, default_dir: false }),
        None => Ok(OutputTarget { path: default_dir.join(name), default_name: false, default_dir: true }),
    }
}

fn names_directory(path: &Path) -> bool {
    path.to_string_lossy().ends_with(is_separator) || path.is_dir()
}
