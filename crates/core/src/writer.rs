//! Serializes a [`Module`] back into an image file.
//!
//! Only field flags are written back into the original bytes. The PE checksum
//! is refreshed when the input carried one.

use crate::error::{WriteError, WriteErrorExt};
use crate::model::Module;
use crate::pe;
use crate::tables::id;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use tracing::{debug, info, warn};

impl Module {
    /// The image bytes with the current field attributes applied.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let image = &self.image;
        let mut bytes = image.bytes.clone();

        for field in self.fields() {
            let offset = image.tables.row_offset(id::FIELD, field.row);
            bytes[offset..offset + 2].copy_from_slice(&field.attributes.bits().to_le_bytes());
        }

        let at = image.checksum_offset;
        if let Some(slot) = bytes.get(at..at + 4)
            && slot.iter().any(|&b| b != 0)
        {
            let sum = pe::checksum(&bytes, at);
            bytes[at..at + 4].copy_from_slice(&sum.to_le_bytes());
        }

        bytes
    }

    /// Writes the image to `path`, creating missing parent directories.
    ///
    /// The bytes go to a sibling temporary file which is synced and then
    /// renamed over `path`, so a failed run never leaves a partial image.
    ///
    /// # Errors
    /// [`WriteError::InvalidPath`] when `path` has no file name, and
    /// [`WriteError::Io`] when the directory, the temporary file or the final
    /// rename cannot be completed (permissions, locked destination).
    pub fn write(&self, path: impl AsRef<Path>) -> Result<(), WriteError> {
        let path = path.as_ref();
        let Some(file_name) = path.file_name() else {
            return Err(WriteError::InvalidPath {
                message: format!("{} does not name a file", path.display()).into(),
                context: None,
            });
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .context(format!("Failed to create directory {}", parent.display()))?;
        }

        let mut temp_name = file_name.to_os_string();
        temp_name.push(format!(".{}.deconst.tmp", std::process::id()));
        let temp = path.with_file_name(temp_name);

        let result = self.write_temp(&temp).and_then(|()| replace(&temp, path));
        if result.is_err()
            && let Err(e) = fs::remove_file(&temp)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            warn!(path = %temp.display(), error = %e, "Failed to remove temporary image");
        }
        result?;

        info!(path = %path.display(), "Module image written");
        Ok(())
    }

    fn write_temp(&self, temp: &Path) -> Result<(), WriteError> {
        let mut file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(temp)
            .context(format!("Failed to create {}", temp.display()))?;
        file.write_all(&self.to_bytes()).context("Write failed")?;
        file.sync_all().context("Sync failed")?;
        debug!(path = %temp.display(), "Temporary image synced");
        Ok(())
    }
}

fn replace(temp: &Path, target: &Path) -> Result<(), WriteError> {
    match fs::rename(temp, target) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
            fs::remove_file(target)
                .context(format!("Failed to replace existing file {}", target.display()))?;
            fs::rename(temp, target).context(swap_context(temp, target))
        },
        Err(err) => Err(WriteError::Io { source: err, context: Some(swap_context(temp, target).into()) }),
    }
}

fn swap_context(temp: &Path, target: &Path) -> String {
    format!("Failed to move {} to {}", temp.display(), target.display())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::strip_literals;
    use crate::synth::{FieldSpec, ImageBuilder, TypeSpec};

    fn builder() -> ImageBuilder {
        ImageBuilder::new("Writer.dll").ty(
            TypeSpec::new("Demo", "Limits")
                .field(FieldSpec::literal("Max"))
                .field(FieldSpec::static_field("Cache")),
        )
    }

    #[test]
    fn test_unchanged_module_round_trips_exactly() {
        let bytes = builder().checksum(true).build();
        let module = Module::from_bytes(bytes.clone()).unwrap();
        assert_eq!(module.to_bytes(), bytes);
    }

    #[test]
    fn test_only_flag_bytes_change() {
        let original = builder().build();
        let mut module = Module::from_bytes(original.clone()).unwrap();
        strip_literals(&mut module);
        let patched = module.to_bytes();

        assert_eq!(patched.len(), original.len());
        let offset = module.image.tables.row_offset(id::FIELD, 1);
        let differing: Vec<_> = (0..original.len()).filter(|&i| original[i] != patched[i]).collect();
        assert_eq!(differing, [offset]);
        assert_eq!(patched[offset], original[offset] & !0x40);
    }

    #[test]
    fn test_patches_field_row_behind_pointer() {
        let original = builder().pointer_tables(true).build();
        let mut module = Module::from_bytes(original.clone()).unwrap();
        assert_eq!(strip_literals(&mut module), 1);
        let patched = module.to_bytes();

        // "Max" is declared first but stored in the last Field row
        let offset = module.image.tables.row_offset(id::FIELD, 2);
        let differing: Vec<_> = (0..original.len()).filter(|&i| original[i] != patched[i]).collect();
        assert_eq!(differing, [offset]);
        assert_eq!(patched[offset], original[offset] & !0x40);

        let reread = Module::from_bytes(patched).unwrap();
        let literals: Vec<_> = reread.fields().filter(|f| f.is_literal()).collect();
        assert!(literals.is_empty());
    }

    #[test]
    fn test_pe32_plus_checksum_is_recomputed() {
        let mut module = Module::from_bytes(builder().pe32_plus(true).checksum(true).build()).unwrap();
        strip_literals(&mut module);
        let patched = module.to_bytes();

        let at = module.image.checksum_offset;
        let stored = u32::from_le_bytes(patched[at..at + 4].try_into().unwrap());
        assert_eq!(stored, pe::checksum(&patched, at));
    }

    #[test]
    fn test_checksum_is_recomputed_when_present() {
        let mut module = Module::from_bytes(builder().checksum(true).build()).unwrap();
        strip_literals(&mut module);
        let patched = module.to_bytes();

        let at = module.image.checksum_offset;
        let stored = u32::from_le_bytes(patched[at..at + 4].try_into().unwrap());
        assert_eq!(stored, pe::checksum(&patched, at));
    }

    #[test]
    fn test_zero_checksum_stays_zero() {
        let mut module = Module::from_bytes(builder().build()).unwrap();
        strip_literals(&mut module);
        let at = module.image.checksum_offset;
        assert_eq!(&module.to_bytes()[at..at + 4], &[0; 4]);
    }

    #[test]
    fn test_write_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested").join("out").join("Writer.dll");
        let module = Module::from_bytes(builder().build()).unwrap();

        module.write(&target).unwrap();

        assert_eq!(fs::read(&target).unwrap(), module.to_bytes());
        let leftovers: Vec<_> = fs::read_dir(target.parent().unwrap()).unwrap().collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn test_write_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("Writer.dll");
        fs::write(&target, b"stale").unwrap();

        let module = Module::from_bytes(builder().build()).unwrap();
        module.write(&target).unwrap();

        assert_eq!(fs::read(&target).unwrap(), module.to_bytes());
    }

    #[test]
    fn test_write_rejects_path_without_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let module = Module::from_bytes(builder().build()).unwrap();
        let err = module.write(dir.path().join("..")).unwrap_err();
        assert!(matches!(err, WriteError::InvalidPath { .. }));
    }
}
