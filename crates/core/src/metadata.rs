//! CLI header, metadata root and stream directory.

use crate::bytes::ByteView;
use crate::error::UnreadableImageError;
use crate::pe::PeLayout;
use crate::tables::TableLayout;

pub(crate) const METADATA_SIGNATURE: u32 = 0x424A_5342;
const MAX_STREAM_NAME: usize = 32;

#[derive(Debug, Clone, Copy)]
pub(crate) struct Stream {
    pub(crate) offset: usize,
    pub(crate) size: usize,
}

/// Where the pieces of the metadata live inside the image file.
#[derive(Debug, Clone)]
pub(crate) struct MetadataLayout {
    pub(crate) version: String,
    pub(crate) strings: Stream,
    pub(crate) tables: TableLayout,
}

impl MetadataLayout {
    pub(crate) fn parse(view: ByteView<'_>, pe: &PeLayout) -> Result<Self, UnreadableImageError> {
        let cli = pe.offset_of(pe.cli_header_rva)?;
        let metadata_rva = view.u32(cli + 8)?;
        let metadata_size = view.u32(cli + 12)? as usize;
        if metadata_rva == 0 || metadata_size == 0 {
            return Err(UnreadableImageError::format("CLI header has no metadata directory"));
        }

        let root = pe.offset_of(metadata_rva)?;
        view.slice(root, metadata_size)?;
        if view.u32(root)? != METADATA_SIGNATURE {
            return Err(UnreadableImageError::format("missing BSJB metadata signature"));
        }

        let version_len = view.u32(root + 12)? as usize;
        let version = String::from_utf8_lossy(view.c_str(root + 16, root + 16 + version_len)?)
            .into_owned();
        let header = root + 16 + version_len;
        let stream_count = view.u16(header + 2)?;

        let mut strings = None;
        let mut tables = None;
        let mut cursor = header + 4;
        for _ in 0..stream_count {
            let stream = Stream {
                offset: root + view.u32(cursor)? as usize,
                size: view.u32(cursor + 4)? as usize,
            };
            let name = view.c_str(cursor + 8, cursor + 8 + MAX_STREAM_NAME)?;
            cursor += 8 + (name.len() + 4) / 4 * 4;

            if stream.offset + stream.size > root + metadata_size {
                return Err(UnreadableImageError::format(format!(
                    "stream {} exceeds the metadata block",
                    String::from_utf8_lossy(name)
                )));
            }

            match name {
                b"#Strings" => strings = Some(stream),
                b"#~" | b"#-" => tables = Some(stream),
                _ => {},
            }
        }

        let strings = strings.ok_or_else(|| UnreadableImageError::format("missing #Strings stream"))?;
        let tables = tables.ok_or_else(|| UnreadableImageError::format("missing tables stream"))?;
        let tables = TableLayout::parse(view, tables.offset, tables.size)?;

        Ok(Self { version, strings, tables })
    }

    /// Resolves a `#Strings` heap index.
    pub(crate) fn string(&self, view: ByteView<'_>, index: u32) -> Result<String, UnreadableImageError> {
        let index = index as usize;
        if index >= self.strings.size {
            return Err(UnreadableImageError::format(format!(
                "string index 0x{index:X} outside the #Strings heap"
            )));
        }
        let start = self.strings.offset + index;
        let bytes = view.c_str(start, self.strings.offset + self.strings.size)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}
