//! PE/COFF container: just enough of the headers to find the CLI header,
//! translate RVAs and maintain the optional-header checksum.

use crate::bytes::ByteView;
use crate::error::UnreadableImageError;

pub(crate) const DOS_MAGIC: u16 = 0x5A4D;
pub(crate) const PE_SIGNATURE: u32 = 0x0000_4550;
pub(crate) const PE32_MAGIC: u16 = 0x010B;
pub(crate) const PE32_PLUS_MAGIC: u16 = 0x020B;
pub(crate) const CLI_DIRECTORY: usize = 14;

const LFANEW_OFFSET: usize = 0x3C;
const COFF_HEADER_SIZE: usize = 20;
const SECTION_HEADER_SIZE: usize = 40;
const CHECKSUM_OFFSET: usize = 64;

#[derive(Debug, Clone, Copy)]
struct Section {
    virtual_address: u32,
    virtual_size: u32,
    raw_offset: u32,
    raw_size: u32,
}

/// Parsed PE headers of a CLI image.
#[derive(Debug, Clone)]
pub(crate) struct PeLayout {
    sections: Vec<Section>,
    /// File offset of the optional-header `CheckSum` field.
    pub(crate) checksum_offset: usize,
    pub(crate) cli_header_rva: u32,
}

impl PeLayout {
    pub(crate) fn parse(view: ByteView<'_>) -> Result<Self, UnreadableImageError> {
        if view.len() < 0x40 || view.u16(0)? != DOS_MAGIC {
            return Err(UnreadableImageError::format("missing MZ header"));
        }

        let pe = view.u32(LFANEW_OFFSET)? as usize;
        if view.u32(pe)? != PE_SIGNATURE {
            return Err(UnreadableImageError::format("missing PE signature"));
        }

        let coff = pe + 4;
        let section_count = usize::from(view.u16(coff + 2)?);
        let optional_size = usize::from(view.u16(coff + 16)?);
        let optional = coff + COFF_HEADER_SIZE;

        let (count_offset, directories) = match view.u16(optional)? {
            PE32_MAGIC => (optional + 92, optional + 96),
            PE32_PLUS_MAGIC => (optional + 108, optional + 112),
            magic => {
                return Err(UnreadableImageError::format(format!(
                    "unknown optional header magic 0x{magic:04X}"
                )));
            },
        };

        if (view.u32(count_offset)? as usize) <= CLI_DIRECTORY {
            return Err(UnreadableImageError::format("not a CLI image: no CLI header directory"));
        }
        let cli_header_rva = view.u32(directories + CLI_DIRECTORY * 8)?;
        if cli_header_rva == 0 {
            return Err(UnreadableImageError::format("not a CLI image: empty CLI header directory"));
        }

        let table = optional + optional_size;
        let sections = (0..section_count)
            .map(|i| {
                let header = table + i * SECTION_HEADER_SIZE;
                Ok(Section {
                    virtual_size: view.u32(header + 8)?,
                    virtual_address: view.u32(header + 12)?,
                    raw_size: view.u32(header + 16)?,
                    raw_offset: view.u32(header + 20)?,
                })
            })
            .collect::<Result<Vec<_>, UnreadableImageError>>()?;

        Ok(Self { sections, checksum_offset: optional + CHECKSUM_OFFSET, cli_header_rva })
    }

    /// Maps an RVA to a file offset inside a section's raw data.
    pub(crate) fn offset_of(&self, rva: u32) -> Result<usize, UnreadableImageError> {
        self.sections
            .iter()
            .find_map(|s| {
                let delta = rva.checked_sub(s.virtual_address)?;
                (delta < s.virtual_size.max(s.raw_size) && delta < s.raw_size)
                    .then(|| s.raw_offset as usize + delta as usize)
            })
            .ok_or_else(|| {
                UnreadableImageError::format(format!("RVA 0x{rva:08X} is outside every section"))
            })
    }
}

/// Standard PE image checksum: 16-bit words folded with carry, the
/// checksum field itself treated as zero, plus the file length.
pub(crate) fn checksum(data: &[u8], checksum_offset: usize) -> u32 {
    let mut sum: u64 = 0;
    for (index, chunk) in data.chunks(2).enumerate() {
        let offset = index * 2;
        if offset == checksum_offset || offset == checksum_offset + 2 {
            continue;
        }
        let word = match chunk {
            [lo, hi] => u16::from_le_bytes([*lo, *hi]),
            [lo] => u16::from(*lo),
            _ => 0,
        };
        sum += u64::from(word);
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    sum = (sum & 0xFFFF) + (sum >> 16);
    (sum as u32).wrapping_add(data.len() as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_pe_input() {
        let err = PeLayout::parse(ByteView::new(b"definitely not a portable executable image at all..........")).unwrap_err();
        assert!(err.is_format());
        assert!(err.to_string().contains("MZ"));
    }

    #[test]
    fn test_checksum_ignores_checksum_field() {
        let mut data = vec![0u8; 128];
        data[10] = 0x11;
        data[64] = 0xAA;
        let with_garbage = checksum(&data, 64);
        data[64] = 0;
        assert_eq!(checksum(&data, 64), with_garbage);
        assert_eq!(with_garbage, 0x11 + 128);
    }

    #[test]
    fn test_checksum_folds_carry() {
        let data = [0xFF, 0xFF, 0x02, 0x00];
        // 0xFFFF + 0x0002 = 0x10001 -> folded to 0x0002, plus length 4
        assert_eq!(checksum(&data, 100), 0x0002 + 4);
    }
}
