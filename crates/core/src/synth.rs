//! Synthesizes small but well-formed module images.
//!
//! The output is a PE32 (or PE32+) DLL with a single `.text` section holding
//! the CLI header and a metadata block with the Module, TypeDef, Field,
//! Constant, PropertyMap, Property and NestedClass tables. There is no IL: the
//! images are meant for exercising metadata tooling, not for loading into a
//! runtime.
//!
//! [`ImageBuilder::pointer_tables`] switches to the uncompressed `#-` layout
//! that edit-and-continue compilers leave behind: fields and properties are
//! stored in reverse physical order and reached through `FieldPtr` and
//! `PropertyPtr`.
//!
//! ```rust
//! use deconst_core::Module;
//! use deconst_core::synth::{FieldSpec, ImageBuilder, TypeSpec};
//!
//! let bytes = ImageBuilder::new("Demo.dll")
//!     .ty(TypeSpec::new("Demo", "Limits").field(FieldSpec::literal("Max")))
//!     .build();
//! let module = Module::from_bytes(bytes).unwrap();
//! assert_eq!(module.fields().filter(|f| f.is_literal()).count(), 1);
//! ```

use crate::metadata::METADATA_SIGNATURE;
use crate::model::FieldAttributes;
use crate::pe::{self, CLI_DIRECTORY, DOS_MAGIC, PE_SIGNATURE, PE32_MAGIC, PE32_PLUS_MAGIC};
use crate::tables::{TABLE_COUNT, TableLayout, heap, id, schema};
use fxhash::FxHashMap;

const FILE_ALIGNMENT: usize = 0x200;
const SECTION_ALIGNMENT: u32 = 0x2000;
const TEXT_RVA: u32 = 0x2000;
const PE_OFFSET: usize = 0x80;
const PE32_HEADER_SIZE: usize = 224;
const PE32_PLUS_HEADER_SIZE: usize = 240;
const CLI_HEADER_SIZE: usize = 72;
const RUNTIME_VERSION: &str = "v4.0.30319";
const SORTED_TABLES: u64 = 0x0000_1600_3301_FA00;

const FIELD_SIGNATURE: u32 = 1;
const PROPERTY_SIGNATURE: u32 = 4;
const CONSTANT_VALUE: u32 = 8;
const BLOB_HEAP: [u8; 16] = [
    0x00, // empty blob
    0x02, 0x06, 0x08, // FIELD int32
    0x03, 0x28, 0x00, 0x08, // PROPERTY instance, 0 params, int32
    0x04, 0x2A, 0x00, 0x00, 0x00, // int32 42
    0x00, 0x00, 0x00,
];
const ELEMENT_TYPE_I4: u32 = 0x08;

const TYPE_PUBLIC: u32 = 0x0000_0001;
const TYPE_NESTED_PUBLIC: u32 = 0x0000_0002;
const TYPE_BEFORE_FIELD_INIT: u32 = 0x0010_0000;

/// A field to emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub attributes: FieldAttributes,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, attributes: FieldAttributes) -> Self {
        Self { name: name.into(), attributes }
    }

    /// `public const int`: static, literal, with a default value.
    pub fn literal(name: impl Into<String>) -> Self {
        Self::new(
            name,
            FieldAttributes::PUBLIC
                | FieldAttributes::STATIC
                | FieldAttributes::LITERAL
                | FieldAttributes::HAS_DEFAULT,
        )
    }

    /// `public static int`.
    pub fn static_field(name: impl Into<String>) -> Self {
        Self::new(name, FieldAttributes::PUBLIC | FieldAttributes::STATIC)
    }

    /// `public int`.
    pub fn instance(name: impl Into<String>) -> Self {
        Self::new(name, FieldAttributes::PUBLIC)
    }
}

/// A type to emit, with its members and nested types.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TypeSpec {
    pub namespace: String,
    pub name: String,
    pub fields: Vec<FieldSpec>,
    pub properties: Vec<String>,
    pub nested: Vec<Self>,
}

impl TypeSpec {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self { namespace: namespace.into(), name: name.into(), ..Self::default() }
    }

    #[must_use]
    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn property(mut self, name: impl Into<String>) -> Self {
        self.properties.push(name.into());
        self
    }

    #[must_use]
    pub fn nested(mut self, ty: Self) -> Self {
        self.nested.push(ty);
        self
    }
}

/// Builder for a synthetic module image.
#[derive(Debug, Clone)]
pub struct ImageBuilder {
    module_name: String,
    types: Vec<TypeSpec>,
    checksum: bool,
    pe32_plus: bool,
    pointer_tables: bool,
    extra_data: bool,
}

impl ImageBuilder {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            types: Vec::new(),
            checksum: false,
            pe32_plus: false,
            pointer_tables: false,
            extra_data: false,
        }
    }

    /// Adds a top-level type.
    #[must_use]
    pub fn ty(mut self, ty: TypeSpec) -> Self {
        self.types.push(ty);
        self
    }

    /// Stores a valid PE checksum instead of zero.
    #[must_use]
    pub const fn checksum(mut self, enabled: bool) -> Self {
        self.checksum = enabled;
        self
    }

    /// Emits a PE32+ optional header instead of PE32.
    #[must_use]
    pub const fn pe32_plus(mut self, enabled: bool) -> Self {
        self.pe32_plus = enabled;
        self
    }

    /// Emits a `#-` stream whose Field and Property rows are stored in
    /// reverse and listed in declaration order by `FieldPtr`/`PropertyPtr`.
    #[must_use]
    pub const fn pointer_tables(mut self, enabled: bool) -> Self {
        self.pointer_tables = enabled;
        self
    }

    /// Sets the `EXTRA_DATA` heap flag and writes the 4 bytes it announces
    /// after the row counts.
    #[must_use]
    pub const fn extra_data(mut self, enabled: bool) -> Self {
        self.extra_data = enabled;
        self
    }

    #[must_use]
    pub fn build(&self) -> Vec<u8> {
        let metadata = self.metadata();
        let mut image = pe_image(&metadata, self.pe32_plus);
        if self.checksum {
            let at = checksum_offset();
            let sum = pe::checksum(&image, at);
            image[at..at + 4].copy_from_slice(&sum.to_le_bytes());
        }
        image
    }

    fn metadata(&self) -> Vec<u8> {
        let mut strings = Strings::default();
        let mut rows: [Vec<Vec<u32>>; TABLE_COUNT] = std::array::from_fn(|_| Vec::new());

        let module_name = strings.intern(&self.module_name);
        rows[id::MODULE].push(vec![0, module_name, 1, 0, 0]);

        let module_type = strings.intern("<Module>");
        rows[id::TYPE_DEF].push(vec![0, module_type, 0, 0, 1, 1]);

        // declaration order; physical rows are assigned once all are known
        let mut fields: Vec<&FieldSpec> = Vec::new();
        let mut properties: Vec<&str> = Vec::new();

        // pre-order with parents before children; rows start at 2
        let mut stack: Vec<(&TypeSpec, Option<u32>)> =
            self.types.iter().rev().map(|t| (t, None)).collect();
        while let Some((ty, enclosing)) = stack.pop() {
            let row = rows[id::TYPE_DEF].len() as u32 + 1;
            let visibility = if enclosing.is_some() { TYPE_NESTED_PUBLIC } else { TYPE_PUBLIC };
            let first_field = fields.len() as u32 + 1;
            let (name, namespace) = (strings.intern(&ty.name), strings.intern(&ty.namespace));
            rows[id::TYPE_DEF].push(vec![
                visibility | TYPE_BEFORE_FIELD_INIT,
                name,
                namespace,
                0,
                first_field,
                1,
            ]);
            fields.extend(&ty.fields);

            if !ty.properties.is_empty() {
                rows[id::PROPERTY_MAP].push(vec![row, properties.len() as u32 + 1]);
                properties.extend(ty.properties.iter().map(String::as_str));
            }

            if let Some(enclosing) = enclosing {
                rows[id::NESTED_CLASS].push(vec![row, enclosing]);
            }

            stack.extend(ty.nested.iter().rev().map(|nested| (nested, Some(row))));
        }

        let field_rows = self.physical_rows(fields.len());
        let property_rows = self.physical_rows(properties.len());

        rows[id::FIELD] = vec![Vec::new(); fields.len()];
        for (field, &row) in fields.iter().zip(&field_rows) {
            let name = strings.intern(&field.name);
            rows[id::FIELD][row as usize - 1] =
                vec![u32::from(field.attributes.bits()), name, FIELD_SIGNATURE];
            if field.attributes.contains(FieldAttributes::HAS_DEFAULT) {
                // HasConstant tag 0 = Field
                rows[id::CONSTANT].push(vec![ELEMENT_TYPE_I4, row << 2, CONSTANT_VALUE]);
            }
        }
        rows[id::CONSTANT].sort_by_key(|constant| constant[1]);

        rows[id::PROPERTY] = vec![Vec::new(); properties.len()];
        for (property, &row) in properties.iter().zip(&property_rows) {
            let name = strings.intern(property);
            rows[id::PROPERTY][row as usize - 1] = vec![0, name, PROPERTY_SIGNATURE];
        }

        if self.pointer_tables {
            rows[id::FIELD_PTR] = field_rows.iter().map(|&row| vec![row]).collect();
            rows[id::PROPERTY_PTR] = property_rows.iter().map(|&row| vec![row]).collect();
        }

        let strings = strings.finish();
        let mut heap_sizes = if strings.len() > usize::from(u16::MAX) { heap::WIDE_STRINGS } else { 0 };
        if self.extra_data {
            heap_sizes |= heap::EXTRA_DATA;
        }
        let tables = tables_stream(heap_sizes, &rows);
        let tables_name = if self.pointer_tables { "#-" } else { "#~" };

        let streams: [(&str, &[u8]); 5] = [
            (tables_name, &tables),
            ("#Strings", &strings),
            ("#US", &[0, 0, 0, 0]),
            ("#GUID", &[0x5A; 16]),
            ("#Blob", &BLOB_HEAP),
        ];
        metadata_root(&streams)
    }

    /// Physical row of each of `count` members listed in declaration order.
    fn physical_rows(&self, count: usize) -> Vec<u32> {
        let count = count as u32;
        if self.pointer_tables {
            (1..=count).rev().collect()
        } else {
            (1..=count).collect()
        }
    }
}

#[derive(Debug)]
struct Strings {
    heap: Vec<u8>,
    seen: FxHashMap<String, u32>,
}

impl Default for Strings {
    fn default() -> Self {
        Self { heap: vec![0], seen: FxHashMap::default() }
    }
}

impl Strings {
    fn intern(&mut self, value: &str) -> u32 {
        if value.is_empty() {
            return 0;
        }
        if let Some(&index) = self.seen.get(value) {
            return index;
        }
        let index = self.heap.len() as u32;
        self.heap.extend_from_slice(value.as_bytes());
        self.heap.push(0);
        self.seen.insert(value.to_owned(), index);
        index
    }

    fn finish(mut self) -> Vec<u8> {
        pad(&mut self.heap, 4);
        self.heap
    }
}

fn tables_stream(heap_sizes: u8, rows: &[Vec<Vec<u32>>; TABLE_COUNT]) -> Vec<u8> {
    let counts: [u32; TABLE_COUNT] = std::array::from_fn(|t| rows[t].len() as u32);
    let layout = TableLayout::new(heap_sizes, counts, 0);
    let valid = (0..TABLE_COUNT).filter(|&t| counts[t] > 0).fold(0u64, |mask, t| mask | (1 << t));

    let mut out = Vec::new();
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&[2, 0, heap_sizes, 1]);
    out.extend_from_slice(&valid.to_le_bytes());
    out.extend_from_slice(&(SORTED_TABLES & valid).to_le_bytes());
    for &count in counts.iter().filter(|&&c| c > 0) {
        out.extend_from_slice(&count.to_le_bytes());
    }
    if heap_sizes & heap::EXTRA_DATA != 0 {
        out.extend_from_slice(&0u32.to_le_bytes());
    }

    for (table, table_rows) in rows.iter().enumerate() {
        for row in table_rows {
            for (&column, &value) in schema(table).iter().zip(row) {
                put(&mut out, value, layout.width(column));
            }
        }
    }

    pad(&mut out, 4);
    out
}

fn metadata_root(streams: &[(&str, &[u8])]) -> Vec<u8> {
    let mut version = RUNTIME_VERSION.as_bytes().to_vec();
    version.push(0);
    pad(&mut version, 4);

    let headers_len: usize = streams.iter().map(|(name, _)| 8 + (name.len() + 4) / 4 * 4).sum();
    let mut offset = 16 + version.len() + 4 + headers_len;

    let mut out = Vec::new();
    out.extend_from_slice(&METADATA_SIGNATURE.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&(version.len() as u32).to_le_bytes());
    out.extend_from_slice(&version);
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&(streams.len() as u16).to_le_bytes());

    for (name, data) in streams {
        out.extend_from_slice(&(offset as u32).to_le_bytes());
        out.extend_from_slice(&(data.len() as u32).to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.push(0);
        pad(&mut out, 4);
        offset += data.len();
    }
    for (_, data) in streams {
        out.extend_from_slice(data);
    }
    out
}

const fn checksum_offset() -> usize {
    PE_OFFSET + 4 + 20 + 64
}

fn pe_image(metadata: &[u8], pe32_plus: bool) -> Vec<u8> {
    let metadata_rva = TEXT_RVA + CLI_HEADER_SIZE as u32;
    let text_len = CLI_HEADER_SIZE + metadata.len();
    let raw_size = text_len.div_ceil(FILE_ALIGNMENT) * FILE_ALIGNMENT;
    let image_size = (TEXT_RVA + text_len as u32).div_ceil(SECTION_ALIGNMENT) * SECTION_ALIGNMENT;

    let mut out = vec![0u8; FILE_ALIGNMENT];

    // DOS header
    out[0..2].copy_from_slice(&DOS_MAGIC.to_le_bytes());
    out[0x3C..0x40].copy_from_slice(&(PE_OFFSET as u32).to_le_bytes());

    // COFF header
    let coff = PE_OFFSET + 4;
    out[PE_OFFSET..coff].copy_from_slice(&PE_SIGNATURE.to_le_bytes());
    let (machine, characteristics, optional_size) = if pe32_plus {
        (0x8664u16, 0x2022u16, PE32_PLUS_HEADER_SIZE)
    } else {
        (0x014C, 0x2102, PE32_HEADER_SIZE)
    };
    write_at(&mut out, coff, &machine.to_le_bytes());
    write_at(&mut out, coff + 2, &1u16.to_le_bytes());
    write_at(&mut out, coff + 16, &(optional_size as u16).to_le_bytes());
    write_at(&mut out, coff + 18, &characteristics.to_le_bytes());

    // optional header; PE32+ drops BaseOfData and widens ImageBase and the
    // four stack/heap sizes to 64 bits
    let opt = coff + 20;
    write_at(&mut out, opt + 4, &(raw_size as u32).to_le_bytes());
    write_at(&mut out, opt + 20, &TEXT_RVA.to_le_bytes());
    write_at(&mut out, opt + 32, &SECTION_ALIGNMENT.to_le_bytes());
    write_at(&mut out, opt + 36, &(FILE_ALIGNMENT as u32).to_le_bytes());
    write_at(&mut out, opt + 40, &4u16.to_le_bytes());
    write_at(&mut out, opt + 48, &4u16.to_le_bytes());
    write_at(&mut out, opt + 56, &image_size.to_le_bytes());
    write_at(&mut out, opt + 60, &(FILE_ALIGNMENT as u32).to_le_bytes());
    write_at(&mut out, opt + 68, &3u16.to_le_bytes());
    write_at(&mut out, opt + 70, &0x8540u16.to_le_bytes());
    let directories = if pe32_plus {
        write_at(&mut out, opt, &PE32_PLUS_MAGIC.to_le_bytes());
        write_at(&mut out, opt + 24, &0x0001_8000_0000u64.to_le_bytes());
        write_at(&mut out, opt + 72, &0x0040_0000u64.to_le_bytes());
        write_at(&mut out, opt + 80, &0x4000u64.to_le_bytes());
        write_at(&mut out, opt + 88, &0x0010_0000u64.to_le_bytes());
        write_at(&mut out, opt + 96, &0x2000u64.to_le_bytes());
        write_at(&mut out, opt + 108, &16u32.to_le_bytes());
        opt + 112
    } else {
        write_at(&mut out, opt, &PE32_MAGIC.to_le_bytes());
        write_at(&mut out, opt + 28, &0x1000_0000u32.to_le_bytes());
        write_at(&mut out, opt + 72, &0x0010_0000u32.to_le_bytes());
        write_at(&mut out, opt + 76, &0x1000u32.to_le_bytes());
        write_at(&mut out, opt + 80, &0x0010_0000u32.to_le_bytes());
        write_at(&mut out, opt + 84, &0x1000u32.to_le_bytes());
        write_at(&mut out, opt + 92, &16u32.to_le_bytes());
        opt + 96
    };
    let cli_directory = directories + CLI_DIRECTORY * 8;
    write_at(&mut out, cli_directory, &TEXT_RVA.to_le_bytes());
    write_at(&mut out, cli_directory + 4, &(CLI_HEADER_SIZE as u32).to_le_bytes());

    // section table
    let section = opt + optional_size;
    write_at(&mut out, section, b".text\0\0\0");
    write_at(&mut out, section + 8, &(text_len as u32).to_le_bytes());
    write_at(&mut out, section + 12, &TEXT_RVA.to_le_bytes());
    write_at(&mut out, section + 16, &(raw_size as u32).to_le_bytes());
    write_at(&mut out, section + 20, &(FILE_ALIGNMENT as u32).to_le_bytes());
    write_at(&mut out, section + 36, &0x6000_0020u32.to_le_bytes());

    // CLI header, then metadata
    let mut cli = [0u8; CLI_HEADER_SIZE];
    cli[0..4].copy_from_slice(&(CLI_HEADER_SIZE as u32).to_le_bytes());
    cli[4..6].copy_from_slice(&2u16.to_le_bytes());
    cli[6..8].copy_from_slice(&5u16.to_le_bytes());
    cli[8..12].copy_from_slice(&metadata_rva.to_le_bytes());
    cli[12..16].copy_from_slice(&(metadata.len() as u32).to_le_bytes());
    cli[16..20].copy_from_slice(&1u32.to_le_bytes());

    out.extend_from_slice(&cli);
    out.extend_from_slice(metadata);
    out.resize(FILE_ALIGNMENT + raw_size, 0);
    out
}

fn write_at(out: &mut [u8], offset: usize, bytes: &[u8]) {
    out[offset..offset + bytes.len()].copy_from_slice(bytes);
}

fn put(out: &mut Vec<u8>, value: u32, width: usize) {
    match width {
        1 => out.push(value as u8),
        2 => out.extend_from_slice(&(value as u16).to_le_bytes()),
        _ => out.extend_from_slice(&value.to_le_bytes()),
    }
}

fn pad(out: &mut Vec<u8>, alignment: usize) {
    out.resize(out.len().div_ceil(alignment) * alignment, 0);
}
