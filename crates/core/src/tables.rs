//! ECMA-335 metadata table schema and the row layout of a `#~`/`#-` stream.
//!
//! Every table up to `GenericParamConstraint` is described so that the offset
//! of any table can be computed, even for tables this crate never reads.

use crate::bytes::ByteView;
use crate::error::UnreadableImageError;

pub(crate) const TABLE_COUNT: usize = 0x2D;

pub(crate) mod id {
    pub(crate) const MODULE: usize = 0x00;
    pub(crate) const TYPE_REF: usize = 0x01;
    pub(crate) const TYPE_DEF: usize = 0x02;
    pub(crate) const FIELD_PTR: usize = 0x03;
    pub(crate) const FIELD: usize = 0x04;
    pub(crate) const METHOD_PTR: usize = 0x05;
    pub(crate) const METHOD_DEF: usize = 0x06;
    pub(crate) const PARAM_PTR: usize = 0x07;
    pub(crate) const PARAM: usize = 0x08;
    pub(crate) const INTERFACE_IMPL: usize = 0x09;
    pub(crate) const MEMBER_REF: usize = 0x0A;
    pub(crate) const CONSTANT: usize = 0x0B;
    pub(crate) const CUSTOM_ATTRIBUTE: usize = 0x0C;
    pub(crate) const FIELD_MARSHAL: usize = 0x0D;
    pub(crate) const DECL_SECURITY: usize = 0x0E;
    pub(crate) const CLASS_LAYOUT: usize = 0x0F;
    pub(crate) const FIELD_LAYOUT: usize = 0x10;
    pub(crate) const STAND_ALONE_SIG: usize = 0x11;
    pub(crate) const EVENT_MAP: usize = 0x12;
    pub(crate) const EVENT_PTR: usize = 0x13;
    pub(crate) const EVENT: usize = 0x14;
    pub(crate) const PROPERTY_MAP: usize = 0x15;
    pub(crate) const PROPERTY_PTR: usize = 0x16;
    pub(crate) const PROPERTY: usize = 0x17;
    pub(crate) const METHOD_SEMANTICS: usize = 0x18;
    pub(crate) const METHOD_IMPL: usize = 0x19;
    pub(crate) const MODULE_REF: usize = 0x1A;
    pub(crate) const TYPE_SPEC: usize = 0x1B;
    pub(crate) const IMPL_MAP: usize = 0x1C;
    pub(crate) const FIELD_RVA: usize = 0x1D;
    pub(crate) const ENC_LOG: usize = 0x1E;
    pub(crate) const ENC_MAP: usize = 0x1F;
    pub(crate) const ASSEMBLY: usize = 0x20;
    pub(crate) const ASSEMBLY_PROCESSOR: usize = 0x21;
    pub(crate) const ASSEMBLY_OS: usize = 0x22;
    pub(crate) const ASSEMBLY_REF: usize = 0x23;
    pub(crate) const ASSEMBLY_REF_PROCESSOR: usize = 0x24;
    pub(crate) const ASSEMBLY_REF_OS: usize = 0x25;
    pub(crate) const FILE: usize = 0x26;
    pub(crate) const EXPORTED_TYPE: usize = 0x27;
    pub(crate) const MANIFEST_RESOURCE: usize = 0x28;
    pub(crate) const NESTED_CLASS: usize = 0x29;
    pub(crate) const GENERIC_PARAM: usize = 0x2A;
    pub(crate) const METHOD_SPEC: usize = 0x2B;
    pub(crate) const GENERIC_PARAM_CONSTRAINT: usize = 0x2C;
}

pub(crate) mod heap {
    pub(crate) const WIDE_STRINGS: u8 = 0x01;
    pub(crate) const WIDE_GUID: u8 = 0x02;
    pub(crate) const WIDE_BLOB: u8 = 0x04;
    pub(crate) const EXTRA_DATA: u8 = 0x40;
}

/// Coded index kinds (ECMA-335 II.24.2.6). `None` marks an unused tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Coded {
    TypeDefOrRef,
    HasConstant,
    HasCustomAttribute,
    HasFieldMarshal,
    HasDeclSecurity,
    MemberRefParent,
    HasSemantics,
    MethodDefOrRef,
    MemberForwarded,
    Implementation,
    CustomAttributeType,
    ResolutionScope,
    TypeOrMethodDef,
}

impl Coded {
    pub(crate) const fn tables(self) -> &'static [Option<usize>] {
        use id::*;
        match self {
            Self::TypeDefOrRef => &[Some(TYPE_DEF), Some(TYPE_REF), Some(TYPE_SPEC)],
            Self::HasConstant => &[Some(FIELD), Some(PARAM), Some(PROPERTY)],
            Self::HasCustomAttribute => &[
                Some(METHOD_DEF),
                Some(FIELD),
                Some(TYPE_REF),
                Some(TYPE_DEF),
                Some(PARAM),
                Some(INTERFACE_IMPL),
                Some(MEMBER_REF),
                Some(MODULE),
                Some(DECL_SECURITY),
                Some(PROPERTY),
                Some(EVENT),
                Some(STAND_ALONE_SIG),
                Some(MODULE_REF),
                Some(TYPE_SPEC),
                Some(ASSEMBLY),
                Some(ASSEMBLY_REF),
                Some(FILE),
                Some(EXPORTED_TYPE),
                Some(MANIFEST_RESOURCE),
                Some(GENERIC_PARAM),
                Some(GENERIC_PARAM_CONSTRAINT),
                Some(METHOD_SPEC),
            ],
            Self::HasFieldMarshal => &[Some(FIELD), Some(PARAM)],
            Self::HasDeclSecurity => &[Some(TYPE_DEF), Some(METHOD_DEF), Some(ASSEMBLY)],
            Self::MemberRefParent => &[
                Some(TYPE_DEF),
                Some(TYPE_REF),
                Some(MODULE_REF),
                Some(METHOD_DEF),
                Some(TYPE_SPEC),
            ],
            Self::HasSemantics => &[Some(EVENT), Some(PROPERTY)],
            Self::MethodDefOrRef => &[Some(METHOD_DEF), Some(MEMBER_REF)],
            Self::MemberForwarded => &[Some(FIELD), Some(METHOD_DEF)],
            Self::Implementation => &[Some(FILE), Some(ASSEMBLY_REF), Some(EXPORTED_TYPE)],
            Self::CustomAttributeType => {
                &[None, None, Some(METHOD_DEF), Some(MEMBER_REF), None]
            },
            Self::ResolutionScope => {
                &[Some(MODULE), Some(MODULE_REF), Some(ASSEMBLY_REF), Some(TYPE_REF)]
            },
            Self::TypeOrMethodDef => &[Some(TYPE_DEF), Some(METHOD_DEF)],
        }
    }

    pub(crate) const fn tag_bits(self) -> u32 {
        let n = self.tables().len() as u32;
        u32::BITS - (n - 1).leading_zeros()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Column {
    Fixed(usize),
    Str,
    Guid,
    Blob,
    Index(usize),
    Coded(Coded),
}

pub(crate) const fn schema(table: usize) -> &'static [Column] {
    use Column::{Blob, Coded as C, Fixed, Guid, Index, Str};
    use Coded::*;
    use id::*;
    match table {
        MODULE => &[Fixed(2), Str, Guid, Guid, Guid],
        TYPE_REF => &[C(ResolutionScope), Str, Str],
        TYPE_DEF => &[Fixed(4), Str, Str, C(TypeDefOrRef), Index(FIELD), Index(METHOD_DEF)],
        FIELD_PTR => &[Index(FIELD)],
        FIELD => &[Fixed(2), Str, Blob],
        METHOD_PTR => &[Index(METHOD_DEF)],
        METHOD_DEF => &[Fixed(4), Fixed(2), Fixed(2), Str, Blob, Index(PARAM)],
        PARAM_PTR => &[Index(PARAM)],
        PARAM => &[Fixed(2), Fixed(2), Str],
        INTERFACE_IMPL => &[Index(TYPE_DEF), C(TypeDefOrRef)],
        MEMBER_REF => &[C(MemberRefParent), Str, Blob],
        CONSTANT => &[Fixed(2), C(HasConstant), Blob],
        CUSTOM_ATTRIBUTE => &[C(HasCustomAttribute), C(CustomAttributeType), Blob],
        FIELD_MARSHAL => &[C(HasFieldMarshal), Blob],
        DECL_SECURITY => &[Fixed(2), C(HasDeclSecurity), Blob],
        CLASS_LAYOUT => &[Fixed(2), Fixed(4), Index(TYPE_DEF)],
        FIELD_LAYOUT => &[Fixed(4), Index(FIELD)],
        STAND_ALONE_SIG => &[Blob],
        EVENT_MAP => &[Index(TYPE_DEF), Index(EVENT)],
        EVENT_PTR => &[Index(EVENT)],
        EVENT => &[Fixed(2), Str, C(TypeDefOrRef)],
        PROPERTY_MAP => &[Index(TYPE_DEF), Index(PROPERTY)],
        PROPERTY_PTR => &[Index(PROPERTY)],
        PROPERTY => &[Fixed(2), Str, Blob],
        METHOD_SEMANTICS => &[Fixed(2), Index(METHOD_DEF), C(HasSemantics)],
        METHOD_IMPL => &[Index(TYPE_DEF), C(MethodDefOrRef), C(MethodDefOrRef)],
        MODULE_REF => &[Str],
        TYPE_SPEC => &[Blob],
        IMPL_MAP => &[Fixed(2), C(MemberForwarded), Str, Index(MODULE_REF)],
        FIELD_RVA => &[Fixed(4), Index(FIELD)],
        ENC_LOG => &[Fixed(4), Fixed(4)],
        ENC_MAP => &[Fixed(4)],
        ASSEMBLY => &[Fixed(4), Fixed(2), Fixed(2), Fixed(2), Fixed(2), Fixed(4), Blob, Str, Str],
        ASSEMBLY_PROCESSOR => &[Fixed(4)],
        ASSEMBLY_OS => &[Fixed(4), Fixed(4), Fixed(4)],
        ASSEMBLY_REF => {
            &[Fixed(2), Fixed(2), Fixed(2), Fixed(2), Fixed(4), Blob, Str, Str, Blob]
        },
        ASSEMBLY_REF_PROCESSOR => &[Fixed(4), Index(ASSEMBLY_REF)],
        ASSEMBLY_REF_OS => &[Fixed(4), Fixed(4), Fixed(4), Index(ASSEMBLY_REF)],
        FILE => &[Fixed(4), Str, Blob],
        EXPORTED_TYPE => &[Fixed(4), Fixed(4), Str, Str, C(Implementation)],
        MANIFEST_RESOURCE => &[Fixed(4), Fixed(4), Str, C(Implementation)],
        NESTED_CLASS => &[Index(TYPE_DEF), Index(TYPE_DEF)],
        GENERIC_PARAM => &[Fixed(2), Fixed(2), C(TypeOrMethodDef), Str],
        METHOD_SPEC => &[C(MethodDefOrRef), Blob],
        GENERIC_PARAM_CONSTRAINT => &[Index(GENERIC_PARAM), C(TypeDefOrRef)],
        _ => &[],
    }
}

/// Row counts, widths and absolute offsets of every table in a tables stream.
#[derive(Debug, Clone)]
pub(crate) struct TableLayout {
    heap_sizes: u8,
    rows: [u32; TABLE_COUNT],
    row_sizes: [usize; TABLE_COUNT],
    offsets: [usize; TABLE_COUNT],
    end: usize,
}

impl TableLayout {
    /// Computes the layout for tables whose first row starts at `data_start`.
    pub(crate) fn new(heap_sizes: u8, rows: [u32; TABLE_COUNT], data_start: usize) -> Self {
        let mut layout =
            Self { heap_sizes, rows, row_sizes: [0; TABLE_COUNT], offsets: [0; TABLE_COUNT], end: 0 };

        let mut cursor = data_start;
        for table in 0..TABLE_COUNT {
            let size = schema(table).iter().map(|&col| layout.width(col)).sum();
            layout.row_sizes[table] = size;
            layout.offsets[table] = cursor;
            cursor += size * rows[table] as usize;
        }
        layout.end = cursor;
        layout
    }

    /// Parses the tables stream header at `start` and computes the layout.
    pub(crate) fn parse(
        view: ByteView<'_>,
        start: usize,
        size: usize,
    ) -> Result<Self, UnreadableImageError> {
        let heap_sizes = view.u8(start + 6)?;
        let valid = view.u64(start + 8)?;

        if valid >> TABLE_COUNT != 0 {
            return Err(UnreadableImageError::format(format!(
                "unsupported metadata tables present (valid mask 0x{valid:016X})"
            )));
        }

        let mut rows = [0u32; TABLE_COUNT];
        let mut cursor = start + 24;
        for (table, count) in rows.iter_mut().enumerate() {
            if valid & (1 << table) != 0 {
                *count = view.u32(cursor)?;
                cursor += 4;
            }
        }
        if heap_sizes & heap::EXTRA_DATA != 0 {
            cursor += 4;
        }

        let layout = Self::new(heap_sizes, rows, cursor);
        if layout.end > start + size || layout.end > view.len() {
            return Err(UnreadableImageError::format("metadata tables exceed the tables stream"));
        }
        Ok(layout)
    }

    pub(crate) const fn rows(&self, table: usize) -> u32 {
        self.rows[table]
    }

    /// Absolute offset of a 1-based row.
    pub(crate) const fn row_offset(&self, table: usize, row: u32) -> usize {
        self.offsets[table] + (row as usize - 1) * self.row_sizes[table]
    }

    pub(crate) fn width(&self, column: Column) -> usize {
        match column {
            Column::Fixed(n) => n,
            Column::Str => self.heap_width(heap::WIDE_STRINGS),
            Column::Guid => self.heap_width(heap::WIDE_GUID),
            Column::Blob => self.heap_width(heap::WIDE_BLOB),
            Column::Index(table) => {
                if self.rows[table] > u32::from(u16::MAX) { 4 } else { 2 }
            },
            Column::Coded(kind) => {
                let max = kind.tables().iter().flatten().map(|&t| self.rows[t]).max().unwrap_or(0);
                if max < (1 << (16 - kind.tag_bits())) { 2 } else { 4 }
            },
        }
    }

    /// Offset and width of a column inside a 1-based row.
    pub(crate) fn column(&self, table: usize, row: u32, column: usize) -> (usize, usize) {
        let columns = schema(table);
        let skip: usize = columns[..column].iter().map(|&c| self.width(c)).sum();
        (self.row_offset(table, row) + skip, self.width(columns[column]))
    }

    /// Reads an unsigned column value of a 1-based row.
    pub(crate) fn read(
        &self,
        view: ByteView<'_>,
        table: usize,
        row: u32,
        column: usize,
    ) -> Result<u32, UnreadableImageError> {
        let (offset, width) = self.column(table, row, column);
        match width {
            1 => view.u8(offset).map(u32::from),
            2 | 4 => view.index(offset, width),
            _ => Err(UnreadableImageError::format("column is not an integer")),
        }
    }

    const fn heap_width(&self, flag: u8) -> usize {
        if self.heap_sizes & flag == 0 { 2 } else { 4 }
    }
}
