//! In-memory graph of a module image: types, nested types, fields and properties.
//!
//! The graph owns a copy of the original image bytes; the writer patches that
//! copy so everything the graph does not model survives byte for byte.

use crate::flatten::{FieldsMut, Types};
use crate::tables::TableLayout;
use bitflags::bitflags;

bitflags! {
    /// `FieldAttributes` (ECMA-335 II.23.1.5). Access values share the low
    /// three bits and must be compared through [`FieldAttributes::ACCESS_MASK`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FieldAttributes: u16 {
        const ACCESS_MASK = 0x0007;
        const PRIVATE = 0x0001;
        const ASSEMBLY = 0x0003;
        const FAMILY = 0x0004;
        const PUBLIC = 0x0006;
        const STATIC = 0x0010;
        const INIT_ONLY = 0x0020;
        const LITERAL = 0x0040;
        const NOT_SERIALIZED = 0x0080;
        const HAS_FIELD_RVA = 0x0100;
        const SPECIAL_NAME = 0x0200;
        const RT_SPECIAL_NAME = 0x0400;
        const HAS_FIELD_MARSHAL = 0x1000;
        const PINVOKE_IMPL = 0x2000;
        const HAS_DEFAULT = 0x8000;

        const _ = !0;
    }
}

/// A field declaration. Only the attributes are writable; the name is
/// never written back to the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub(crate) name: String,
    pub attributes: FieldAttributes,
    pub(crate) row: u32,
}

impl Field {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `true` while the field is a compile-time constant.
    #[must_use]
    pub const fn is_literal(&self) -> bool {
        self.attributes.contains(FieldAttributes::LITERAL)
    }

    #[must_use]
    pub const fn is_static(&self) -> bool {
        self.attributes.contains(FieldAttributes::STATIC)
    }

    /// Metadata token (`0x04xxxxxx`).
    #[must_use]
    pub const fn token(&self) -> u32 {
        0x0400_0000 | self.row
    }
}

/// A property declaration. Read for completeness, never modified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub(crate) name: String,
    pub attributes: u16,
    pub(crate) row: u32,
}

impl Property {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Metadata token (`0x17xxxxxx`).
    #[must_use]
    pub const fn token(&self) -> u32 {
        0x1700_0000 | self.row
    }
}

/// A type definition together with the types nested inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDef {
    pub(crate) namespace: String,
    pub(crate) name: String,
    pub attributes: u32,
    pub fields: Vec<Field>,
    pub properties: Vec<Property>,
    pub nested: Vec<Self>,
    pub(crate) row: u32,
}

impl TypeDef {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Empty for types outside any namespace, nested ones included.
    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// `Namespace.Name`, or just `Name` for types without a namespace.
    #[must_use]
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    /// Metadata token (`0x02xxxxxx`).
    #[must_use]
    pub const fn token(&self) -> u32 {
        0x0200_0000 | self.row
    }
}

/// Offsets the writer needs to put field flags back into the image.
#[derive(Debug, Clone)]
pub(crate) struct Image {
    pub(crate) bytes: Vec<u8>,
    pub(crate) tables: TableLayout,
    pub(crate) checksum_offset: usize,
}

/// Root of the graph: the module and its top-level types.
#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    pub runtime_version: String,
    pub(crate) types: Vec<TypeDef>,
    pub(crate) image: Image,
}

impl Module {
    /// Top-level types in declaration order. Row 1 is always `<Module>`.
    #[must_use]
    pub fn top_level_types(&self) -> &[TypeDef] {
        &self.types
    }

    /// Every type in the module, nested ones included, parents first.
    #[must_use]
    pub fn types(&self) -> Types<'_> {
        Types::new(&self.types)
    }

    /// Every field of every type.
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.types().flat_map(|ty| ty.fields.iter())
    }

    /// Every field of every type, mutably.
    pub fn fields_mut(&mut self) -> FieldsMut<'_> {
        FieldsMut::new(&mut self.types)
    }

    /// Every property of every type.
    pub fn properties(&self) -> impl Iterator<Item = &Property> {
        self.types().flat_map(|ty| ty.properties.iter())
    }
}
