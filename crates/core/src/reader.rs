//! Builds a [`Module`] graph from image bytes.

use crate::bytes::ByteView;
use crate::error::{UnreadableImageError, UnreadableImageErrorExt};
use crate::metadata::MetadataLayout;
use crate::model::{Field, FieldAttributes, Image, Module, Property, TypeDef};
use crate::pe::PeLayout;
use crate::tables::{TableLayout, id};
use std::fs;
use std::ops::Range;
use std::path::Path;
use tracing::{debug, info};

impl Module {
    /// Reads and parses the image at `path`.
    ///
    /// The file is read into memory in one go and released before parsing.
    ///
    /// # Errors
    /// [`UnreadableImageError::Io`] when the file cannot be read and
    /// [`UnreadableImageError::Format`] when it is not a valid CLI module image.
    pub fn read(path: impl AsRef<Path>) -> Result<Self, UnreadableImageError> {
        let path = path.as_ref();
        let bytes = fs::read(path).context(format!("Failed to read {}", path.display()))?;
        info!(path = %path.display(), size = bytes.len(), "Loaded module image");
        Self::from_bytes(bytes).context(path.display().to_string())
    }

    /// Parses an in-memory image.
    ///
    /// # Errors
    /// [`UnreadableImageError::Format`] when the bytes are not a valid CLI module image.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, UnreadableImageError> {
        let view = ByteView::new(&bytes);
        let pe = PeLayout::parse(view)?;
        let metadata = MetadataLayout::parse(view, &pe)?;
        let parser = Parser { view, metadata: &metadata };

        let name = parser.module_name()?;
        let types = parser.type_tree()?;
        debug!(module = %name, top_level = types.len(), "Parsed type tree");

        let MetadataLayout { version, tables, .. } = metadata;
        Ok(Self {
            name,
            runtime_version: version,
            types,
            image: Image { bytes, tables, checksum_offset: pe.checksum_offset },
        })
    }
}

struct Parser<'a> {
    view: ByteView<'a>,
    metadata: &'a MetadataLayout,
}

impl Parser<'_> {
    const fn tables(&self) -> &TableLayout {
        &self.metadata.tables
    }

    fn read(&self, table: usize, row: u32, column: usize) -> Result<u32, UnreadableImageError> {
        self.tables().read(self.view, table, row, column)
    }

    fn string(&self, table: usize, row: u32, column: usize) -> Result<String, UnreadableImageError> {
        self.metadata.string(self.view, self.read(table, row, column)?)
    }

    fn module_name(&self) -> Result<String, UnreadableImageError> {
        if self.tables().rows(id::MODULE) == 0 {
            return Err(UnreadableImageError::format("Module table is empty"));
        }
        self.string(id::MODULE, 1, 1)
    }

    /// Rows of the member list owned by `owner`, where `list_column` of the
    /// owner table holds the first member and the next owner row ends the run.
    fn run(
        &self,
        table: usize,
        owner: u32,
        list_column: usize,
        members: u32,
    ) -> Result<Range<u32>, UnreadableImageError> {
        let start = self.read(table, owner, list_column)?;
        let end = if owner < self.tables().rows(table) {
            self.read(table, owner + 1, list_column)?
        } else {
            members + 1
        };
        if start == 0 || start > end || end > members + 1 {
            return Err(UnreadableImageError::format(format!(
                "member list {start}..{end} of table 0x{table:02X} row {owner} is out of range"
            )));
        }
        Ok(start..end)
    }

    /// Follows a `FieldPtr`/`PropertyPtr` indirection when the table exists.
    fn resolve(&self, ptr_table: usize, target: usize, index: u32) -> Result<u32, UnreadableImageError> {
        let row = if self.tables().rows(ptr_table) == 0 { index } else { self.read(ptr_table, index, 0)? };
        if row == 0 || row > self.tables().rows(target) {
            return Err(UnreadableImageError::format(format!(
                "row {row} of table 0x{target:02X} does not exist"
            )));
        }
        Ok(row)
    }

    fn list_len(&self, ptr_table: usize, target: usize) -> u32 {
        match self.tables().rows(ptr_table) {
            0 => self.tables().rows(target),
            n => n,
        }
    }

    fn fields(&self, type_row: u32) -> Result<Vec<Field>, UnreadableImageError> {
        let count = self.list_len(id::FIELD_PTR, id::FIELD);
        self.run(id::TYPE_DEF, type_row, 4, count)?
            .map(|index| {
                let row = self.resolve(id::FIELD_PTR, id::FIELD, index)?;
                Ok(Field {
                    name: self.string(id::FIELD, row, 1)?,
                    attributes: FieldAttributes::from_bits_retain(self.read(id::FIELD, row, 0)? as u16),
                    row,
                })
            })
            .collect()
    }

    /// Properties grouped by owning TypeDef row (index 0 unused).
    fn properties(&self) -> Result<Vec<Vec<Property>>, UnreadableImageError> {
        let type_count = self.tables().rows(id::TYPE_DEF);
        let count = self.list_len(id::PROPERTY_PTR, id::PROPERTY);
        let mut owned = vec![Vec::new(); type_count as usize + 1];

        for map_row in 1..=self.tables().rows(id::PROPERTY_MAP) {
            let parent = self.read(id::PROPERTY_MAP, map_row, 0)?;
            let slot = owned.get_mut(parent as usize).filter(|_| parent != 0).ok_or_else(|| {
                UnreadableImageError::format(format!("PropertyMap row {map_row} has no parent type"))
            })?;
            for index in self.run(id::PROPERTY_MAP, map_row, 1, count)? {
                let row = self.resolve(id::PROPERTY_PTR, id::PROPERTY, index)?;
                slot.push(Property {
                    name: self.string(id::PROPERTY, row, 1)?,
                    attributes: self.read(id::PROPERTY, row, 0)? as u16,
                    row,
                });
            }
        }
        Ok(owned)
    }

    /// Nested type rows per enclosing TypeDef row (index 0 unused), plus
    /// a flag telling whether each row is nested somewhere.
    fn nesting(&self) -> Result<(Vec<Vec<u32>>, Vec<bool>), UnreadableImageError> {
        let type_count = self.tables().rows(id::TYPE_DEF) as usize;
        let mut children = vec![Vec::new(); type_count + 1];
        let mut is_nested = vec![false; type_count + 1];

        for row in 1..=self.tables().rows(id::NESTED_CLASS) {
            let nested = self.read(id::NESTED_CLASS, row, 0)? as usize;
            let enclosing = self.read(id::NESTED_CLASS, row, 1)? as usize;
            if nested == 0 || enclosing == 0 || nested > type_count || enclosing > type_count {
                return Err(UnreadableImageError::format(format!(
                    "NestedClass row {row} points outside the TypeDef table"
                )));
            }
            if std::mem::replace(&mut is_nested[nested], true) {
                return Err(UnreadableImageError::format(format!(
                    "type row {nested} is nested in more than one type"
                )));
            }
            children[enclosing].push(nested as u32);
        }
        Ok((children, is_nested))
    }

    /// Builds the owned type forest bottom-up from a post-order of the
    /// nesting relation, using an explicit stack.
    fn type_tree(&self) -> Result<Vec<TypeDef>, UnreadableImageError> {
        let type_count = self.tables().rows(id::TYPE_DEF);
        let (children, is_nested) = self.nesting()?;
        let mut properties = self.properties()?;

        let roots: Vec<u32> = (1..=type_count).filter(|&row| !is_nested[row as usize]).collect();

        let mut order = Vec::with_capacity(type_count as usize);
        let mut stack: Vec<(u32, bool)> = roots.iter().rev().map(|&row| (row, false)).collect();
        while let Some((row, expanded)) = stack.pop() {
            if expanded {
                order.push(row);
                continue;
            }
            stack.push((row, true));
            stack.extend(children[row as usize].iter().rev().map(|&child| (child, false)));
        }

        if order.len() != type_count as usize {
            return Err(UnreadableImageError::format("nested type relation contains a cycle"));
        }

        let mut built: Vec<Option<TypeDef>> = vec![None; type_count as usize + 1];
        for row in order {
            let nested = children[row as usize]
                .iter()
                .map(|&child| built[child as usize].take())
                .collect::<Option<Vec<_>>>()
                .ok_or_else(|| UnreadableImageError::format("nested type relation is not a tree"))?;

            built[row as usize] = Some(TypeDef {
                attributes: self.read(id::TYPE_DEF, row, 0)?,
                name: self.string(id::TYPE_DEF, row, 1)?,
                namespace: self.string(id::TYPE_DEF, row, 2)?,
                fields: self.fields(row)?,
                properties: std::mem::take(&mut properties[row as usize]),
                nested,
                row,
            });
        }

        roots
            .iter()
            .map(|&row| built[row as usize].take())
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| UnreadableImageError::format("top-level type missing from the tree"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::{FieldSpec, ImageBuilder, TypeSpec};

    fn sample() -> Vec<u8> {
        ImageBuilder::new("Sample.dll")
            .ty(TypeSpec::new("Demo", "Outer")
                .field(FieldSpec::literal("Max"))
                .property("Size")
                .nested(TypeSpec::new("", "First").field(FieldSpec::instance("value")))
                .nested(TypeSpec::new("", "Second")))
            .ty(TypeSpec::new("Demo", "Plain").field(FieldSpec::static_field("Cache")))
            .build()
    }

    fn patch(bytes: &mut [u8], table: usize, row: u32, column: usize, value: u16) {
        let view = ByteView::new(bytes);
        let pe = PeLayout::parse(view).unwrap();
        let layout = MetadataLayout::parse(view, &pe).unwrap();
        let (offset, width) = layout.tables.column(table, row, column);
        assert_eq!(width, 2);
        bytes[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }

    #[test]
    fn test_reads_module_and_type_tree() {
        let module = Module::from_bytes(sample()).unwrap();

        assert_eq!(module.name, "Sample.dll");
        assert_eq!(module.runtime_version, "v4.0.30319");

        let top: Vec<_> = module.top_level_types().iter().map(TypeDef::full_name).collect();
        assert_eq!(top, ["<Module>", "Demo.Outer", "Demo.Plain"]);

        let outer = &module.top_level_types()[1];
        assert_eq!(outer.token(), 0x0200_0002);
        let nested: Vec<_> = outer.nested.iter().map(TypeDef::name).collect();
        assert_eq!(nested, ["First", "Second"]);
        assert_eq!(outer.properties.len(), 1);
        assert_eq!(outer.properties[0].name(), "Size");
        assert_eq!(outer.namespace(), "Demo");
    }

    #[test]
    fn test_reads_field_attributes() {
        let module = Module::from_bytes(sample()).unwrap();
        let fields: Vec<_> = module.fields().map(|f| (f.name(), f.is_literal(), f.is_static())).collect();
        assert_eq!(fields, [("Max", true, true), ("value", false, false), ("Cache", false, true)]);
        assert_eq!(module.fields().next().unwrap().token(), 0x0400_0001);
    }

    fn indirect() -> ImageBuilder {
        ImageBuilder::new("Indirect.dll")
            .pointer_tables(true)
            .extra_data(true)
            .ty(TypeSpec::new("Demo", "Limits")
                .field(FieldSpec::literal("Max"))
                .field(FieldSpec::instance("count"))
                .property("Size")
                .property("Length"))
            .ty(TypeSpec::new("Demo", "Cache").field(FieldSpec::static_field("Shared")))
    }

    #[test]
    fn test_follows_field_and_property_pointers() {
        let module = Module::from_bytes(indirect().build()).unwrap();
        assert_eq!(module.image.tables.rows(id::FIELD_PTR), 3);

        // physical rows are stored in reverse of declaration order
        let fields: Vec<_> = module.fields().map(|f| (f.name(), f.token(), f.is_literal())).collect();
        assert_eq!(fields, [
            ("Max", 0x0400_0003, true),
            ("count", 0x0400_0002, false),
            ("Shared", 0x0400_0001, false),
        ]);

        let limits = &module.top_level_types()[1];
        let properties: Vec<_> = limits.properties.iter().map(|p| (p.name(), p.token())).collect();
        assert_eq!(properties, [("Size", 0x1700_0002), ("Length", 0x1700_0001)]);
    }

    #[test]
    fn test_rejects_pointer_past_field_table() {
        let mut bytes = indirect().build();
        patch(&mut bytes, id::FIELD_PTR, 2, 0, 9);
        let err = Module::from_bytes(bytes).unwrap_err();
        assert!(err.to_string().contains("does not exist"), "{err}");
    }

    #[test]
    fn test_reads_pe32_plus_image() {
        let bytes = ImageBuilder::new("Wide.dll")
            .pe32_plus(true)
            .ty(TypeSpec::new("Demo", "Limits").field(FieldSpec::literal("Max")))
            .build();
        let module = Module::from_bytes(bytes).unwrap();
        assert_eq!(module.name, "Wide.dll");
        assert_eq!(module.fields().map(Field::name).collect::<Vec<_>>(), ["Max"]);
    }

    #[test]
    fn test_reads_tables_with_extra_data() {
        let bytes = ImageBuilder::new("Extra.dll")
            .extra_data(true)
            .ty(TypeSpec::new("Demo", "Limits").field(FieldSpec::literal("Max")))
            .build();
        let module = Module::from_bytes(bytes).unwrap();
        assert_eq!(module.fields().map(Field::name).collect::<Vec<_>>(), ["Max"]);
    }

    #[test]
    fn test_rejects_truncated_image() {
        let mut bytes = sample();
        bytes.truncate(0x180);
        let err = Module::from_bytes(bytes).unwrap_err();
        assert!(err.is_format());
    }

    #[test]
    fn test_rejects_non_image() {
        let err = Module::from_bytes(b"definitely not a module".to_vec()).unwrap_err();
        assert!(err.is_format());
    }

    #[test]
    fn test_rejects_out_of_range_field_list() {
        let mut bytes = sample();
        patch(&mut bytes, id::TYPE_DEF, 5, 4, 0x7FFF);
        let err = Module::from_bytes(bytes).unwrap_err();
        assert!(err.is_format());
        assert!(err.to_string().contains("out of range"), "{err}");
    }

    #[test]
    fn test_rejects_type_nested_twice() {
        let mut bytes = sample();
        // rows: <Module>=1, Outer=2, First=3, Second=4, Plain=5
        patch(&mut bytes, id::NESTED_CLASS, 2, 0, 3);
        let err = Module::from_bytes(bytes).unwrap_err();
        assert!(err.to_string().contains("more than one type"), "{err}");
    }

    #[test]
    fn test_rejects_nesting_cycle() {
        let mut bytes = sample();
        patch(&mut bytes, id::NESTED_CLASS, 2, 1, 4);
        let err = Module::from_bytes(bytes).unwrap_err();
        assert!(err.to_string().contains("cycle"), "{err}");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Module::read(dir.path().join("missing.dll")).unwrap_err();
        assert!(!err.is_format());
        assert!(matches!(err, UnreadableImageError::Io { .. }));
    }
}
