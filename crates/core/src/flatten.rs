//! Flattening of the nested type tree.
//!
//! Both iterators keep an explicit work list instead of recursing, so the
//! nesting depth of an image never turns into call-stack depth. They are
//! lazy and cheap to recreate: calling [`types`] again restarts the walk.

use crate::model::{Field, TypeDef};
use std::iter::FusedIterator;

/// Pre-order walk over a type forest: every type is yielded before the types
/// nested in it, siblings keep their declaration order.
#[derive(Debug, Clone)]
pub struct Types<'a> {
    pending: Vec<&'a TypeDef>,
}

impl<'a> Types<'a> {
    pub(crate) fn new(roots: &'a [TypeDef]) -> Self {
        Self { pending: roots.iter().rev().collect() }
    }
}

impl<'a> Iterator for Types<'a> {
    type Item = &'a TypeDef;

    fn next(&mut self) -> Option<Self::Item> {
        let ty = self.pending.pop()?;
        self.pending.extend(ty.nested.iter().rev());
        Some(ty)
    }
}

impl FusedIterator for Types<'_> {}

/// Flattens `roots` and everything nested below them.
#[must_use]
pub fn types(roots: &[TypeDef]) -> Types<'_> {
    Types::new(roots)
}

/// Mutable walk over the fields of every type, in the same order as [`Types`].
#[derive(Debug)]
pub struct FieldsMut<'a> {
    pending: Vec<&'a mut TypeDef>,
    current: std::slice::IterMut<'a, Field>,
}

impl<'a> FieldsMut<'a> {
    pub(crate) fn new(roots: &'a mut [TypeDef]) -> Self {
        Self { pending: roots.iter_mut().rev().collect(), current: Default::default() }
    }
}

impl<'a> Iterator for FieldsMut<'a> {
    type Item = &'a mut Field;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(field) = self.current.next() {
                return Some(field);
            }
            let TypeDef { fields, nested, .. } = self.pending.pop()?;
            self.pending.extend(nested.iter_mut().rev());
            self.current = fields.iter_mut();
        }
    }
}

impl FusedIterator for FieldsMut<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FieldAttributes;

    fn ty(name: &str, fields: usize, nested: Vec<TypeDef>) -> TypeDef {
        TypeDef {
            namespace: String::new(),
            name: name.to_owned(),
            attributes: 0,
            fields: (0..fields)
                .map(|i| Field {
                    name: format!("{name}_{i}"),
                    attributes: FieldAttributes::PUBLIC,
                    row: 0,
                })
                .collect(),
            properties: Vec::new(),
            nested,
            row: 0,
        }
    }

    fn names<'a>(iter: impl Iterator<Item = &'a TypeDef>) -> Vec<&'a str> {
        iter.map(TypeDef::name).collect()
    }

    #[test]
    fn test_empty_forest() {
        assert_eq!(types(&[]).count(), 0);
        assert_eq!(FieldsMut::new(&mut []).count(), 0);
    }

    #[test]
    fn test_leaf_contributes_itself() {
        let roots = [ty("A", 0, vec![])];
        assert_eq!(names(types(&roots)), ["A"]);
    }

    #[test]
    fn test_pre_order() {
        let roots = [
            ty("A", 0, vec![ty("A1", 0, vec![ty("A1a", 0, vec![])]), ty("A2", 0, vec![])]),
            ty("B", 0, vec![ty("B1", 0, vec![])]),
        ];
        assert_eq!(names(types(&roots)), ["A", "A1", "A1a", "A2", "B", "B1"]);
    }

    #[test]
    fn test_restartable() {
        let roots = [ty("A", 0, vec![ty("A1", 0, vec![])]), ty("B", 0, vec![])];
        let walk = types(&roots);
        let first = names(walk.clone());
        assert_eq!(first, names(walk));
        assert_eq!(first, names(types(&roots)));
    }

    #[test]
    fn test_fields_mut_reaches_nested_fields() {
        let mut roots =
            [ty("A", 1, vec![ty("A1", 2, vec![ty("A1a", 1, vec![])])]), ty("B", 1, vec![])];
        let visited: Vec<String> = FieldsMut::new(&mut roots).map(|f| f.name().to_owned()).collect();
        assert_eq!(visited, ["A_0", "A1_0", "A1_1", "A1a_0", "B_0"]);

        for field in FieldsMut::new(&mut roots) {
            field.attributes |= FieldAttributes::STATIC;
        }
        assert!(types(&roots).flat_map(|t| &t.fields).all(|f| f.is_static()));
    }

    #[test]
    fn test_deep_nesting_without_recursion() {
        let mut root = ty("leaf", 1, vec![]);
        for depth in 0..1_000 {
            root = ty(&format!("level{depth}"), 0, vec![root]);
        }
        let roots = [root];
        assert_eq!(types(&roots).count(), 1_001);
        assert_eq!(types(&roots).last().map(TypeDef::name), Some("leaf"));
    }
}
