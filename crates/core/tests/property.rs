use deconst_core::synth::{FieldSpec, ImageBuilder, TypeSpec};
use deconst_core::{FieldAttributes, Module, strip_literals};
use proptest::prelude::*;

fn field(kind: u8, index: usize) -> FieldSpec {
    let name = format!("f{index}");
    match kind % 3 {
        0 => FieldSpec::literal(name),
        1 => FieldSpec::static_field(name),
        _ => FieldSpec::instance(name),
    }
}

fn build_type(kinds: Vec<u8>, nested: Vec<TypeSpec>) -> TypeSpec {
    let mut ty = TypeSpec::new("Prop", "T");
    ty.fields = kinds.into_iter().enumerate().map(|(i, k)| field(k, i)).collect();
    ty.nested = nested;
    ty
}

fn type_tree() -> impl Strategy<Value = TypeSpec> {
    let leaf = proptest::collection::vec(any::<u8>(), 0..4).prop_map(|kinds| build_type(kinds, Vec::new()));
    leaf.prop_recursive(5, 48, 4, |inner| {
        (proptest::collection::vec(any::<u8>(), 0..4), proptest::collection::vec(inner, 0..4))
            .prop_map(|(kinds, nested)| build_type(kinds, nested))
    })
}

fn count_types(ty: &TypeSpec) -> usize {
    1 + ty.nested.iter().map(count_types).sum::<usize>()
}

fn count_literals(ty: &TypeSpec) -> usize {
    ty.fields.iter().filter(|f| f.attributes.contains(FieldAttributes::LITERAL)).count()
        + ty.nested.iter().map(count_literals).sum::<usize>()
}

proptest! {
    #[test]
    fn flattening_visits_every_type_once(roots in proptest::collection::vec(type_tree(), 0..4)) {
        let builder = roots.iter().cloned().fold(ImageBuilder::new("Prop.dll"), ImageBuilder::ty);
        let module = Module::from_bytes(builder.build()).unwrap();

        let expected = 1 + roots.iter().map(count_types).sum::<usize>();
        prop_assert_eq!(module.types().count(), expected);
        prop_assert_eq!(module.types().count(), module.types().count());
    }

    #[test]
    fn rewrite_count_matches_literal_fields(roots in proptest::collection::vec(type_tree(), 0..4)) {
        let builder = roots.iter().cloned().fold(ImageBuilder::new("Prop.dll"), ImageBuilder::ty);
        let mut module = Module::from_bytes(builder.build()).unwrap();
        let fields = module.fields().count();

        let expected = roots.iter().map(count_literals).sum::<usize>();
        prop_assert_eq!(strip_literals(&mut module), expected);

        let reread = Module::from_bytes(module.to_bytes()).unwrap();
        prop_assert_eq!(reread.fields().count(), fields);
        prop_assert_eq!(reread.fields().filter(|f| f.is_literal()).count(), 0);

        let mut again = reread;
        prop_assert_eq!(strip_literals(&mut again), 0);
    }
}
