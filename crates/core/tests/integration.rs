mod fixtures;

use deconst_core::synth::ImageBuilder;
use deconst_core::{Field, Module, TypeDef, UnreadableImageError, strip_literals};
use fixtures::{mixed_image, nested_image, write_image};
use tempfile::TempDir;

#[test]
fn test_module_without_types_changes_nothing() {
    let mut module = Module::from_bytes(ImageBuilder::new("Empty.dll").build()).unwrap();

    assert_eq!(module.types().count(), 1, "only <Module> is expected");
    assert_eq!(strip_literals(&mut module), 0);
}

#[test]
fn test_mixed_fields_convert_only_literals() {
    let mut module = Module::from_bytes(mixed_image().build()).unwrap();

    assert_eq!(strip_literals(&mut module), 3);

    let statics: Vec<_> = module.fields().filter(|f| f.is_static()).map(Field::name).collect();
    assert_eq!(statics, ["MaxPlayers", "MaxLevel", "Instance", "DefaultHealth"]);
    assert!(module.fields().all(|f| !f.is_literal()));
}

#[test]
fn test_nested_literal_is_found() {
    let mut module = Module::from_bytes(nested_image().build()).unwrap();

    let names: Vec<_> = module.types().map(TypeDef::name).collect();
    assert_eq!(names, ["<Module>", "Outer", "Middle", "Inner"]);
    assert_eq!(strip_literals(&mut module), 1);
}

#[test]
fn test_file_round_trip_keeps_structure() {
    let temp = TempDir::new().unwrap();
    let input = write_image(temp.path(), "Mixed.dll", &mixed_image());
    let output = temp.path().join("out").join("Mixed.dll");

    let mut module = Module::read(&input).unwrap();
    let changed = strip_literals(&mut module);
    module.write(&output).unwrap();

    let reread = Module::read(&output).unwrap();
    assert_eq!(changed, 3);
    assert_eq!(reread.name, module.name);
    assert_eq!(reread.top_level_types(), module.top_level_types());
    assert_eq!(reread.fields().filter(|f| f.is_literal()).count(), 0);
    assert_eq!(reread.properties().count(), 1);
}

#[test]
fn test_rewritten_output_converts_nothing_more() {
    let temp = TempDir::new().unwrap();
    let input = write_image(temp.path(), "Nested.dll", &nested_image());
    let output = temp.path().join("Nested.out.dll");

    let mut module = Module::read(&input).unwrap();
    assert_eq!(strip_literals(&mut module), 1);
    module.write(&output).unwrap();

    let mut again = Module::read(&output).unwrap();
    assert_eq!(strip_literals(&mut again), 0);
}

#[test]
fn test_input_file_is_left_untouched() {
    let temp = TempDir::new().unwrap();
    let input = write_image(temp.path(), "Mixed.dll", &mixed_image());
    let before = std::fs::read(&input).unwrap();

    let mut module = Module::read(&input).unwrap();
    strip_literals(&mut module);
    module.write(temp.path().join("copy").join("Mixed.dll")).unwrap();

    assert_eq!(std::fs::read(&input).unwrap(), before);
}

#[test]
fn test_checksum_survives_rewrite() {
    let temp = TempDir::new().unwrap();
    let input = write_image(temp.path(), "Signed.dll", &mixed_image().checksum(true));
    let output = temp.path().join("Signed.out.dll");

    let mut module = Module::read(&input).unwrap();
    strip_literals(&mut module);
    module.write(&output).unwrap();

    let original = std::fs::read(&input).unwrap();
    let patched = std::fs::read(&output).unwrap();
    assert_eq!(original.len(), patched.len());
    assert_ne!(original, patched);
    assert!(Module::read(&output).is_ok());
}

#[test]
fn test_garbage_input_is_a_format_error() {
    let temp = TempDir::new().unwrap();
    let input = temp.path().join("notes.dll");
    std::fs::write(&input, b"MZ but nothing else").unwrap();

    let err = Module::read(&input).unwrap_err();
    assert!(err.is_format(), "{err}");
    assert!(err.to_string().contains("notes.dll"), "{err}");
}

#[test]
fn test_missing_input_is_an_io_error() {
    let temp = TempDir::new().unwrap();
    let err = Module::read(temp.path().join("absent.dll")).unwrap_err();
    assert!(matches!(err, UnreadableImageError::Io { .. }));
}
