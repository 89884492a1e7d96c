use deconst_core::synth::{FieldSpec, ImageBuilder, TypeSpec};
use std::path::{Path, PathBuf};

/// Three literal fields and two ordinary ones spread over two types.
#[must_use]
pub fn mixed_image() -> ImageBuilder {
    ImageBuilder::new("Mixed.dll")
        .ty(TypeSpec::new("Game", "Limits")
            .field(FieldSpec::literal("MaxPlayers"))
            .field(FieldSpec::literal("MaxLevel"))
            .field(FieldSpec::static_field("Instance"))
            .property("Current"))
        .ty(TypeSpec::new("Game", "Player")
            .field(FieldSpec::literal("DefaultHealth"))
            .field(FieldSpec::instance("health")))
}

/// A single literal field three nesting levels down.
#[must_use]
pub fn nested_image() -> ImageBuilder {
    let inner = TypeSpec::new("", "Inner").field(FieldSpec::literal("Depth"));
    let middle = TypeSpec::new("", "Middle").nested(inner);
    ImageBuilder::new("Nested.dll").ty(TypeSpec::new("Game", "Outer").nested(middle))
}

/// Writes `builder` into `dir` and returns the file path.
/// # Panics
/// * If the file cannot be written.
pub fn write_image(dir: &Path, name: &str, builder: &ImageBuilder) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, builder.build()).expect("fixture image write failed");
    path
}
