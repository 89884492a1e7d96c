//! Turns literal (compile-time constant) fields into plain static fields.

use crate::model::{FieldAttributes, Module};
use tracing::{debug, info};

/// Clears [`FieldAttributes::LITERAL`] on every field of the module and
/// returns how many fields changed.
///
/// `STATIC`, `HAS_DEFAULT` and every other attribute bit are left alone:
/// literal fields are already static at the metadata level. Running it again
/// on the same module converts nothing and returns `0`.
pub fn strip_literals(module: &mut Module) -> usize {
    let mut converted = 0;
    for field in module.fields_mut() {
        if field.is_literal() {
            field.attributes.remove(FieldAttributes::LITERAL);
            converted += 1;
            debug!(token = field.token(), field = %field.name, "Literal cleared");
        }
    }
    info!(module = %module.name, converted, "Literal fields converted to static");
    converted
}
