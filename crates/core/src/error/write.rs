use std::borrow::Cow;

/// The patched image could not be stored at the destination.
#[deconst_derive::deconst_error]
pub enum WriteError {
    #[error("Cannot write image{}: {source}", format_context(.context))]
    Io { source: std::io::Error, context: Option<Cow<'static, str>> },

    #[error("Invalid destination{}: {message}", format_context(.context))]
    InvalidPath { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}
