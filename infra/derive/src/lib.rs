#![allow(unreachable_pub)]

//! # Macros
//!
//! Procedural macros shared across the workspace. At the moment this is the
//! error attribute used by every crate to declare its error enum.

mod error;

use proc_macro::TokenStream;
use syn::{DeriveInput, parse_macro_input};

/// Turns an enum into a workspace error type.
///
/// # Features
///
/// * **Automatic Derives**: Injects `#[derive(Debug, thiserror::Error)]` unless already present.
/// * **Context Support**: Generates a companion `<Name>Ext` trait adding `.context(...)`
///   to `Result<T, Name>` and to `Result<T, Source>` for every wrapped source error.
/// * **Conversions**: Implements `From<Source>` for each variant holding a `source` field,
///   so upstream errors can be propagated with `?`.
/// * **Internal Fallback**: `From<&'static str>` and `From<String>` when an `Internal`
///   variant exists.
/// * **Formatting helper**: a private `format_context` function for use in `#[error]`
///   strings. One error enum per module, since the helper is module-scoped.
///
/// # Requirements
///
/// 1. Applied to an **enum** with named-field variants only.
/// 2. Variants wrapping a source (field named `source` or marked `#[source]`/`#[from]`)
///    must carry `context: Option<Cow<'static, str>>`.
///
/// # Example
///
/// ```rust,ignore
/// use deconst_derive::deconst_error;
/// use std::borrow::Cow;
///
/// #[deconst_error]
/// pub enum ReadError {
///     #[error("I/O failure{}: {source}", format_context(.context))]
///     Io { source: std::io::Error, context: Option<Cow<'static, str>> },
///
///     #[error("Internal fault{}: {message}", format_context(.context))]
///     Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
/// }
///
/// fn load(path: &str) -> Result<Vec<u8>, ReadError> {
///     std::fs::read(path).context(format!("Reading {path}"))
/// }
/// ```
#[proc_macro_attribute]
pub fn deconst_error(_args: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as DeriveInput);
    error::expand(input).into()
}
