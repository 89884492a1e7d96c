//! Literal field rewriting for .NET module images.
//!
//! The pipeline has four stages:
//! - [`Module::read`] parses the PE/COFF container and the ECMA-335 metadata
//!   into an owned tree of [`TypeDef`]s.
//! - [`Module::types`] and [`Module::fields_mut`] flatten that tree, nested
//!   types included, without recursion.
//! - [`strip_literals`] clears the `Literal` flag on every field that has it.
//! - [`Module::write`] patches the flag words in a copy of the original bytes
//!   and replaces the destination file atomically.
//!
//! ```rust,no_run
//! use deconst_core::{Module, strip_literals};
//!
//! let mut module = Module::read("Game.dll")?;
//! let changed = strip_literals(&mut module);
//! module.write("out/Game.dll")?;
//! println!("Changed {changed} fields to static.");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod bytes;
mod error;
mod flatten;
mod metadata;
mod model;
mod pe;
mod reader;
mod rewrite;
pub mod synth;
mod tables;
mod writer;

pub use error::{UnreadableImageError, UnreadableImageErrorExt, WriteError, WriteErrorExt};
pub use flatten::{FieldsMut, Types, types};
pub use model::{Field, FieldAttributes, Module, Property, TypeDef};
pub use rewrite::strip_literals;
