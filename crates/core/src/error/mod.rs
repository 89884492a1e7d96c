mod read;
mod write;

pub use read::{UnreadableImageError, UnreadableImageErrorExt};
pub use write::{WriteError, WriteErrorExt};
