use std::borrow::Cow;

/// The input image could not be turned into a [`Module`](crate::Module).
#[deconst_derive::deconst_error]
pub enum UnreadableImageError {
    /// The file is missing or cannot be opened/read.
    #[error("Cannot read image{}: {source}", format_context(.context))]
    Io { source: std::io::Error, context: Option<Cow<'static, str>> },

    /// The bytes are not a well-formed CLI module image.
    #[error("Invalid module image{}: {message}", format_context(.context))]
    Format { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

impl UnreadableImageError {
    pub(crate) fn format(message: impl Into<Cow<'static, str>>) -> Self {
        Self::Format { message: message.into(), context: None }
    }

    /// `true` when the file was read but its contents were rejected.
    #[must_use]
    pub const fn is_format(&self) -> bool {
        matches!(self, Self::Format { .. })
    }
}
