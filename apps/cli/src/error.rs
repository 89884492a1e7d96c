use deconst_core::{UnreadableImageError, WriteError};
use deconst_logger::LoggerError;
use std::borrow::Cow;
use std::path::PathBuf;

/// Everything that ends a run early. Each variant maps to a process exit code.
#[deconst_derive::deconst_error]
pub enum AppError {
    #[error("Invalid arguments{}: {message}", format_context(.context))]
    InvalidArguments { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Invalid output argument{}: {message}", format_context(.context))]
    InvalidOutput { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Input file not found{}: {}", format_context(.context), .path.display())]
    InputNotFound { path: PathBuf, context: Option<Cow<'static, str>> },

    #[error("{source}{}", format_context(.context))]
    Read { source: UnreadableImageError, context: Option<Cow<'static, str>> },

    #[error("{source}{}", format_context(.context))]
    Write { source: WriteError, context: Option<Cow<'static, str>> },

    #[error("Configuration error{}: {source}", format_context(.context))]
    Config { source: config::ConfigError, context: Option<Cow<'static, str>> },

    #[error("Logging setup failed{}: {source}", format_context(.context))]
    Logging { source: LoggerError, context: Option<Cow<'static, str>> },
}

impl AppError {
    pub fn invalid_arguments(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidArguments { message: message.into(), context: None }
    }

    pub fn invalid_output(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidOutput { message: message.into(), context: None }
    }

    /// Process exit code for this failure.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InvalidArguments { .. } => 10,
            Self::InvalidOutput { .. } => 20,
            Self::InputNotFound { .. } => 30,
            Self::Read { source, .. } => {
                if source.is_format() {
                    40
                } else {
                    30
                }
            },
            Self::Write { .. } => 50,
            Self::Config { .. } | Self::Logging { .. } => 1,
        }
    }

    /// Lines shown to the user on stdout.
    #[must_use]
    pub const fn banner(&self) -> &'static [&'static str] {
        match self {
            Self::InvalidArguments { .. } => &[
                "ERROR! Incorrect arguments. You need to provide the path to the assembly to deconstant.",
                "On Windows you can even drag and drop the assembly on the .exe.",
                "Try `--help' for more information.",
            ],
            Self::InvalidOutput { .. } => &["ERROR! Invalid output argument."],
            Self::InputNotFound { .. } => {
                &["ERROR! File doesn't exist or you don't have sufficient permissions."]
            },
            Self::Read { source, .. } => {
                if source.is_format() {
                    &["ERROR! Cannot read the assembly. The file is not a valid .NET module."]
                } else {
                    &["ERROR! File doesn't exist or you don't have sufficient permissions."]
                }
            },
            Self::Write { .. } => &[
                "ERROR! Cannot create/overwrite the new assembly.",
                "Please check the path and its permissions and in case of overwriting an existing file ensure that it isn't currently used.",
            ],
            Self::Config { .. } => &["ERROR! Cannot load the configuration."],
            Self::Logging { .. } => &["ERROR! Cannot initialize logging."],
        }
    }
}
