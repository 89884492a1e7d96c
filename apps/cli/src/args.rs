//! # Command-line arguments
//!
//! Named flags and positionals map onto the same two paths; a named flag
//! always wins over its positional counterpart. The built-in clap help is
//! replaced by `-h/--help` so that help goes through the same pause and exit
//! handling as every other outcome.

use crate::error::AppError;
use clap::{ArgAction, CommandFactory, Parser};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

const ABOUT: &str = "\
Creates a copy of an assembly in which all constant fields are static.
An input path must be provided, the other options are optional.
You can use it without the option identifiers;
If so, the first argument is for input and the optional second one for output.";

#[derive(Debug, Default, Parser)]
#[command(name = "deconstanter")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = ABOUT)]
#[command(disable_help_flag = true, disable_version_flag = true)]
pub struct Args {
    /// Path (relative or absolute) to the input assembly
    #[arg(short, long, value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// Path/dir/filename for the output assembly
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Application should automatically exit
    #[arg(short, long, action = ArgAction::SetTrue)]
    pub exit: bool,

    /// Show this message
    #[arg(short, long, action = ArgAction::SetTrue)]
    pub help: bool,

    /// Log every converted field
    #[arg(short, long, action = ArgAction::SetTrue)]
    pub verbose: bool,

    /// Configuration file (defaults to ./deconstanter.toml when present)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Input assembly, when --input is not given
    #[arg(value_name = "INPUT")]
    pub input_arg: Option<PathBuf>,

    /// Output path, when --output is not given
    #[arg(value_name = "OUTPUT")]
    pub output_arg: Option<PathBuf>,
}

/// What a single run has to do, resolved from [`Args`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub auto_exit: bool,
    pub help: bool,
    pub verbose: bool,
    pub config: Option<PathBuf>,
}

impl RunOptions {
    /// The input assembly.
    ///
    /// # Errors
    /// [`AppError::InvalidArguments`] when neither `--input` nor a positional
    /// input names a path.
    pub fn input(&self) -> Result<&Path, AppError> {
        self.input.as_deref().ok_or_else(|| AppError::invalid_arguments("no input assembly given"))
    }
}

impl Args {
    /// Parses `args` (program name first).
    ///
    /// # Errors
    /// [`AppError::InvalidArguments`] for unknown flags, missing flag values
    /// or surplus positionals.
    pub fn parse_from_args<I, T>(args: I) -> Result<Self, AppError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Self::try_parse_from(args).map_err(|e| AppError::InvalidArguments {
            message: e.kind().to_string().into(),
            context: Some(e.to_string().trim_end().to_owned().into()),
        })
    }

    /// Rendered help text.
    #[must_use]
    pub fn help_text() -> String {
        Self::command().render_help().to_string()
    }

    /// Folds positionals into the named paths. clap already rejects empty
    /// path values, so a present path is never empty.
    #[must_use]
    pub fn into_options(self) -> RunOptions {
        RunOptions {
            input: self.input.or(self.input_arg),
            output: self.output.or(self.output_arg),
            auto_exit: self.exit,
            help: self.help,
            verbose: self.verbose,
            config: self.config,
        }
    }
}

/// Looks for `--exit` or an `e` inside a short flag group (`-e`, `-ve`) in
/// raw arguments, for runs whose arguments failed to parse. Scanning stops at
/// `--` and a group ends at the first flag that takes a value.
#[must_use]
pub fn auto_exit_requested(args: &[OsString]) -> bool {
    args.iter().skip(1).take_while(|arg| arg.as_os_str() != "--").any(|arg| {
        let arg = arg.to_string_lossy();
        if arg == "--exit" {
            return true;
        }
        match arg.strip_prefix('-') {
            Some(group) if !group.starts_with('-') => group
                .chars()
                .take_while(|flag| !matches!(flag, 'i' | 'o' | 'c'))
                .any(|flag| flag == 'e'),
            _ => false,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Args, AppError> {
        Args::parse_from_args(std::iter::once("deconstanter").chain(args.iter().copied()))
    }

    #[test]
    fn test_positionals() {
        let options = parse(&["Game.dll", "out/"]).unwrap().into_options();
        assert_eq!(options.input().unwrap(), Path::new("Game.dll"));
        assert_eq!(options.output, Some(PathBuf::from("out/")));
        assert!(!options.auto_exit);
        assert!(!options.help);
    }

    #[test]
    fn test_named_flags_win() {
        let options =
            parse(&["-i", "Named.dll", "--output", "x.dll", "-e", "Pos.dll", "pos.dll"])
                .unwrap()
                .into_options();
        assert_eq!(options.input, Some(PathBuf::from("Named.dll")));
        assert_eq!(options.output, Some(PathBuf::from("x.dll")));
        assert!(options.auto_exit);
    }

    #[test]
    fn test_missing_input() {
        let options = parse(&["-e"]).unwrap().into_options();
        assert_eq!(options.input().unwrap_err().exit_code(), 10);

        let err = parse(&["--input", ""]).unwrap_err();
        assert_eq!(err.exit_code(), 10);
        assert!(parse(&["-o", "", "Game.dll"]).is_err());
    }

    #[test]
    fn test_unknown_flag_is_invalid_arguments() {
        let err = parse(&["--frobnicate"]).unwrap_err();
        assert!(matches!(err, AppError::InvalidArguments { .. }));
    }

    #[test]
    fn test_too_many_positionals() {
        assert!(parse(&["a.dll", "b.dll", "c.dll"]).is_err());
    }

    #[test]
    fn test_help_flag_is_ours() {
        let options = parse(&["-h", "-e"]).unwrap().into_options();
        assert!(options.help);
        assert!(options.auto_exit);
        assert_eq!(options.input, None);
        let help = Args::help_text();
        assert!(help.contains("Creates a copy of an assembly"));
        assert!(help.contains("--input"));
    }

    #[test]
    fn test_auto_exit_scan() {
        let raw: Vec<OsString> = ["deconstanter", "--bogus", "-e"].iter().map(OsString::from).collect();
        assert!(auto_exit_requested(&raw));
        assert!(!auto_exit_requested(&raw[..2]));
    }

    #[test]
    fn test_auto_exit_scan_in_flag_groups() {
        let requested = |args: &[&str]| {
            let raw: Vec<OsString> =
                std::iter::once("deconstanter").chain(args.iter().copied()).map(OsString::from).collect();
            auto_exit_requested(&raw)
        };
        assert!(requested(&["--bogus", "-ve"]));
        assert!(requested(&["-ev", "--bogus"]));
        assert!(requested(&["--bogus", "--exit"]));
        assert!(!requested(&["--bogus", "-v"]));
        assert!(!requested(&["--bogus", "--verbose"]));
        assert!(!requested(&["--bogus", "-ifile.dll"]));
        assert!(!requested(&["--bogus", "--", "-e"]));
    }
}
