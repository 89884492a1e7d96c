//! # deconstanter
//!
//! Copies a .NET module image with every literal (`const`) field turned into
//! a plain static field, so that dependants read the stored value at run time
//! instead of the value inlined when they were compiled.
//!
//! Exit codes: `0` success, `10` bad arguments, `20` bad output argument,
//! `30` input missing or unreadable, `40` input is not a module image,
//! `50` output cannot be written, `1` configuration or logging failure.

#![allow(clippy::print_stdout)]

pub mod args;
mod console;
pub mod error;
pub mod output;
pub mod settings;

pub use crate::args::{Args, RunOptions};
pub use crate::error::{AppError, AppErrorExt};
pub use crate::settings::{LogSettings, Settings, load_settings};

use deconst_core::{Module, strip_literals};
use deconst_logger::{LevelFilter, Logger};
use std::ffi::OsString;
use tracing::{error, info};

/// Runs the tool on raw process arguments and returns the exit code.
pub fn execute(raw: &[OsString]) -> u8 {
    println!();

    let options = match Args::parse_from_args(raw.iter().cloned()) {
        Ok(args) => args.into_options(),
        Err(err) => return finish(&err, args::auto_exit_requested(raw)),
    };

    if options.help {
        println!("{}", Args::help_text());
        if !options.auto_exit {
            console::pause();
        }
        return 0;
    }

    let settings = match load_settings(options.config.as_deref()) {
        Ok(settings) => settings,
        Err(err) => return finish(&err, options.auto_exit),
    };

    let _logger = match init_logging(&settings.log, options.verbose) {
        Ok(logger) => logger,
        Err(err) => return finish(&err, options.auto_exit),
    };

    match run(&options, &settings) {
        Ok(_) => {
            if !options.auto_exit {
                console::pause();
            }
            0
        },
        Err(err) => finish(&err, options.auto_exit),
    }
}

/// Reads, rewrites and writes one module image. Returns the number of fields
/// that were converted.
///
/// # Errors
/// Any [`AppError`] except the argument and configuration variants.
pub fn run(options: &RunOptions, settings: &Settings) -> Result<usize, AppError> {
    let input = options.input()?;
    let target = output::resolve(input, options.output.as_deref(), &settings.default_output_dir)?;

    if !input.is_file() {
        return Err(AppError::InputNotFound { path: input.to_path_buf(), context: None });
    }

    let mut module = Module::read(input)?;
    info!(module = %module.name, types = module.types().count(), "Module loaded");

    let changed = strip_literals(&mut module);
    println!("Changed {changed} fields to static.");

    if target.default_name {
        println!();
        println!("Info: Use default output name: \"{}\"", target.file_name().to_string_lossy());
    }
    if target.default_dir {
        println!();
        println!("Info: Use default output dir: \"{}\"", target.dir().display());
    }

    println!("\nSaving a copy of the modified assembly ...");
    module.write(&target.path)?;

    println!("Completed.");
    println!();
    println!("Use the deconstanted library as your main assembly and as reference.");
    Ok(changed)
}

fn init_logging(settings: &LogSettings, verbose: bool) -> Result<Logger, AppError> {
    let level = if verbose {
        LevelFilter::DEBUG
    } else {
        match settings.level.as_deref() {
            Some(level) => level.parse::<LevelFilter>().map_err(|e| AppError::Config {
                source: config::ConfigError::Message(format!("log.level `{level}`: {e}")),
                context: None,
            })?,
            None => LevelFilter::WARN,
        }
    };

    let builder = Logger::builder().name("deconstanter").level(level);
    let logger = match &settings.directory {
        Some(directory) => builder.path(directory).json(settings.json).init(),
        None => builder.init(),
    };
    logger.context("Failed to install the tracing subscriber")
}

fn finish(err: &AppError, auto_exit: bool) -> u8 {
    for line in err.banner() {
        println!("{line}");
    }
    error!(code = err.exit_code(), "{err}");
    if !auto_exit {
        console::pause();
    }
    err.exit_code()
}
