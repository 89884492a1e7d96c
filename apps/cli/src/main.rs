use std::process::ExitCode;

fn main() -> ExitCode {
    ExitCode::from(deconst_cli::execute(&std::env::args_os().collect::<Vec<_>>()))
}
