use deconst_derive::deconst_error;
use std::borrow::Cow;

#[deconst_error]
pub enum DemoError {
    #[error("I/O failure{}: {source}", format_context(.context))]
    Io { source: std::io::Error, context: Option<Cow<'static, str>> },

    #[error("Bad header{}: {message}", format_context(.context))]
    Header { message: Cow<'static, str>, context: Option<Cow<'static, str>> },

    #[error("Internal error{}: {message}", format_context(.context))]
    Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
}

fn open() -> Result<Vec<u8>, DemoError> {
    std::fs::read("/definitely/not/here").context("Reading fixture")
}

fn main() {
    let err = open().unwrap_err();
    assert!(err.to_string().contains("(Reading fixture)"));

    let err: DemoError = "boom".into();
    assert_eq!(err.to_string(), "Internal error: boom");

    let err: Result<(), DemoError> =
        Err(DemoError::Header { message: "bad magic".into(), context: None });
    let err = err.context("parsing").unwrap_err();
    assert_eq!(err.to_string(), "Bad header (parsing): bad magic");
}
