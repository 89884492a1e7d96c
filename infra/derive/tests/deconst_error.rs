#[test]
fn deconst_error_ui() {
    let t = trybuild::TestCases::new();
    t.pass("tests/ui/pass.rs");
}
