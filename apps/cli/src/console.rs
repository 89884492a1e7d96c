use std::io::BufRead;
use tracing::debug;

/// Keeps a console window open until the user presses Enter.
pub(crate) fn pause() {
    println!();
    println!("Press any key to exit ...");
    let mut line = String::new();
    if let Err(e) = std::io::stdin().lock().read_line(&mut line) {
        debug!(error = %e, "Could not wait for input");
    }
}
