//! Binary entrypoint for the listening comprehension question server.

use std::process::ExitCode;

use listening_comp::start_listening_comp;

/// Load configuration, open the catalog and serve the HTTP API.
fn main() -> ExitCode {
    start_listening_comp::run()
}
