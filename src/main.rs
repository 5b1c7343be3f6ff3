//! Binary entrypoint that starts the CintaBot HTTP server.

use std::process::ExitCode;

use cintabot::start_cintabot;

/// Read configuration from the environment, open storage and serve the API.
fn main() -> ExitCode {
    start_cintabot::run()
}
