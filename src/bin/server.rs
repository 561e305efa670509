//! Taleforge story server.
//! Run with: cargo run --bin taleforge-server

use std::process::ExitCode;

use taleforge::start_taleforge;

fn main() -> ExitCode {
    start_taleforge::run()
}
