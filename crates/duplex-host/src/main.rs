//! `duplexd`: runs one duplex bridge session driven by the host.

use std::io::{self, StderrLock};
use std::process::ExitCode;

fn main() -> ExitCode {
    let mut stderr: StderrLock<'_> = io::stderr().lock();
    duplex_host::run(std::env::args_os(), &mut stderr)
}
