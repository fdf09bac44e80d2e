//! Stand-in for the platform probe script, for bench setups and tests.
//!
//! - `broker-probe-stub list` prints locations `1` to `7`, one per line
//! - `broker-probe-stub <location>` waits 500ms, then prints the backend
//!   library name (`BROKER_STUB_BACKEND`, default `libtai-a.so`)
//!
//! Any other invocation exits with status 1.

use std::process::ExitCode;
use std::time::Duration;

const LOCATIONS: u32 = 7;
const RESOLVE_DELAY: Duration = Duration::from_millis(500);
const DEFAULT_BACKEND: &str = "libtai-a.so";

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.as_slice() {
        [cmd] if cmd == "list" => {
            for location in 1..=LOCATIONS {
                println!("{}", location);
            }
            ExitCode::SUCCESS
        }
        [_location] => {
            std::thread::sleep(RESOLVE_DELAY);
            let backend =
                std::env::var("BROKER_STUB_BACKEND").unwrap_or_else(|_| DEFAULT_BACKEND.into());
            println!("{}", backend);
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("usage: broker-probe-stub list | broker-probe-stub <location>");
            ExitCode::FAILURE
        }
    }
}
