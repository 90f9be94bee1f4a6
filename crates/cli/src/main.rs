use std::process::ExitCode;

fn main() -> ExitCode {
    stratus_cli::run()
}
