use std::process::ExitCode;

fn main() -> ExitCode {
    gitslack_cli::run()
}
