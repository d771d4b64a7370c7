use std::process::ExitCode;

fn main() -> ExitCode {
    workshop_cli::run()
}
