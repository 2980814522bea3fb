use std::process::ExitCode;

fn main() -> ExitCode {
    aduana_cli::run()
}
