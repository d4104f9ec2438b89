use std::process::ExitCode;

fn main() -> ExitCode {
    rxroute_cli::run()
}
