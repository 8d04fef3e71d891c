use std::process::ExitCode;

fn main() -> ExitCode {
    vitalis_cli::run()
}
