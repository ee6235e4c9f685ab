use std::process::ExitCode;

fn main() -> ExitCode {
    entops_cli::run()
}
