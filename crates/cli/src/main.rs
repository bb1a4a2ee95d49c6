use std::process::ExitCode;

fn main() -> ExitCode {
    catalogbot_cli::run()
}
