use std::process::ExitCode;

fn main() -> ExitCode {
    welcomebot_cli::run()
}
