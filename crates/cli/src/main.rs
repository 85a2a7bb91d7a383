use std::process::ExitCode;

fn main() -> ExitCode {
    flowerbot_cli::run()
}
