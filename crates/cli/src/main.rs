use std::process::ExitCode;

fn main() -> anyhow::Result<ExitCode> {
    jisfast_cli::run()
}
