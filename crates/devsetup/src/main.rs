use std::process::ExitCode;

mod cli;
mod commands;
mod steps;
mod ui;

#[tokio::main]
async fn main() -> ExitCode {
    let parsed = match cli::Cli::try_parse_env() {
        Ok(parsed) => parsed,
        Err(err) => {
            // Help and version go to stdout and are not failures
            let code = if err.use_stderr() { 1 } else { 0 };
            let _ = err.print();
            return ExitCode::from(code);
        }
    };

    match parsed.dispatch().await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {:#}", console::style("Error:").red().bold(), err);
            ExitCode::from(commands::EXIT_FAILURE)
        }
    }
}
