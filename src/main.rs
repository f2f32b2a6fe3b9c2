use shellish::Interpreter;
use shellish::config::Config;
use shellish::env::Environment;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn init_logging() {
    let filter = EnvFilter::try_from_env("SHELLISH_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    init_logging();
    let config: Config = argh::from_env();

    let mut env = Environment::new();
    config.apply(&mut env);
    let mut shell = Interpreter::with_environment(env);

    let code = match &config.command {
        Some(line) => shell.execute(line),
        None => match shell.repl() {
            Ok(code) => code,
            Err(e) => {
                eprintln!("shellish: {e}");
                1
            }
        },
    };
    ExitCode::from(code.clamp(0, 255) as u8)
}
