use std::cell::RefCell;
use std::env;
use std::path::PathBuf;
use std::rc::Rc;

use sshagent::agent::{AgentCore, listener::Listener};
use sshagent::Config;

/// Reads the command line arguments and resolves the config path, defaulting to
/// `sshagentd.toml` in the current directory when none is given.
fn parse_args(cmd_line: &[String]) -> Option<PathBuf> {
    match cmd_line.len() {
        1 => Some(PathBuf::from("sshagentd.toml")),
        2 => Some(PathBuf::from(&cmd_line[1])),
        _ => {
            eprintln!("usage: sshagentd [config.toml]");
            None
        }
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    let cmd_line: Vec<String> = env::args().collect();
    let Some(config_path) = parse_args(&cmd_line) else {
        std::process::exit(2);
    };

    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(error = %err, path = %config_path.display(), "using default config");
            Config::default()
        }
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime");

    let local = tokio::task::LocalSet::new();
    local.block_on(&runtime, run(config));
}

async fn run(config: Config) {
    let listener = match Listener::bind(&config.agent_socket_path) {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(error = %err, path = %config.agent_socket_path.display(), "failed to bind agent socket");
            std::process::exit(1);
        }
    };

    tracing::info!(path = %config.agent_socket_path.display(), "sshagentd listening");
    let core = Rc::new(RefCell::new(AgentCore::new()));
    listener.serve(core).await;
}
