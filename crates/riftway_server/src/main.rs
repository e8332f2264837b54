mod config;
mod entities;
mod server;
mod world;

use std::env;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use config::ServerConfig;

fn main() {
    let _ = tracing_subscriber::fmt().with_target(false).try_init();

    let mut config_path: Option<PathBuf> = None;

    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let Some(value) = args.next() else {
                    eprintln!("--config expects a path argument");
                    std::process::exit(2);
                };
                config_path = Some(PathBuf::from(value));
            }
            "--help" | "-h" => {
                println!("Usage: riftway_server [--config <path.toml>]");
                return;
            }
            other => {
                eprintln!("unknown argument: {other}");
                std::process::exit(2);
            }
        }
    }

    let config = match config_path {
        Some(path) => ServerConfig::load(&path),
        None => ServerConfig::default(),
    };

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nShutdown signal received...");
        r.store(false, Ordering::SeqCst);
    })
    .expect("failed to set Ctrl+C handler");

    server::run(config, running);
}
