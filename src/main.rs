#![deny(clippy::all)]
#![warn(unused_crate_dependencies)]

mod api;
mod channel;
mod common;
mod config;
mod counters;
mod event;
mod lifecycle;
mod net;

use crate::api::http::serve_http;
use crate::channel::MemoryChannel;
use crate::config::Config;
use crate::net::LineSource;

use log::*;
use std::sync::Arc;

fn setup_logger() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", concat!(env!("CARGO_PKG_NAME"), "=debug"));
    }
    env_logger::init();
}

fn print_help() {
    println!("svarog v{}", env!("CARGO_PKG_VERSION"));
    println!("A TCP source that turns newline-delimited text into channel events\n");
    println!("USAGE:");
    println!("    svarog [OPTIONS] [CONFIG_FILE]\n");
    println!("OPTIONS:");
    println!("    -h, --help       Show this help message\n");
    println!("ARGUMENTS:");
    println!("    [CONFIG_FILE]    Path to configuration file (default: config.toml)\n");
    println!("CONFIGURATION:");
    println!("The configuration file uses a simple key=value format with sections.\n");
    println!("[listen] - Bind address (required)");
    println!("  host = \"0.0.0.0\"                 # Listen address");
    println!("  port = 4100                      # Listen port\n");
    println!("[source] - Line source behaviour");
    println!("  max_line_length = 512            # Max line length in chars, newline included");
    println!("  ack_every_event = true           # Write OK for every accepted line");
    println!("  encoding = \"utf-8\"               # utf-8, utf-16be, utf-16le, utf-32be, utf-32le\n");
    println!("[channel] - Downstream event channel");
    println!("  capacity = 100                   # Queued events before lines are refused\n");
    println!("[http] - HTTP observability server (optional)");
    println!("  bind_addr = \"127.0.0.1:8080\"     # Status page, /api/counters, /metrics\n");
    println!("EXAMPLES:");
    println!("    svarog                        # Use default config.toml");
    println!("    svarog myconfig.toml          # Use custom config file");
    println!("    svarog --help                 # Show this help");
}

fn main() {
    let mut args = std::env::args().skip(1);

    if let Some(arg) = args.next() {
        if arg == "-h" || arg == "--help" {
            print_help();
            return;
        }
        setup_logger();
        let cfg = Config::load(&arg).unwrap_or_else(|e| {
            eprintln!("failed to read config {}: {}", arg, e);
            std::process::exit(1);
        });
        let cfg = Arc::new(cfg);
        info!("config loaded from {}", arg);

        run_server(cfg);
    } else {
        setup_logger();
        let cfg = Config::load("config.toml").unwrap_or_else(|e| {
            eprintln!("failed to read config config.toml: {}", e);
            std::process::exit(1);
        });
        let cfg = Arc::new(cfg);
        info!("config loaded from config.toml");

        run_server(cfg);
    }
}

fn run_server(cfg: Arc<Config>) {
    // Small runtime for startup and the shutdown signal
    let init_runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build init runtime");

    // The source gets its own pool; sessions are cheap but numerous
    let source_runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(8)
        .thread_name("source-worker")
        .enable_all()
        .build()
        .expect("failed to build source runtime");

    // HTTP stays responsive on a separate, smaller pool
    let http_runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .thread_name("http-worker")
        .enable_all()
        .build()
        .expect("failed to build HTTP runtime");

    info!("Created separate runtimes: source (8 workers), HTTP (4 workers)");

    let (channel, mut rx) = MemoryChannel::new(cfg.channel.capacity);
    let source = Arc::new(LineSource::new(cfg.as_ref().clone(), Arc::new(channel)));

    // Drain the channel; without a consumer every put would be refused
    // once the queue fills
    source_runtime.spawn(async move {
        while let Some(event) = rx.recv().await {
            trace!("drained event: {} bytes", event.body().len());
        }
    });

    if let Err(e) = source_runtime.block_on(source.start()) {
        eprintln!("failed to start source: {}", e);
        std::process::exit(1);
    }

    // Spawn HTTP server on its dedicated runtime
    let _http_handle = {
        let cfg = cfg.clone();
        let source = source.clone();
        std::thread::spawn(move || {
            http_runtime.block_on(async move {
                serve_http(cfg, source).await;
            });
        })
    };

    info!("svarog started; press Ctrl-C to stop.");

    // Wait for Ctrl-C in the init runtime
    init_runtime.block_on(async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl-C handler");
    });

    info!("shutting down...");

    if let Err(e) = source_runtime.block_on(source.stop()) {
        error!("shutdown finished with errors: {}", e);
    }

    // The HTTP thread is terminated when main exits
    info!("Goodbye.");
}
