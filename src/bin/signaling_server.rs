use std::sync::Arc;
use std::{env, process};

use peercall::config::Config;
use peercall::log::{LogSink, Logger};
use peercall::logger_info;
use peercall::signaling::RelayConfig;
use peercall::signaling::run::run_signaling_server_with_log;

fn usage(prog: &str) -> ! {
    eprintln!("Usage:");
    eprintln!("  {prog}                   # listen on 0.0.0.0:5000");
    eprintln!("  {prog} [ADDR]            # e.g. 0.0.0.0:6000");
    eprintln!("  {prog} [IP] [PORT]       # e.g. 127.0.0.1 6000");
    eprintln!("  {prog} --config FILE     # [Signaling] / [Logging] from an INI file");
    eprintln!();
    eprintln!("When using cargo:");
    eprintln!("  cargo run --bin signaling_server -- 127.0.0.1 6000");
    process::exit(1);
}

fn main() -> std::io::Result<()> {
    // --- Parse CLI args ----------------------------------------------------
    let args: Vec<String> = env::args().collect();
    let prog = args.first().map(String::as_str).unwrap_or("signaling_server");

    let (config, relay) = match args.len() {
        // no extra args -> default listen address
        1 => (Config::empty(), RelayConfig::default()),

        // --config FILE
        3 if args[1] == "--config" => {
            let config = match Config::load(&args[2]) {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("[signaling_server] {e}");
                    process::exit(1);
                }
            };
            let relay = RelayConfig::from_config(&config);
            (config, relay)
        }

        // one extra arg: full addr "IP:PORT"
        2 if !args[1].starts_with('-') => (Config::empty(), RelayConfig::plain(args[1].clone())),

        // two extra args: IP + PORT
        3 => (
            Config::empty(),
            RelayConfig::plain(format!("{}:{}", args[1], args[2])),
        ),

        _ => usage(prog),
    };

    // --- Start process logger ----------------------------------------------
    let logger = Logger::start_server(&config);
    logger_info!(logger, "signaling server starting on {}", relay.bind_addr);
    let log_sink: Arc<dyn LogSink> = Arc::new(logger.handle());

    eprintln!(
        "[signaling_server] starting on {} (log file {})",
        relay.bind_addr,
        logger.file_path().display()
    );

    // --- Run signaling server (blocks) -------------------------------------
    let result = run_signaling_server_with_log(&relay, log_sink);
    if let Err(e) = &result {
        eprintln!("[signaling_server] stopped: {e}");
    }
    logger.shutdown();
    result
}
