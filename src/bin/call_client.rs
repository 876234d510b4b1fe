use std::sync::Arc;
use std::time::{Duration, Instant};
use std::{env, process};

use peercall::call::loopback::{LoopbackTally, loopback_capabilities};
use peercall::call::{CallConfig, CallNotice, SessionState};
use peercall::client::{AgentEvent, CallAgent};
use peercall::config::Config;
use peercall::log::{LogSink, Logger};
use peercall::logger_info;
use peercall::signaling_client::SignalingClientConfig;

/// How long the caller stays connected before hanging up.
const HOLD: Duration = Duration::from_secs(5);

fn usage(prog: &str) -> ! {
    eprintln!("Usage:");
    eprintln!("  {prog} SERVER_ADDR MY_ID            # wait for calls, auto-accept");
    eprintln!("  {prog} SERVER_ADDR MY_ID PEER_ID    # call PEER_ID once it is online");
    eprintln!();
    eprintln!("Media is simulated (loopback). Set PEERCALL_CONFIG to an INI file for");
    eprintln!("[Signaling] / [Call] / [Logging] settings.");
    process::exit(1);
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let prog = args.first().map(String::as_str).unwrap_or("call_client");
    let (server_addr, my_id, peer_id) = match args.as_slice() {
        [_, addr, me] => (addr.clone(), me.clone(), None),
        [_, addr, me, peer] => (addr.clone(), me.clone(), Some(peer.clone())),
        _ => usage(prog),
    };

    let config = match env::var("PEERCALL_CONFIG") {
        Ok(path) => Config::load(&path).unwrap_or_else(|e| {
            eprintln!("[call_client] {e}");
            process::exit(1);
        }),
        Err(_) => Config::empty(),
    };
    let mut signaling = SignalingClientConfig::from_config(&config);
    signaling.server_addr = server_addr;
    let call_config = CallConfig::from_config(&config);

    let logger = Logger::start_client(&config);
    logger_info!(logger, "call client {} starting", my_id);
    let log_sink: Arc<dyn LogSink> = Arc::new(logger.handle());

    let tally = LoopbackTally::new();
    let mut agent = match CallAgent::connect(
        &signaling,
        call_config,
        my_id.clone(),
        loopback_capabilities(&tally),
        log_sink,
    ) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("[call_client] cannot reach relay {}: {e}", signaling.server_addr);
            logger.shutdown();
            process::exit(1);
        }
    };
    println!("[{my_id}] connected to {}", signaling.server_addr);

    let mut dialed = false;
    let mut connected_at: Option<Instant> = None;

    'main: loop {
        for event in agent.poll(Duration::from_millis(250)) {
            match event {
                AgentEvent::Online(ids) => {
                    println!("[{my_id}] online: {}", ids.join(", "));
                    if let Some(peer) = &peer_id
                        && !dialed
                        && agent.is_online(peer)
                    {
                        dialed = true;
                        match agent.call(peer) {
                            Ok(_) => println!("[{my_id}] calling {peer}"),
                            Err(e) => {
                                eprintln!("[{my_id}] call failed: {e}");
                                break 'main;
                            }
                        }
                    }
                }
                AgentEvent::Call(update) => match update.notice {
                    CallNotice::StateChanged(SessionState::Ringing) => {
                        println!("[{my_id}] {} is calling, accepting", update.peer_id);
                        if let Err(e) = agent.accept() {
                            eprintln!("[{my_id}] accept failed: {e}");
                        }
                    }
                    CallNotice::StateChanged(SessionState::Connected) => {
                        println!("[{my_id}] connected with {}", update.peer_id);
                        connected_at = Some(Instant::now());
                    }
                    CallNotice::StateChanged(state) => println!("[{my_id}] call {state}"),
                    CallNotice::ConnectivityChanged(state) => {
                        println!("[{my_id}] transport {state}");
                    }
                    CallNotice::Error(e) => eprintln!("[{my_id}] call error: {e}"),
                    CallNotice::Ended { reason } => {
                        println!("[{my_id}] call with {} ended: {reason}", update.peer_id);
                        connected_at = None;
                        if peer_id.is_some() {
                            break 'main;
                        }
                    }
                },
                AgentEvent::Disconnected { reason } => {
                    eprintln!("[{my_id}] relay connection lost: {reason}");
                    break 'main;
                }
            }
        }

        // Warnings and errors from the stack, plus a sample of the rest.
        for line in logger.drain_ui() {
            eprintln!("[{my_id}] {line}");
        }

        if peer_id.is_some()
            && connected_at.is_some_and(|t| t.elapsed() >= HOLD)
        {
            println!("[{my_id}] hanging up");
            let _ = agent.hang_up();
            connected_at = None;
        }
    }

    drop(agent);
    for line in logger.drain_ui() {
        eprintln!("[{my_id}] {line}");
    }
    logger.shutdown();
}
