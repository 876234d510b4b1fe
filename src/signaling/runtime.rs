use std::collections::HashMap;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender};

use crate::log::LogSink;
use crate::signaling::protocol::SignalingMsg;
use crate::signaling::router::Router;
use crate::signaling::server_event::ServerEvent;
use crate::signaling::types::ClientId;
use crate::{sink_debug, sink_info, sink_warn};

/// Central server loop: owns the Router and maps client_id -> Sender<SignalingMsg>.
///
/// Every presence change and every relay decision happens on this one
/// thread, so connect/disconnect handling and the online-set broadcast that
/// follows are never interleaved with another connection's events.
pub fn run_server_loop(mut router: Router, log: Arc<dyn LogSink>, rx: Receiver<ServerEvent>) {
    let mut clients: HashMap<ClientId, Sender<SignalingMsg>> = HashMap::new();

    while let Ok(ev) = rx.recv() {
        match ev {
            ServerEvent::RegisterClient {
                client_id,
                to_client,
            } => {
                router.register_client(client_id);
                clients.insert(client_id, to_client);

                sink_info!(
                    log,
                    "registered client {} in server loop (now {} clients)",
                    client_id,
                    clients.len()
                );
            }

            ServerEvent::MsgFromClient { client_id, msg } => {
                sink_debug!(log, "MsgFromClient from {}: {}", client_id, msg.kind());
                router.handle_from_client(client_id, msg);
                deliver(&mut router, &clients, &log);
            }

            ServerEvent::Disconnected { client_id } => {
                // Dropping the sender also stops that connection's I/O thread.
                if clients.remove(&client_id).is_some() {
                    sink_info!(log, "client {} disconnected (transport)", client_id);
                    router.unregister_client(client_id);
                    deliver(&mut router, &clients, &log);
                }
            }
        }
    }

    sink_info!(
        log,
        "ServerEvent channel closed; server loop shutting down ({} clients left)",
        clients.len()
    );
}

/// Drain all pending outgoing msgs and hand them to the I/O threads.
fn deliver(
    router: &mut Router,
    clients: &HashMap<ClientId, Sender<SignalingMsg>>,
    log: &Arc<dyn LogSink>,
) {
    for (c_target_id, out_msg) in router.drain_all_outgoing() {
        match clients.get(&c_target_id) {
            Some(tx) => {
                if tx.send(out_msg).is_err() {
                    sink_warn!(
                        log,
                        "failed to deliver message to client {} (channel closed)",
                        c_target_id
                    );
                }
            }
            None => {
                sink_warn!(log, "no client {} to deliver outgoing message", c_target_id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    use crate::log::NoopLogSink;

    fn register(ev_tx: &Sender<ServerEvent>, client_id: ClientId) -> mpsc::Receiver<SignalingMsg> {
        let (to_client_tx, to_client_rx) = mpsc::channel::<SignalingMsg>();
        ev_tx
            .send(ServerEvent::RegisterClient {
                client_id,
                to_client: to_client_tx,
            })
            .unwrap();
        to_client_rx
    }

    fn hello(ev_tx: &Sender<ServerEvent>, client_id: ClientId, id: &str) {
        ev_tx
            .send(ServerEvent::MsgFromClient {
                client_id,
                msg: SignalingMsg::Hello {
                    participant_id: id.into(),
                },
            })
            .unwrap();
    }

    fn expect_online(rx: &mpsc::Receiver<SignalingMsg>, expected: &[&str]) {
        let msg = rx
            .recv_timeout(Duration::from_millis(500))
            .expect("expected a message from server");
        match msg {
            SignalingMsg::OnlineSet { participant_ids } => assert_eq!(participant_ids, expected),
            other => panic!("expected OnlineSet, got {:?}", other),
        }
    }

    #[test]
    fn server_loop_broadcasts_presence_changes() {
        let (ev_tx, ev_rx) = mpsc::channel::<ServerEvent>();
        let log = Arc::new(NoopLogSink);
        let handle = thread::spawn(move || {
            run_server_loop(Router::new(), log, ev_rx);
        });

        let rx1 = register(&ev_tx, 1);
        let rx2 = register(&ev_tx, 2);

        hello(&ev_tx, 1, "alice");
        expect_online(&rx1, &["alice"]);

        hello(&ev_tx, 2, "bob");
        expect_online(&rx1, &["alice", "bob"]);
        expect_online(&rx2, &["alice", "bob"]);

        ev_tx
            .send(ServerEvent::Disconnected { client_id: 2 })
            .unwrap();
        expect_online(&rx1, &["alice"]);

        // the departed client's channel was dropped by the loop
        assert!(rx2.recv_timeout(Duration::from_millis(200)).is_err());

        drop(ev_tx);
        handle.join().unwrap();
    }

    #[test]
    fn duplicate_disconnect_is_ignored() {
        let (ev_tx, ev_rx) = mpsc::channel::<ServerEvent>();
        let handle = thread::spawn(move || {
            run_server_loop(Router::new(), Arc::new(NoopLogSink), ev_rx);
        });

        let rx1 = register(&ev_tx, 1);
        let _rx2 = register(&ev_tx, 2);
        hello(&ev_tx, 1, "alice");
        hello(&ev_tx, 2, "bob");
        expect_online(&rx1, &["alice"]);
        expect_online(&rx1, &["alice", "bob"]);

        ev_tx.send(ServerEvent::Disconnected { client_id: 2 }).unwrap();
        ev_tx.send(ServerEvent::Disconnected { client_id: 2 }).unwrap();
        expect_online(&rx1, &["alice"]);
        assert!(rx1.recv_timeout(Duration::from_millis(200)).is_err());

        drop(ev_tx);
        handle.join().unwrap();
    }
}
