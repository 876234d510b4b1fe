use std::io;
use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crate::call::call_event::{CallEvent, CallOutput, CallUpdate};
use crate::call::call_session::CallSession;
use crate::call::signal_sink::SignalSink;
use crate::call::session_registry::ActiveCall;
use crate::log::LogSink;
use crate::signaling::protocol::ParticipantId;
use crate::{sink_debug, sink_warn};

/// Everything a worker shares with its registry.
pub(crate) struct WorkerContext {
    pub slot: Arc<Mutex<Option<ActiveCall>>>,
    pub signals: Arc<dyn SignalSink>,
    pub updates: Sender<CallUpdate>,
    pub log: Arc<dyn LogSink>,
}

/// Run `session` on its own thread, fed only by `rx`.
///
/// The loop waits for the next event or the session's next deadline,
/// whichever comes first. When the session finishes, the registry slot is
/// released before the final outputs go out, so anyone reacting to the
/// `Ended` notice already sees the registry free.
pub(crate) fn spawn_call_worker(
    mut session: CallSession,
    peer_id: ParticipantId,
    rx: Receiver<CallEvent>,
    ctx: WorkerContext,
) -> io::Result<JoinHandle<()>> {
    let call_id = session.call_id();
    thread::Builder::new()
        .name(format!("call-{call_id:016x}"))
        .spawn(move || {
            loop {
                let outputs = match session.next_deadline() {
                    Some(at) => {
                        let wait = at.saturating_duration_since(Instant::now());
                        match rx.recv_timeout(wait) {
                            Ok(ev) => session.handle(ev),
                            Err(RecvTimeoutError::Timeout) => session.on_deadline(Instant::now()),
                            Err(RecvTimeoutError::Disconnected) => break,
                        }
                    }
                    None => match rx.recv() {
                        Ok(ev) => session.handle(ev),
                        Err(_) => break,
                    },
                };

                let finished = session.is_finished();
                if finished {
                    release_slot(&ctx.slot, call_id);
                }
                deliver(&ctx, call_id, &peer_id, outputs);
                if finished {
                    break;
                }
            }
            sink_debug!(ctx.log, "[call {:016x}] worker exiting", call_id);
        })
}

fn release_slot(slot: &Mutex<Option<ActiveCall>>, call_id: u64) {
    let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
    if guard.as_ref().is_some_and(|active| active.call_id == call_id) {
        *guard = None;
    }
}

fn deliver(ctx: &WorkerContext, call_id: u64, peer_id: &str, outputs: Vec<CallOutput>) {
    for output in outputs {
        match output {
            CallOutput::Signal(msg) => {
                let kind = msg.kind();
                if let Err(e) = ctx.signals.send_signal(msg) {
                    sink_warn!(
                        ctx.log,
                        "[call {:016x}] could not send {}: {}",
                        call_id,
                        kind,
                        e
                    );
                }
            }
            CallOutput::Notice(notice) => {
                let _ = ctx.updates.send(CallUpdate {
                    call_id,
                    peer_id: peer_id.to_string(),
                    notice,
                });
            }
        }
    }
}
