//! Worker-to-reactor completion channel for readiness-mode dispatch. Each worker holds a
//! cloned `Sender<Completion>`; the reactor holds the single `Receiver` and drains it with
//! non-blocking `try_recv` once per event-loop iteration before re-arming sockets.

use std::sync::mpsc;

/// Reported by a worker after performing readiness-mode I/O on a connection's behalf
/// (mirrors `improv`/`timer_flag`, but delivered once instead of polled).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub token: usize,
    /// `true` means the I/O failed or the peer closed; the reactor should run the timer
    /// callback (close + remove) instead of re-arming the socket.
    pub timer_flag: bool,
}

pub type CompletionSender = mpsc::Sender<Completion>;
pub type CompletionReceiver = mpsc::Receiver<Completion>;

pub fn channel() -> (CompletionSender, CompletionReceiver) {
    mpsc::channel()
}

/// Drains every completion currently queued without blocking, for the reactor's per-tick sweep.
pub fn drain(rx: &CompletionReceiver) -> Vec<Completion> {
    let mut out = Vec::new();
    while let Ok(c) = rx.try_recv() {
        out.push(c);
    }
    out
}
