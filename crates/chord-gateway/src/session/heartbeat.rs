//! Heartbeat controller
//!
//! Sends HEARTBEAT (op 1) with the last seen sequence every interval, and
//! doubles as the liveness watchdog: if nothing has arrived from the peer for
//! `timeout_factor` intervals, it fires the expiry token instead of sending.
//! Heartbeats never wait on the outbound queue, so a stuck socket cannot hold
//! the watchdog back.

use crate::connection::Connection;
use crate::protocol::Envelope;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Owns at most one running heartbeat task
#[derive(Debug)]
pub struct HeartbeatController {
    connection: Connection,
    sequence: watch::Receiver<u64>,
    timeout_factor: u32,
    expired: CancellationToken,
    sent: Arc<AtomicU64>,
    task: Option<(CancellationToken, JoinHandle<()>)>,
}

impl HeartbeatController {
    #[must_use]
    pub fn new(connection: Connection, sequence: watch::Receiver<u64>, timeout_factor: u32) -> Self {
        Self {
            connection,
            sequence,
            timeout_factor: timeout_factor.max(1),
            expired: CancellationToken::new(),
            sent: Arc::new(AtomicU64::new(0)),
            task: None,
        }
    }

    /// Start heartbeating every `interval`, replacing any running task
    ///
    /// The first heartbeat goes out one interval after the call.
    pub fn start(&mut self, interval: Duration) {
        self.stop();

        let interval = interval.max(Duration::from_millis(1));
        let deadline = interval * self.timeout_factor;
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let connection = self.connection.clone();
        let sequence = self.sequence.clone();
        let expired = self.expired.clone();
        let sent = Arc::clone(&self.sent);

        tracing::debug!(interval_ms = interval.as_millis() as u64, "Starting heartbeat");

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = task_cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let silent_for = connection.time_since_inbound();
                        if silent_for > deadline {
                            tracing::warn!(
                                silent_ms = silent_for.as_millis() as u64,
                                deadline_ms = deadline.as_millis() as u64,
                                "No frames from peer"
                            );
                            expired.cancel();
                            break;
                        }

                        let seq = *sequence.borrow();
                        if connection.try_send(Envelope::heartbeat(seq)).is_err() {
                            break;
                        }
                        sent.fetch_add(1, Ordering::Relaxed);
                        tracing::trace!(seq, "Heartbeat sent");
                    }
                }
            }
        });

        self.task = Some((cancel, handle));
    }

    /// Stop the running task, if any; safe to call repeatedly
    pub fn stop(&mut self) {
        if let Some((cancel, handle)) = self.task.take() {
            cancel.cancel();
            handle.abort();
            tracing::debug!("Heartbeat stopped");
        }
    }

    /// Whether a heartbeat task is running
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|(_, handle)| !handle.is_finished())
    }

    /// Cancelled once the watchdog gives up on the peer
    #[must_use]
    pub fn expiry(&self) -> CancellationToken {
        self.expired.clone()
    }

    /// Heartbeats sent so far
    #[must_use]
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

impl Drop for HeartbeatController {
    fn drop(&mut self) {
        self.stop();
    }
}
