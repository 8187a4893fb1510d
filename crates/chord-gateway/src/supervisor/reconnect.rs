//! Reconnect supervisor
//!
//! Runs session attempts one after another. Between attempts it waits out
//! the backoff delay; it stops on a stop request, on a close the peer marks
//! as final, or when the retry budget runs out.

use super::Backoff;
use crate::events::ClientEvent;
use crate::session::{CloseReason, SessionOutcome, SessionState};
use chord_common::{ClientError, ClientResult};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::future::Future;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

/// Drives repeated session attempts with backoff
#[derive(Debug)]
pub struct ReconnectSupervisor {
    backoff: Backoff,
    stop: CancellationToken,
    events: broadcast::Sender<ClientEvent>,
    rng: StdRng,
    attempts: u32,
}

impl ReconnectSupervisor {
    #[must_use]
    pub fn new(backoff: Backoff, stop: CancellationToken, events: broadcast::Sender<ClientEvent>) -> Self {
        Self {
            backoff,
            stop,
            events,
            rng: StdRng::from_entropy(),
            attempts: 0,
        }
    }

    /// Attempts started so far
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    #[must_use]
    pub const fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    /// Run attempts until stopped or a non-retryable end
    ///
    /// `attempt` receives the session state to resume from and returns it in
    /// the outcome. A stop requested while an attempt runs lets that attempt
    /// finish its close, then schedules nothing further.
    pub async fn run<F, Fut>(mut self, mut state: SessionState, mut attempt: F) -> ClientResult<()>
    where
        F: FnMut(SessionState) -> Fut,
        Fut: Future<Output = SessionOutcome>,
    {
        let result = loop {
            if self.stop.is_cancelled() {
                break Ok(());
            }

            self.attempts += 1;
            self.emit(ClientEvent::ConnectAttempt {
                attempt: self.attempts,
            });
            tracing::debug!(attempt = self.attempts, "Starting session attempt");

            let outcome = attempt(state).await;
            state = outcome.state;
            if outcome.established {
                self.backoff.reset();
            }
            self.emit(ClientEvent::Disconnected {
                reason: outcome.reason.clone(),
            });

            if let Some(err) = outcome.reason.terminal_error() {
                tracing::error!(reason = %outcome.reason, "Gateway refused the session, not reconnecting");
                break Err(err);
            }
            if outcome.reason == CloseReason::Stopped || self.stop.is_cancelled() {
                break Ok(());
            }
            if !outcome.reason.preserves_session() {
                tracing::debug!(reason = %outcome.reason, "Session discarded by peer");
                state.reset();
            }

            let Some(delay) = self.backoff.next_delay(&mut self.rng) else {
                let failures = self.backoff.attempt_count().saturating_sub(1);
                tracing::error!(failures, "Reconnect budget exhausted");
                break Err(ClientError::ReconnectBudgetExhausted { attempts: failures });
            };

            tracing::info!(
                reason = %outcome.reason,
                delay_ms = delay.as_millis() as u64,
                resumable = state.can_resume(),
                "Reconnecting"
            );
            self.emit(ClientEvent::RetryScheduled {
                attempt: self.attempts + 1,
                delay,
            });

            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = self.stop.cancelled() => break Ok(()),
            }
        };

        self.emit(ClientEvent::Stopped);
        result
    }

    fn emit(&self, event: ClientEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}
