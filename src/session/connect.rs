//! Dialing a coordination service with bounded retries.
//!
//! Endpoints are tried round-robin. Failed dials back off exponentially from
//! `base_delay` up to `max_delay`. The whole connect, including waiting for
//! the `Connected` handshake, is bounded by `connect_timeout`.

use crate::error::{Result, TurnstileError};
use crate::namespace::{Ensemble, NamespaceClient, SessionState};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// Connection parameters for a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Endpoints of the coordination service, tried in order.
    pub endpoints: Vec<String>,
    /// How long the service keeps a silent session alive.
    pub session_timeout: Duration,
    /// Upper bound on the whole connect.
    pub connect_timeout: Duration,
    /// Dial attempts after the first one.
    pub max_retries: u32,
    /// Backoff after the first failed dial.
    pub base_delay: Duration,
    /// Backoff ceiling.
    pub max_delay: Duration,
}

impl SessionSettings {
    pub fn new(endpoints: Vec<String>) -> Self {
        Self {
            endpoints,
            session_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            max_retries: 5,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub(crate) fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Dial until one endpoint yields a connected client.
pub(super) fn dial_connected(
    ensemble: &dyn Ensemble,
    settings: &SessionSettings,
) -> Result<Arc<dyn NamespaceClient>> {
    if settings.endpoints.is_empty() {
        return Err(TurnstileError::Connect("no endpoints configured".to_string()));
    }

    let deadline = Instant::now() + settings.connect_timeout;
    let mut attempt: u32 = 0;
    let mut last_error: String;

    loop {
        let endpoint = &settings.endpoints[attempt as usize % settings.endpoints.len()];
        tracing::debug!(endpoint = %endpoint, attempt, "dialing coordination service");

        match ensemble.dial(endpoint, settings.session_timeout) {
            Ok(client) => {
                if await_connected(client.as_ref(), deadline) {
                    tracing::info!(endpoint = %endpoint, session = %client.session_id(), "session connected");
                    return Ok(client);
                }
                last_error = format!("'{}' did not complete the handshake", endpoint);
                let _ = client.close();
            }
            Err(e) => {
                tracing::warn!(endpoint = %endpoint, error = %e, "dial failed");
                last_error = e.to_string();
            }
        }

        attempt += 1;
        let now = Instant::now();
        if attempt > settings.max_retries || now >= deadline {
            return Err(TurnstileError::Connect(format!(
                "gave up after {} attempt(s): {}",
                attempt, last_error
            )));
        }
        thread::sleep(settings.backoff(attempt).min(deadline - now));
    }
}

/// Wait for the client's `Connected` transition, up to `deadline`.
fn await_connected(client: &dyn NamespaceClient, deadline: Instant) -> bool {
    let signal = Arc::new((Mutex::new(None::<SessionState>), Condvar::new()));
    let remote = Arc::clone(&signal);
    let listener = client.add_state_listener(Arc::new(move |state| {
        let (slot, ready) = &*remote;
        *slot.lock().unwrap_or_else(|poison| poison.into_inner()) = Some(state);
        ready.notify_all();
    }));

    let (slot, ready) = &*signal;
    let mut seen = slot.lock().unwrap_or_else(|poison| poison.into_inner());
    let connected = loop {
        match client.state() {
            SessionState::Connected => break true,
            state if state.is_lost() => break false,
            _ => {}
        }
        if seen.is_some_and(SessionState::is_lost) {
            break false;
        }
        let now = Instant::now();
        if now >= deadline {
            break false;
        }
        seen = ready
            .wait_timeout(seen, deadline - now)
            .map(|(guard, _)| guard)
            .unwrap_or_else(|poison| poison.into_inner().0);
    };
    drop(seen);
    client.remove_state_listener(listener);
    connected
}
