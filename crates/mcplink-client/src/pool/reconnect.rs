//! Reconnection with exponential backoff
//!
//! `disconnected -> (timer) -> reconnecting -> connected`, or back to
//! `disconnected` with a new timer until the attempt budget is spent.

use mcplink_core::{ConnectionEvent, ConnectionState, McpClientError, McpClientResult, TransportType};
use tracing::{debug, error, info, warn};

use super::connection::{ConnectOutcome, ConnectionService, Registration};

impl ConnectionService {
    /// Arm the reconnection timer for `server_id`, or give up once the
    /// attempt budget is spent.
    pub(crate) fn schedule_reconnection(&self, server_id: &str) {
        let weak = self.weak.clone();
        let scheduled = self.registry.update(server_id, |record| {
            record.cancel_reconnect_timer();
            if record.retry.exhausted() {
                return Err(record.retry.attempts);
            }
            record.retry.attempts += 1;
            record.retry.delay = record.retry.policy.delay_for_attempt(record.retry.attempts);
            let (attempt, delay) = (record.retry.attempts, record.retry.delay);

            let id = server_id.to_string();
            record.arm_reconnect_timer(move |timer_id| {
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Some(service) = weak.upgrade() {
                        service.fire_reconnect_timer(&id, timer_id).await;
                    }
                })
            });
            Ok((attempt, delay))
        });

        match scheduled {
            Some(Ok((attempt, delay))) => {
                info!(
                    server_id = %server_id,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "[ConnectionService] Reconnection scheduled"
                );
                self.emit(ConnectionEvent::ReconnectScheduled {
                    server_id: server_id.to_string(),
                    attempt,
                    delay_ms: delay.as_millis() as u64,
                });
            }
            Some(Err(attempts)) => {
                error!(
                    server_id = %server_id,
                    attempts,
                    "[ConnectionService] Reconnection attempts exhausted, server unavailable"
                );
                self.emit(ConnectionEvent::ReconnectExhausted {
                    server_id: server_id.to_string(),
                    attempts,
                });
            }
            None => debug!(server_id = %server_id, "[ConnectionService] Nothing to reconnect"),
        }
    }

    async fn fire_reconnect_timer(&self, server_id: &str, timer_id: u64) {
        let current = self
            .registry
            .update(server_id, |r| r.detach_reconnect_timer(timer_id))
            .unwrap_or(false);
        if !current {
            debug!(server_id = %server_id, "[ConnectionService] Superseded reconnection timer");
            return;
        }
        // Failures are logged and rescheduled inside; never propagated past the timer
        let _ = self.attempt_reconnection(server_id).await;
    }

    /// One reconnection attempt. Re-entry while an attempt is running returns
    /// `Ok(Reconnecting)` without doing anything.
    pub async fn attempt_reconnection(&self, server_id: &str) -> McpClientResult<ConnectionState> {
        let prepared = self
            .registry
            .update(server_id, |record| {
                if record.state == ConnectionState::Reconnecting {
                    return None;
                }
                record.state = ConnectionState::Reconnecting;
                record.generation = self.registry.next_generation();
                record.cancel_timers();
                Some((
                    record.client.take(),
                    record.config.clone(),
                    record.retry.attempts,
                    record.generation,
                    record.oauth.is_some(),
                ))
            })
            .ok_or_else(|| McpClientError::not_found(server_id))?;

        let Some((client, config, attempt, generation, has_oauth)) = prepared else {
            debug!(server_id = %server_id, "[ConnectionService] Reconnection already in progress");
            return Ok(ConnectionState::Reconnecting);
        };

        info!(
            server_id = %server_id,
            attempt,
            generation,
            "[ConnectionService] Attempting reconnection"
        );
        self.emit_status(server_id, ConnectionState::Reconnecting, generation, None);

        if let Some(client) = client {
            self.close_quietly(server_id, client).await;
        }
        if has_oauth && !self.refresh_token(server_id).await {
            debug!(server_id = %server_id, "[ConnectionService] No refreshed token before reconnect");
        }

        match self.establish(config, Registration::Existing).await {
            Ok(ConnectOutcome::Connected) => {
                info!(server_id = %server_id, "[ConnectionService] Reconnected");
                Ok(ConnectionState::Connected)
            }
            Ok(ConnectOutcome::AuthorizationPending { .. }) => {
                self.registry.update(server_id, |r| {
                    r.state = ConnectionState::Disconnected;
                });
                warn!(
                    server_id = %server_id,
                    "[ConnectionService] Reconnection needs user authorization"
                );
                Ok(ConnectionState::Disconnected)
            }
            Err(e) => {
                error!(
                    server_id = %server_id,
                    attempt,
                    error = %e,
                    "[ConnectionService] Reconnection failed"
                );
                let known = self
                    .registry
                    .update(server_id, |r| {
                        r.state = ConnectionState::Disconnected;
                        r.last_error = Some(e.clone());
                        r.generation
                    });
                if let Some(generation) = known {
                    self.emit_status(
                        server_id,
                        ConnectionState::Disconnected,
                        generation,
                        Some(e.to_string()),
                    );
                    self.schedule_reconnection(server_id);
                }
                Err(e)
            }
        }
    }

    /// Reconnect right now, bypassing the backoff timer. Used when a caller
    /// cannot proceed without a healthy connection.
    pub async fn force_reconnect(&self, server_id: &str) -> McpClientResult<ConnectionState> {
        let client = self
            .registry
            .update(server_id, |record| {
                if record.state == ConnectionState::Reconnecting {
                    return Err(());
                }
                record.cancel_timers();
                let client = record.client.take();
                record.mark_disconnected(None);
                record.generation = self.registry.next_generation();
                Ok(client)
            })
            .ok_or_else(|| McpClientError::not_found(server_id))?;

        let Ok(client) = client else {
            debug!(server_id = %server_id, "[ConnectionService] Reconnection already in progress");
            return Ok(ConnectionState::Reconnecting);
        };

        info!(server_id = %server_id, "[ConnectionService] Forcing reconnection");
        if let Some(client) = client {
            self.close_quietly(server_id, client).await;
        }
        self.attempt_reconnection(server_id).await
    }

    /// Whether `server_id` can serve requests now.
    ///
    /// stdio servers are reconnected on the spot while attempts remain. HTTP
    /// servers that still hold a client are trusted to have self-healed in
    /// the streaming transport.
    pub async fn is_server_available(&self, server_id: &str) -> bool {
        let Some((state, transport, exhausted, has_client, timer_pending)) =
            self.registry.read(server_id, |r| {
                (
                    r.state,
                    r.transport_type(),
                    r.retry.exhausted(),
                    r.client.is_some(),
                    r.has_reconnect_timer(),
                )
            })
        else {
            return false;
        };

        match (state, transport) {
            (ConnectionState::Connected, _) => true,
            (ConnectionState::Disconnected, TransportType::Stdio) if !exhausted => {
                matches!(
                    self.attempt_reconnection(server_id).await,
                    Ok(ConnectionState::Connected)
                )
            }
            (ConnectionState::Disconnected, TransportType::Http) if has_client && !timer_pending => {
                let restored = self
                    .registry
                    .update(server_id, |r| {
                        if r.state != ConnectionState::Disconnected || r.client.is_none() {
                            return None;
                        }
                        r.state = ConnectionState::Connected;
                        r.retry.reset();
                        Some(r.generation)
                    })
                    .flatten();
                match restored {
                    Some(generation) => {
                        debug!(
                            server_id = %server_id,
                            "[ConnectionService] Trusting transport recovery, marking connected"
                        );
                        self.emit_status(server_id, ConnectionState::Connected, generation, None);
                        self.schedule_health_check(server_id);
                        true
                    }
                    None => false,
                }
            }
            _ => false,
        }
    }

    /// Clear the backoff so a server that exhausted its attempts can be
    /// retried.
    pub fn reset_reconnection_state(&self, server_id: &str) -> McpClientResult<()> {
        self.registry
            .update(server_id, |record| {
                record.cancel_reconnect_timer();
                record.retry.reset();
                record.last_error = None;
            })
            .ok_or_else(|| McpClientError::not_found(server_id))?;
        debug!(server_id = %server_id, "[ConnectionService] Reconnection state reset");
        Ok(())
    }
}
