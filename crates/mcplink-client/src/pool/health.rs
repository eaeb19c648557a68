//! Idle health checks for HTTP servers
//!
//! A silently dead HTTP session is only noticed on the next request. To keep
//! active traffic free of probes, a ping is sent only after a server has been
//! idle for its configured window.

use std::sync::Arc;

use mcplink_core::{ConnectionState, TransportType};
use tokio::time::Instant;
use tracing::{debug, info};

use super::client::ClientHandle;
use super::connection::ConnectionService;

enum Probe {
    Superseded,
    Skip,
    Reschedule,
    Ping(Arc<dyn ClientHandle>, u64),
}

impl ConnectionService {
    /// Ping the server now. A failure is routed through the client-error path.
    pub async fn validate_http_session(&self, server_id: &str) -> bool {
        let Some((Some(client), generation)) =
            self.registry.read(server_id, |r| (r.client.clone(), r.generation))
        else {
            return false;
        };

        match tokio::time::timeout(self.health_check_timeout, client.ping()).await {
            Ok(Ok(())) => {
                self.record_activity(server_id);
                true
            }
            Ok(Err(e)) => {
                self.handle_client_error(server_id, Some(generation), &format!("{:#}", e));
                false
            }
            Err(_) => {
                self.handle_client_error(
                    server_id,
                    Some(generation),
                    &format!("ping timed out after {:?}", self.health_check_timeout),
                );
                false
            }
        }
    }

    /// Stamp activity and push the next idle check out accordingly.
    pub fn record_activity(&self, server_id: &str) {
        let known = self
            .registry
            .update(server_id, |r| r.last_activity = Instant::now())
            .is_some();
        if known {
            self.schedule_health_check(server_id);
        }
    }

    /// Arm the idle timer for `idle` after the last recorded activity.
    pub(crate) fn schedule_health_check(&self, server_id: &str) {
        self.arm_health_check(server_id, None);
    }

    /// Arm the idle timer at `due`, or at last activity + idle window.
    fn arm_health_check(&self, server_id: &str, due: Option<Instant>) {
        let weak = self.weak.clone();
        self.registry.update(server_id, |record| {
            if record.transport_type() != TransportType::Http || !record.config.health_check_enabled {
                record.cancel_health_check_timer();
                return;
            }
            if record.state != ConnectionState::Connected {
                return;
            }
            let due = due.unwrap_or(record.last_activity + record.config.health_check_idle());
            let id = server_id.to_string();
            record.arm_health_check_timer(move |timer_id| {
                tokio::spawn(async move {
                    tokio::time::sleep_until(due).await;
                    if let Some(service) = weak.upgrade() {
                        service.perform_health_check(&id, timer_id).await;
                    }
                })
            });
        });
    }

    async fn perform_health_check(&self, server_id: &str, timer_id: u64) {
        let probe = self
            .registry
            .update(server_id, |record| {
                if !record.detach_health_check_timer(timer_id) {
                    return Probe::Superseded;
                }
                if record.state != ConnectionState::Connected {
                    return Probe::Skip;
                }
                if record.last_activity.elapsed() < record.config.health_check_idle() {
                    return Probe::Reschedule;
                }
                match &record.client {
                    Some(client) => Probe::Ping(Arc::clone(client), record.generation),
                    None => Probe::Skip,
                }
            })
            .unwrap_or(Probe::Superseded);

        let (client, generation) = match probe {
            Probe::Superseded => return,
            Probe::Skip => {
                debug!(server_id = %server_id, "[ConnectionService] Health check skipped, not connected");
                return;
            }
            Probe::Reschedule => {
                debug!(
                    server_id = %server_id,
                    "[ConnectionService] Activity during idle wait, rescheduling health check"
                );
                self.schedule_health_check(server_id);
                return;
            }
            Probe::Ping(client, generation) => (client, generation),
        };

        debug!(server_id = %server_id, "[ConnectionService] Idle health check ping");
        match tokio::time::timeout(self.health_check_timeout, client.ping()).await {
            Ok(Ok(())) => {
                let idle = self
                    .registry
                    .read(server_id, |r| r.config.health_check_idle())
                    .unwrap_or_default();
                self.arm_health_check(server_id, Some(Instant::now() + idle));
            }
            Ok(Err(e)) => {
                info!(server_id = %server_id, error = %e, "[ConnectionService] Health check failed");
                self.handle_client_error(server_id, Some(generation), &format!("health check failed: {:#}", e));
            }
            Err(_) => {
                info!(server_id = %server_id, "[ConnectionService] Health check timed out");
                self.handle_client_error(
                    server_id,
                    Some(generation),
                    &format!("health check timed out after {:?}", self.health_check_timeout),
                );
            }
        }
    }
}
