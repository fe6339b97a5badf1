//! Audit logger.
//!
//! Events are queued on an unbounded channel and written by a background
//! task, so a slow or failing audit store never fails the request that
//! produced the event. Write failures are logged at `warn` and dropped.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::audit::{AuditAction, AuditEntry};
use crate::models::auth::ClientInfo;
use crate::store::AuditStore;
use crate::uuid::uuidv7;

/// One security event, before it is stamped and stored.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub actor_id: Option<Uuid>,
    pub action: AuditAction,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub details: Value,
    pub client: ClientInfo,
}

impl AuditEvent {
    pub fn new(action: AuditAction, resource_type: impl Into<String>) -> Self {
        Self {
            actor_id: None,
            action,
            resource_type: resource_type.into(),
            resource_id: None,
            details: Value::Object(Default::default()),
            client: ClientInfo::default(),
        }
    }

    pub fn actor(mut self, actor_id: Uuid) -> Self {
        self.actor_id = Some(actor_id);
        self
    }

    pub fn resource(mut self, resource_id: impl ToString) -> Self {
        self.resource_id = Some(resource_id.to_string());
        self
    }

    pub fn details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    pub fn client(mut self, client: &ClientInfo) -> Self {
        self.client = client.clone();
        self
    }

    fn into_entry(self) -> AuditEntry {
        AuditEntry {
            id: uuidv7(),
            actor_id: self.actor_id,
            action: self.action.as_str().to_string(),
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            details: self.details,
            ip_address: self.client.ip_address,
            user_agent: self.client.user_agent,
            created_at: Utc::now(),
        }
    }
}

enum Command {
    Record(AuditEntry),
    Flush(oneshot::Sender<()>),
}

/// Handle to the audit queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AuditLogger {
    tx: mpsc::UnboundedSender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::Record(entry) => f.debug_tuple("Record").field(&entry.action).finish(),
            Command::Flush(_) => f.write_str("Flush"),
        }
    }
}

impl AuditLogger {
    /// Start the writer task. Must be called inside a tokio runtime.
    pub fn spawn<S>(store: Arc<S>) -> Self
    where
        S: AuditStore + ?Sized + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<Command>();
        tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    Command::Record(entry) => {
                        if let Err(e) = store.insert_audit_entry(&entry).await {
                            warn!(action = %entry.action, "failed to record audit entry: {e}");
                        } else {
                            debug!(action = %entry.action, "audit entry recorded");
                        }
                    }
                    Command::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
        });
        Self { tx }
    }

    /// Queue an event. Never blocks and never fails the caller.
    pub fn record(&self, event: AuditEvent) {
        let action = event.action;
        if self.tx.send(Command::Record(event.into_entry())).is_err() {
            warn!(%action, "audit queue closed, event dropped");
        }
    }

    /// Wait until every event queued before this call has been handled.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(Command::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }
}
