//! The push operation: one change set out, boolean success back.

use crate::config::PushConfig;
use crate::error::{SyncError, SyncResult};
use crate::transport::{HttpClient, SocketChannel};
use offgrid_store::Row;
use std::sync::Arc;

/// Routes change sets to the injected transports.
///
/// Holds at most one socket channel and one HTTP client; a type's
/// [`PushConfig`] selects which one carries its changes. Delivery
/// failures of any kind (missing transport, closed channel, transport
/// error, non-success status) come back as `false` — the caller keeps
/// the change queued and retries on a later replay pass. There is no
/// partial success.
#[derive(Default, Clone)]
pub struct PushRouter {
    socket: Option<Arc<dyn SocketChannel>>,
    http: Option<Arc<dyn HttpClient>>,
}

impl PushRouter {
    /// Creates a router with no transports.
    ///
    /// Every push through an empty router fails, which queues all
    /// changes — a valid configuration for a fully offline graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Injects the duplex socket channel.
    pub fn with_socket(mut self, channel: Arc<dyn SocketChannel>) -> Self {
        self.socket = Some(channel);
        self
    }

    /// Injects the HTTP client.
    pub fn with_http(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http = Some(client);
        self
    }

    /// Attempts delivery of one change set.
    pub fn push(&self, config: &PushConfig, entity_type: &str, changes: &Row) -> bool {
        match self.attempt(config, entity_type, changes) {
            Ok(delivered) => delivered,
            Err(err) => {
                tracing::debug!(entity_type, error = %err, "push failed");
                false
            }
        }
    }

    fn attempt(&self, config: &PushConfig, entity_type: &str, changes: &Row) -> SyncResult<bool> {
        match config {
            PushConfig::Socket => {
                let Some(channel) = &self.socket else {
                    tracing::warn!(entity_type, "no socket channel injected");
                    return Ok(false);
                };
                if !channel.is_open() {
                    return Ok(false);
                }
                let message = socket_envelope(entity_type, changes)?;
                channel.send(&message)?;
                Ok(true)
            }
            PushConfig::Endpoint(endpoint) => {
                let Some(client) = &self.http else {
                    tracing::warn!(entity_type, "no http client injected");
                    return Ok(false);
                };
                let body = serde_json::to_vec(changes).map_err(SyncError::encode)?;
                let status = client.request(&endpoint.url, &endpoint.method, body)?;
                Ok(status == 200)
            }
        }
    }
}

impl std::fmt::Debug for PushRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PushRouter")
            .field("socket", &self.socket.is_some())
            .field("http", &self.http.is_some())
            .finish()
    }
}

/// Builds the socket wire envelope:
/// `{"message": "update", "data": {"type": ..., <changes>}}`.
fn socket_envelope(entity_type: &str, changes: &Row) -> SyncResult<Vec<u8>> {
    let mut data = serde_json::Map::new();
    data.insert(
        "type".to_string(),
        serde_json::Value::String(entity_type.to_string()),
    );
    for (field, value) in changes {
        data.insert(
            field.clone(),
            serde_json::to_value(value).map_err(SyncError::encode)?,
        );
    }

    let envelope = serde_json::json!({
        "message": "update",
        "data": serde_json::Value::Object(data),
    });
    serde_json::to_vec(&envelope).map_err(SyncError::encode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Endpoint;
    use crate::transport::{ScriptedHttp, ScriptedSocket};
    use offgrid_store::Value;

    fn changes() -> Row {
        let mut row = Row::new();
        row.insert("id".into(), Value::text("t1"));
        row.insert("title".into(), Value::text("Buy bread"));
        row
    }

    #[test]
    fn socket_push_sends_envelope() {
        let socket = Arc::new(ScriptedSocket::new());
        let router = PushRouter::new().with_socket(socket.clone());

        assert!(router.push(&PushConfig::Socket, "Task", &changes()));

        let frames = socket.sent_text();
        assert_eq!(frames.len(), 1);
        let parsed: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(parsed["message"], "update");
        assert_eq!(parsed["data"]["type"], "Task");
        assert_eq!(parsed["data"]["id"], "t1");
        assert_eq!(parsed["data"]["title"], "Buy bread");
    }

    #[test]
    fn closed_socket_fails_push() {
        let socket = Arc::new(ScriptedSocket::new());
        socket.set_open(false);
        let router = PushRouter::new().with_socket(socket.clone());

        assert!(!router.push(&PushConfig::Socket, "Task", &changes()));
        assert!(socket.sent().is_empty());
    }

    #[test]
    fn missing_transport_fails_push() {
        let router = PushRouter::new();
        assert!(!router.push(&PushConfig::Socket, "Task", &changes()));
        assert!(!router.push(&PushConfig::endpoint("https://x"), "Task", &changes()));
    }

    #[test]
    fn endpoint_push_uses_url_and_method() {
        let http = Arc::new(ScriptedHttp::with_status(200));
        let router = PushRouter::new().with_http(http.clone());
        let config = PushConfig::Endpoint(Endpoint::new("https://example.com/tasks"));

        assert!(router.push(&config, "Task", &changes()));

        let requests = http.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, "https://example.com/tasks");
        assert_eq!(requests[0].method, "PATCH");

        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["title"], "Buy bread");
    }

    #[test]
    fn non_success_status_fails_push() {
        let http = Arc::new(ScriptedHttp::with_status(500));
        let router = PushRouter::new().with_http(http);

        assert!(!router.push(&PushConfig::endpoint("https://x"), "Task", &changes()));
    }

    #[test]
    fn relationship_values_encode_as_id_objects() {
        let socket = Arc::new(ScriptedSocket::new());
        let router = PushRouter::new().with_socket(socket.clone());

        let mut list_ref = std::collections::BTreeMap::new();
        list_ref.insert("id".to_string(), Value::text("l1"));
        let mut row = changes();
        row.insert("list".into(), Value::Map(list_ref));

        assert!(router.push(&PushConfig::Socket, "Task", &row));
        let parsed: serde_json::Value =
            serde_json::from_str(&socket.sent_text()[0]).unwrap();
        assert_eq!(parsed["data"]["list"]["id"], "l1");
    }
}
