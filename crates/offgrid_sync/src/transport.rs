//! Transport traits and scripted test doubles.
//!
//! The actual network clients are abstracted behind traits so callers
//! can plug in whatever socket or HTTP library they use. This core only
//! needs readiness checks and boolean-success semantics.

use crate::error::{SyncError, SyncResult};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

/// A duplex channel with an observable open/closed state.
///
/// A push over a channel that is not open is treated as a delivery
/// failure, never an error.
pub trait SocketChannel: Send + Sync {
    /// Returns true if the channel is in an open ready state.
    fn is_open(&self) -> bool;

    /// Sends one message over the channel.
    fn send(&self, message: &[u8]) -> SyncResult<()>;
}

/// A request/response client.
///
/// Implementations return the response status code; everything else
/// about the HTTP stack is their business.
pub trait HttpClient: Send + Sync {
    /// Performs one request and returns the response status.
    fn request(&self, url: &str, method: &str, body: Vec<u8>) -> SyncResult<u16>;
}

/// A scripted socket for tests: an open flag and a log of sent frames.
#[derive(Debug, Default)]
pub struct ScriptedSocket {
    open: AtomicBool,
    sent: Mutex<Vec<Vec<u8>>>,
}

impl ScriptedSocket {
    /// Creates an open scripted socket.
    pub fn new() -> Self {
        Self {
            open: AtomicBool::new(true),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Sets the open state.
    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }

    /// Returns every frame sent so far.
    pub fn sent(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    /// Returns the sent frames decoded as UTF-8.
    pub fn sent_text(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .map(|frame| String::from_utf8_lossy(&frame).into_owned())
            .collect()
    }
}

impl SocketChannel for ScriptedSocket {
    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn send(&self, message: &[u8]) -> SyncResult<()> {
        if !self.is_open() {
            return Err(SyncError::ChannelClosed);
        }
        self.sent.lock().unwrap().push(message.to_vec());
        Ok(())
    }
}

/// One request recorded by [`ScriptedHttp`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    /// Request URL.
    pub url: String,
    /// Request method.
    pub method: String,
    /// Request body.
    pub body: Vec<u8>,
}

/// A scripted HTTP client for tests.
///
/// Responds with queued statuses first, then with a settable default;
/// records every request it sees.
#[derive(Debug)]
pub struct ScriptedHttp {
    queued: Mutex<VecDeque<u16>>,
    default_status: Mutex<u16>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedHttp {
    /// Creates a client that answers every request with `status`.
    pub fn with_status(status: u16) -> Self {
        Self {
            queued: Mutex::new(VecDeque::new()),
            default_status: Mutex::new(status),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queues a one-shot status answered before the default.
    pub fn push_status(&self, status: u16) {
        self.queued.lock().unwrap().push_back(status);
    }

    /// Replaces the default status.
    pub fn set_status(&self, status: u16) {
        *self.default_status.lock().unwrap() = status;
    }

    /// Returns every recorded request.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for ScriptedHttp {
    fn default() -> Self {
        Self::with_status(200)
    }
}

impl HttpClient for ScriptedHttp {
    fn request(&self, url: &str, method: &str, body: Vec<u8>) -> SyncResult<u16> {
        self.requests.lock().unwrap().push(RecordedRequest {
            url: url.to_string(),
            method: method.to_string(),
            body,
        });
        let status = self
            .queued
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(*self.default_status.lock().unwrap());
        Ok(status)
    }
}
