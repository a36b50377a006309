//! Bridge protocol between page script and the host application.
//!
//! - **Page -> host**: script calls `window.MiniAppBridge.postMessage({id, action, param})`,
//!   the engine hands the JSON body to [`BridgeMessageRouter::receive_raw`],
//!   which forwards it to the host's [`MessageHandler`].
//! - **Host -> page**: the host answers once per id through a
//!   [`BridgeResponder`], from any thread. The reply becomes a call to
//!   `onBridgeSuccess(id, payload)` or `onBridgeError(id, message)` queued
//!   onto the rendering thread.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use miniapp_common::MessageId;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::render_queue::{RenderQueue, SurfaceCommand};

/// In-page function invoked with `(messageId, payload)` on success.
pub const SUCCESS_CALLBACK: &str = "onBridgeSuccess";
/// In-page function invoked with `(messageId, message)` on error.
pub const ERROR_CALLBACK: &str = "onBridgeError";

/// Script injected into every page so it can reach the host.
pub const BRIDGE_INIT_SCRIPT: &str = r#"
(function() {
    window.MiniAppBridge = window.MiniAppBridge || {
        postMessage: function(msg) {
            window.ipc.postMessage(JSON.stringify(msg));
        }
    };
    window.onBridgeSuccess = window.onBridgeSuccess || function(id, payload) {};
    window.onBridgeError = window.onBridgeError || function(id, message) {};
})();
"#;

// =============================================================================
// MESSAGES
// =============================================================================

/// A request posted by page script.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeMessage {
    pub id: MessageId,
    pub action: String,
    #[serde(default)]
    pub param: serde_json::Value,
}

impl BridgeMessage {
    /// Parse the JSON body the page posted.
    pub fn from_json(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeOutcome {
    Success(String),
    Error(String),
}

/// What happened to a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Queued for the page.
    Queued,
    /// This id already got its reply, or was never received. Ignored.
    AlreadyAnswered,
    /// The view is gone. Silently discarded.
    Dropped,
}

/// The host side of the bridge.
pub trait MessageHandler: Send + Sync {
    /// Called once per inbound message. The host is expected to answer
    /// exactly once through `responder`, whenever and from wherever.
    fn receive(&self, message: BridgeMessage, responder: BridgeResponder);
}

// =============================================================================
// SCRIPT GENERATION
// =============================================================================

/// Quote `value` as a JavaScript string literal.
///
/// JSON string syntax covers quotes, backslashes and control characters.
/// U+2028/U+2029 are escaped as well so the output stays a single line.
pub fn js_string_literal(value: &str) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|_| "\"\"".to_string())
        .replace('\u{2028}', "\\u2028")
        .replace('\u{2029}', "\\u2029")
}

/// Build the callback invocation for one reply.
pub fn callback_script(id: &MessageId, outcome: &BridgeOutcome) -> String {
    let (callback, argument) = match outcome {
        BridgeOutcome::Success(payload) => (SUCCESS_CALLBACK, payload),
        BridgeOutcome::Error(message) => (ERROR_CALLBACK, message),
    };
    format!(
        "{callback}({}, {});",
        js_string_literal(id.as_str()),
        js_string_literal(argument)
    )
}

// =============================================================================
// ROUTER
// =============================================================================

#[derive(Debug)]
struct RouterInner {
    pending: Mutex<HashSet<MessageId>>,
    queue: RenderQueue,
    attached: AtomicBool,
}

/// Cloneable, thread-safe handle for answering bridge messages.
#[derive(Debug, Clone)]
pub struct BridgeResponder {
    inner: Arc<RouterInner>,
}

impl BridgeResponder {
    /// Deliver the single reply for `id`.
    pub fn respond(&self, id: &MessageId, outcome: BridgeOutcome) -> Delivery {
        if !self.inner.attached.load(Ordering::Acquire) || !self.inner.queue.is_open() {
            debug!(message_id = %id, "bridge reply after teardown, dropped");
            return Delivery::Dropped;
        }

        let was_pending = match self.inner.pending.lock() {
            Ok(mut pending) => pending.remove(id),
            Err(_) => false,
        };
        if !was_pending {
            warn!(message_id = %id, "bridge reply for an id with no pending message, ignored");
            return Delivery::AlreadyAnswered;
        }

        let script = callback_script(id, &outcome);
        if self.inner.queue.push(SurfaceCommand::EvaluateScript(script)) {
            debug!(
                message_id = %id,
                success = matches!(outcome, BridgeOutcome::Success(_)),
                "bridge reply queued"
            );
            Delivery::Queued
        } else {
            debug!(message_id = %id, "bridge reply after teardown, dropped");
            Delivery::Dropped
        }
    }

    pub fn success(&self, id: &MessageId, payload: impl Into<String>) -> Delivery {
        self.respond(id, BridgeOutcome::Success(payload.into()))
    }

    pub fn error(&self, id: &MessageId, message: impl Into<String>) -> Delivery {
        self.respond(id, BridgeOutcome::Error(message.into()))
    }
}

/// Forwards page messages to the host and tracks which ids still owe a reply.
pub struct BridgeMessageRouter {
    handler: Mutex<Option<Arc<dyn MessageHandler>>>,
    responder: BridgeResponder,
}

impl BridgeMessageRouter {
    pub fn new(handler: Arc<dyn MessageHandler>, queue: RenderQueue) -> Self {
        Self {
            handler: Mutex::new(Some(handler)),
            responder: BridgeResponder {
                inner: Arc::new(RouterInner {
                    pending: Mutex::new(HashSet::new()),
                    queue,
                    attached: AtomicBool::new(true),
                }),
            },
        }
    }

    pub fn responder(&self) -> BridgeResponder {
        self.responder.clone()
    }

    /// Number of messages still waiting for a reply.
    pub fn pending_count(&self) -> usize {
        self.responder
            .inner
            .pending
            .lock()
            .map(|p| p.len())
            .unwrap_or(0)
    }

    /// Handle a raw body posted by the page. Bodies that are not a valid
    /// bridge message are logged and dropped.
    pub fn receive_raw(&self, body: &str) {
        match BridgeMessage::from_json(body) {
            Some(message) => self.receive(message),
            None => warn!(body_len = body.len(), "bridge message rejected: invalid JSON"),
        }
    }

    /// Forward `message` to the host handler.
    pub fn receive(&self, message: BridgeMessage) {
        let handler = match self.handler.lock() {
            Ok(handler) => handler.clone(),
            Err(_) => None,
        };
        let Some(handler) = handler else {
            debug!(message_id = %message.id, "bridge detached, message dropped");
            return;
        };

        if let Ok(mut pending) = self.responder.inner.pending.lock() {
            if !pending.insert(message.id.clone()) {
                warn!(message_id = %message.id, "bridge message id already pending");
            }
        }

        debug!(message_id = %message.id, action = %message.action, "bridge message from page");
        // No locks held: the handler may answer synchronously.
        handler.receive(message, self.responder.clone());
    }

    /// Stop forwarding and delivering. Idempotent.
    pub fn detach(&self) {
        self.responder.inner.attached.store(false, Ordering::Release);
        if let Ok(mut handler) = self.handler.lock() {
            handler.take();
        }
        if let Ok(mut pending) = self.responder.inner.pending.lock() {
            if !pending.is_empty() {
                debug!(unanswered = pending.len(), "bridge detached with pending messages");
            }
            pending.clear();
        }
    }
}
