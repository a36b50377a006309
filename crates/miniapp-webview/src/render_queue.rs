//! Work handed to the rendering thread.
//!
//! The web surface is single-threaded. Anything produced elsewhere (the
//! entry-document fetch, bridge replies from host threads) is pushed here
//! and applied by the surface owner when it drains the queue. After
//! [`RenderQueue::close`] every push is refused, which is how late work
//! for a torn-down view gets discarded.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use miniapp_common::FetchError;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceCommand {
    LoadDocument { html: Vec<u8>, base_url: Url },
    EvaluateScript(String),
    /// The entry document could not be fetched.
    LoadFailed(FetchError),
}

#[derive(Debug)]
struct QueueInner {
    commands: Mutex<VecDeque<SurfaceCommand>>,
    open: AtomicBool,
}

#[derive(Debug, Clone)]
pub struct RenderQueue {
    inner: Arc<QueueInner>,
}

impl RenderQueue {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(QueueInner {
                commands: Mutex::new(VecDeque::new()),
                open: AtomicBool::new(true),
            }),
        }
    }

    /// Queue a command. Returns false, dropping it, once closed.
    pub fn push(&self, command: SurfaceCommand) -> bool {
        let Ok(mut commands) = self.inner.commands.lock() else {
            return false;
        };
        // Checked under the lock so a concurrent close cannot slip between
        // the check and the push.
        if !self.inner.open.load(Ordering::Acquire) {
            return false;
        }
        commands.push_back(command);
        true
    }

    pub fn is_open(&self) -> bool {
        self.inner.open.load(Ordering::Acquire)
    }

    /// Refuse all further pushes and discard anything still queued.
    pub fn close(&self) {
        if let Ok(mut commands) = self.inner.commands.lock() {
            self.inner.open.store(false, Ordering::Release);
            if !commands.is_empty() {
                debug!(discarded = commands.len(), "render queue closed with pending work");
            }
            commands.clear();
        } else {
            self.inner.open.store(false, Ordering::Release);
        }
    }

    /// Take everything queued so far, in push order.
    pub fn drain(&self) -> Vec<SurfaceCommand> {
        match self.inner.commands.lock() {
            Ok(mut commands) => commands.drain(..).collect(),
            Err(_) => Vec::new(),
        }
    }
}

impl Default for RenderQueue {
    fn default() -> Self {
        Self::new()
    }
}
