//! Named channels
//!
//! Handlers attach to named channels; the router resolves a channel name
//! to a handler and a privilege level. The empty name is the default
//! channel, which backs any privileged channel that declines a request.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::request::{Request, SenderContext};

/// The implicit fallback channel. Always privileged.
pub const DEFAULT_CHANNEL: &str = "";

/// A reply still being computed. Local (non-`Send`): all dispatch runs on
/// a single-threaded executor.
pub type LocalReplyFuture = Pin<Box<dyn Future<Output = Option<Value>>>>;

/// What a handler did with a request.
pub enum Outcome {
    /// Immediate reply payload.
    Reply(Value),
    /// Handled, nothing to say.
    Ack,
    /// Not mine; the router may fall back to the default channel.
    Unhandled,
    /// Reply will settle later; `None` at settle time means an ack.
    Deferred(LocalReplyFuture),
}

/// Fault inside a handler. The router logs and drops; faults never
/// propagate past dispatch.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error(transparent)]
    Store(#[from] nw_core::StoreError),
    #[error("reply encoding failure: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One message handler bound to a channel.
pub trait ChannelHandler {
    fn handle(
        &mut self,
        request: &Request,
        sender: &SenderContext,
    ) -> Result<Outcome, HandlerError>;
}

struct ChannelEntry {
    privileged: bool,
    handler: Box<dyn ChannelHandler>,
}

/// Channel-name to handler mapping. At most one handler per name;
/// re-registration replaces.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: HashMap<String, ChannelEntry>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, privileged: bool, handler: Box<dyn ChannelHandler>) {
        let privileged = privileged || name == DEFAULT_CHANNEL;
        self.channels
            .insert(name.to_string(), ChannelEntry { privileged, handler });
    }

    /// Privilege level of a channel, `None` when unregistered.
    pub fn privilege_of(&self, name: &str) -> Option<bool> {
        self.channels.get(name).map(|entry| entry.privileged)
    }

    /// Run a channel's handler. `None` when the channel is unregistered.
    pub fn handle(
        &mut self,
        name: &str,
        request: &Request,
        sender: &SenderContext,
    ) -> Option<Result<Outcome, HandlerError>> {
        self.channels
            .get_mut(name)
            .map(|entry| entry.handler.handle(request, sender))
    }
}

// =============================================================================
// Tests
// =============================================================================
