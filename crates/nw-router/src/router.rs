//! Message router
//!
//! Single entry point for every routed message. Privilege screening
//! happens here, before any handler logic runs, and a screened-out
//! request is indistinguishable from one nobody handled.

use serde_json::Value;

use crate::channel::{ChannelHandler, ChannelRegistry, Outcome, DEFAULT_CHANNEL};
use crate::request::{Request, SenderContext};

/// Terminal disposition of one dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchResult {
    Reply(Value),
    Ack,
    Dropped,
}

impl DispatchResult {
    /// The reply payload, if any. `Ack` and `Dropped` both collapse to
    /// `None` at the transport boundary.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Reply(value) => Some(value),
            Self::Ack | Self::Dropped => None,
        }
    }
}

/// Routes requests to channel handlers, with the default channel as
/// fallback for privileged channels that decline.
#[derive(Default)]
pub struct MessageRouter {
    registry: ChannelRegistry,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, privileged: bool, handler: Box<dyn ChannelHandler>) {
        self.registry.register(name, privileged, handler);
    }

    /// Dispatch one request. Never panics and never surfaces handler
    /// faults to the sender; anything that cannot be served is `Dropped`.
    pub async fn dispatch(
        &mut self,
        channel: &str,
        request: &Request,
        sender: &SenderContext,
    ) -> DispatchResult {
        let Some(privileged) = self.registry.privilege_of(channel) else {
            log::debug!("dropping message for unknown channel {channel:?}");
            return DispatchResult::Dropped;
        };
        if privileged && !sender.trusted {
            log::debug!("dropping untrusted message on privileged channel {channel:?}");
            return DispatchResult::Dropped;
        }

        if let Some(result) = self.settle(channel, request, sender).await {
            return result;
        }

        // Declined. Only privileged channels may lean on the default
        // channel; an unprivileged decline ends here.
        if privileged && channel != DEFAULT_CHANNEL {
            if let Some(result) = self.settle(DEFAULT_CHANNEL, request, sender).await {
                return result;
            }
        }
        log::debug!("no handler claimed message on channel {channel:?}");
        DispatchResult::Dropped
    }

    /// Run one channel's handler to a terminal disposition. `None` when
    /// the channel is unregistered or its handler declined.
    async fn settle(
        &mut self,
        channel: &str,
        request: &Request,
        sender: &SenderContext,
    ) -> Option<DispatchResult> {
        let result = self.registry.handle(channel, request, sender)?;
        match result {
            Ok(Outcome::Reply(value)) => Some(DispatchResult::Reply(value)),
            Ok(Outcome::Ack) => Some(DispatchResult::Ack),
            Ok(Outcome::Deferred(reply)) => Some(match reply.await {
                Some(value) => DispatchResult::Reply(value),
                None => DispatchResult::Ack,
            }),
            Ok(Outcome::Unhandled) => None,
            Err(e) => {
                log::error!("handler fault on channel {channel:?}: {e}");
                Some(DispatchResult::Dropped)
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
