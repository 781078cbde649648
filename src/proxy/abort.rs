//! Client disconnect propagation.
//!
//! # Responsibilities
//! - Expose a per-request abort signal to handlers ([`ClientSignal`])
//! - Link that signal to the outbound call before it is issued ([`AbortBridge`])
//! - Turn a fired signal into a distinct outcome the handler maps to 499
//!
//! # Design Decisions
//! - The outbound token is a child of the inbound one, so a signal that fired
//!   before the bridge existed is already observed when the bridge is created
//! - The inbound signal fires when the handling future is dropped before a
//!   response exists, and when the server shuts down

use std::future::Future;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tokio_util::sync::CancellationToken;

/// Abort signal of one inbound request.
#[derive(Debug, Clone)]
pub struct ClientSignal(CancellationToken);

impl ClientSignal {
    pub fn new(token: CancellationToken) -> Self {
        Self(token)
    }

    /// A signal that never fires.
    pub fn detached() -> Self {
        Self(CancellationToken::new())
    }

    pub fn token(&self) -> &CancellationToken {
        &self.0
    }

    pub fn is_aborted(&self) -> bool {
        self.0.is_cancelled()
    }
}

/// The outbound call was aborted through the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("request aborted by client")]
pub struct Aborted;

/// Links an inbound [`ClientSignal`] to one outbound call.
#[derive(Debug)]
pub struct AbortBridge {
    outbound: CancellationToken,
}

impl AbortBridge {
    /// Attach a fresh outbound signal to the inbound one.
    pub fn attach(inbound: &ClientSignal) -> Self {
        Self {
            outbound: inbound.0.child_token(),
        }
    }

    /// Signal handed to the outbound call.
    pub fn signal(&self) -> CancellationToken {
        self.outbound.clone()
    }

    pub fn is_aborted(&self) -> bool {
        self.outbound.is_cancelled()
    }

    /// Run `call` until it completes or the bridge fires.
    ///
    /// An already fired bridge never polls `call`.
    pub async fn guard<F: Future>(&self, call: F) -> Result<F::Output, Aborted> {
        tokio::select! {
            biased;
            _ = self.outbound.cancelled() => Err(Aborted),
            output = call => Ok(output),
        }
    }
}

/// Attach a [`ClientSignal`] to every request.
///
/// The signal is a child of the server's stream token. If the handling future
/// is dropped before it produces a response, the signal fires.
pub async fn client_signal_middleware(
    State(streams): State<CancellationToken>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = streams.child_token();
    request.extensions_mut().insert(ClientSignal::new(token.clone()));

    let guard = token.drop_guard();
    let response = next.run(request).await;
    let _ = guard.disarm();
    response
}
