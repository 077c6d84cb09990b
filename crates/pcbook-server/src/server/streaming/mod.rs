//! Message-channel plumbing shared by the streaming handlers.
//!
//! Inbound messages arrive as any `Stream<Item = Result<T, Status>>` (a
//! `tonic::Streaming` in production, an in-memory stream in tests). Outbound
//! messages go through a bounded [`mpsc::Sender`] whose receiver becomes the
//! gRPC response stream.

use crate::server::context::CallContext;
use futures::{Stream, StreamExt};
use pcbook_core::{Error, Result};
use tokio::sync::mpsc;
use tonic::Status;

/// Outbound half of a streaming call.
pub type ResponseSender<T> = mpsc::Sender<core::result::Result<T, Status>>;

/// Receives the next inbound message, racing it against the call context.
///
/// Returns `Ok(None)` on a clean end of stream. A transport error is a
/// [`Error::Protocol`]; an expired context wins over a pending receive.
pub async fn recv<T, S>(ctx: &CallContext, inbound: &mut S) -> Result<Option<T>>
where
    S: Stream<Item = core::result::Result<T, Status>> + Unpin,
{
    tokio::select! {
        biased;
        () = ctx.done() => Err(ctx.expired()),
        msg = inbound.next() => match msg {
            None => Ok(None),
            Some(Ok(msg)) => Ok(Some(msg)),
            Some(Err(status)) => Err(Error::protocol(format!(
                "Cannot receive stream request: {}",
                status.message()
            ))),
        },
    }
}

/// Sends one message to the client, racing the send against the call context.
///
/// Fails with [`Error::ChannelError`] when the client has gone away. A client
/// that stops reading fills the channel; the send then gives up with the
/// cancellation outcome once the context expires.
pub async fn send<T>(ctx: &CallContext, tx: &ResponseSender<T>, msg: T) -> Result<()> {
    tokio::select! {
        biased;
        () = ctx.done() => Err(ctx.expired()),
        sent = tx.send(Ok(msg)) => sent.map_err(|e| Error::ChannelError {
            context: format!("Failed to forward response: {e}"),
        }),
    }
}

/// Surfaces the terminal error of a streaming call to the client, once.
///
/// Nothing is sent for cancellation (the client already knows) or for a
/// failed send (there is no one left to tell). A send that cannot complete
/// before the context expires is dropped.
pub async fn send_terminal<T>(ctx: &CallContext, tx: &ResponseSender<T>, err: &Error) {
    if err.is_cancellation() || matches!(err, Error::ChannelError { .. }) {
        return;
    }
    tokio::select! {
        biased;
        sent = tx.send(Err(err.clone().into())) => {
            if let Err(_e) = sent {
                tracing::debug!("Failed to forward terminal error: {_e}");
            }
        }
        () = ctx.done() => tracing::debug!("Terminal error dropped, call already over"),
    }
}
