//! Per-call cancellation and deadline tracking.
//!
//! Every handler receives a [`CallContext`] and consults it at each loop
//! boundary (per searched laptop, per received chunk, per received rating).
//! Cancellation is an explicit signal backed by a [`CancellationToken`]; it is
//! never inferred from channel closure alone. The gRPC adapter wires channel
//! closure into the token through [`CallContext::cancel_on_close`].

use core::time::Duration;
use pcbook_core::{Error, Result};
use tokio::{sync::mpsc, time::Instant};
use tokio_util::sync::CancellationToken;

/// Cancellation token plus optional deadline for one in-flight call.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// A context that is never cancelled unless [`cancel`](Self::cancel) is
    /// called.
    pub fn new() -> Self {
        Self::default()
    }

    /// A context that is cancelled whenever `token` is.
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fails with [`Error::RequestCancelled`] or [`Error::DeadlineExceeded`]
    /// once the call is over. Cancellation wins when both hold.
    pub fn check(&self) -> Result<()> {
        if self.token.is_cancelled() {
            return Err(Error::RequestCancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Error::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Resolves once the call is cancelled or its deadline passes.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    () = self.token.cancelled() => {}
                    () = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }

    /// The error describing why [`done`](Self::done) resolved.
    pub fn expired(&self) -> Error {
        match self.check() {
            Err(e) => e,
            Ok(()) => Error::DeadlineExceeded,
        }
    }

    /// Cancels this context as soon as every receiver of `tx` is dropped,
    /// i.e. when the client walks away from a response stream.
    ///
    /// The watcher holds a clone of `tx` until the context is cancelled, so
    /// the caller must [`cancel`](Self::cancel) the context when the call
    /// finishes for the response stream to terminate.
    pub fn cancel_on_close<T>(&self, tx: &mpsc::Sender<T>)
    where
        T: Send + 'static,
    {
        let tx = tx.clone();
        let token = self.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = tx.closed() => {
                    tracing::debug!("Response stream closed by client, cancelling call");
                    token.cancel();
                }
                () = token.cancelled() => {}
            }
        });
    }
}

/// Parses a `grpc-timeout` header value (`<digits><unit>`, at most eight
/// digits, unit one of `H M S m u n`).
pub fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    if value.len() < 2 || !value.is_ascii() {
        return None;
    }
    let (digits, unit) = value.split_at(value.len() - 1);
    if digits.len() > 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: u64 = digits.parse().ok()?;

    let timeout = match unit {
        "H" => Duration::from_secs(amount * 60 * 60),
        "M" => Duration::from_secs(amount * 60),
        "S" => Duration::from_secs(amount),
        "m" => Duration::from_millis(amount),
        "u" => Duration::from_micros(amount),
        "n" => Duration::from_nanos(amount),
        _ => return None,
    };
    Some(timeout)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_context_is_live() {
        assert_eq!(CallContext::new().check(), Ok(()));
    }

    #[test]
    fn cancellation_takes_precedence_over_deadline() {
        let ctx = CallContext::new().with_deadline(Instant::now());
        assert_eq!(ctx.check(), Err(Error::DeadlineExceeded));

        ctx.cancel();
        assert_eq!(ctx.check(), Err(Error::RequestCancelled));
        assert_eq!(ctx.expired(), Error::RequestCancelled);
    }

    #[test]
    fn child_of_cancelled_parent_is_cancelled() {
        let parent = CancellationToken::new();
        let ctx = CallContext::with_token(parent.child_token());
        parent.cancel();
        assert!(ctx.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn done_resolves_at_deadline() {
        let ctx = CallContext::new().with_timeout(Duration::from_secs(5));
        assert_eq!(ctx.check(), Ok(()));

        ctx.done().await;
        assert_eq!(ctx.check(), Err(Error::DeadlineExceeded));
    }

    #[tokio::test]
    async fn cancel_on_close_fires_when_receiver_drops() {
        let ctx = CallContext::new();
        let (tx, rx) = mpsc::channel::<u8>(1);
        ctx.cancel_on_close(&tx);

        drop(rx);
        ctx.done().await;
        assert_eq!(ctx.check(), Err(Error::RequestCancelled));
    }

    #[test]
    fn parses_grpc_timeout_units() {
        assert_eq!(parse_grpc_timeout("3S"), Some(Duration::from_secs(3)));
        assert_eq!(parse_grpc_timeout("250m"), Some(Duration::from_millis(250)));
        assert_eq!(parse_grpc_timeout("2H"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_grpc_timeout("10n"), Some(Duration::from_nanos(10)));
        assert_eq!(parse_grpc_timeout("S"), None);
        assert_eq!(parse_grpc_timeout("123456789S"), None);
        assert_eq!(parse_grpc_timeout("12x"), None);
        assert_eq!(parse_grpc_timeout("1.5S"), None);
    }
}
