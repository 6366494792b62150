//! Single-settlement result handles
//!
//! `channel()` yields a `Settler` (kept by the buffer) and a `PendingResult`
//! (awaited by the caller). Dropping a `Settler` without settling abandons
//! the result: the `PendingResult` then never completes. Callers that need a
//! bound wrap it in `tokio::time::timeout` themselves.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};

use tokio::sync::oneshot;
use tracing::debug;

use crate::error::RequestError;

/// Final value of a request issued through an interceptor.
pub type Settlement<V, F> = Result<V, RequestError<F>>;

/// Create a linked settler / pending-result pair.
pub fn channel<V, F>() -> (Settler<V, F>, PendingResult<V, F>) {
    let (tx, rx) = oneshot::channel();
    let abandoned = Arc::new(AtomicBool::new(false));
    (
        Settler {
            tx: Some(tx),
            abandoned: abandoned.clone(),
        },
        PendingResult {
            rx: Some(rx),
            abandoned,
        },
    )
}

/// Write side. Consumed by settlement, so it can settle at most once.
pub struct Settler<V, F> {
    tx: Option<oneshot::Sender<Settlement<V, F>>>,
    abandoned: Arc<AtomicBool>,
}

impl<V, F> Settler<V, F> {
    pub fn resolve(self, value: V) {
        self.settle(Ok(value));
    }

    pub fn reject(self, error: RequestError<F>) {
        self.settle(Err(error));
    }

    pub fn settle(mut self, settlement: Settlement<V, F>) {
        let Some(tx) = self.tx.take() else {
            return;
        };
        if tx.send(settlement).is_err() {
            debug!("caller dropped its pending result before settlement");
        }
    }
}

impl<V, F> Drop for Settler<V, F> {
    fn drop(&mut self) {
        if self.tx.is_some() {
            self.abandoned.store(true, Ordering::Release);
        }
    }
}

/// Read side, awaited by the original caller.
pub struct PendingResult<V, F> {
    rx: Option<oneshot::Receiver<Settlement<V, F>>>,
    abandoned: Arc<AtomicBool>,
}

impl<V, F> PendingResult<V, F> {
    /// True once the settler was dropped without settling.
    pub fn is_abandoned(&self) -> bool {
        self.abandoned.load(Ordering::Acquire)
    }

    /// Wait for the settlement, or `None` once the result is abandoned.
    pub(crate) async fn settled(self) -> Option<Settlement<V, F>> {
        self.rx?.await.ok()
    }
}

impl<V, F> Future for PendingResult<V, F> {
    type Output = Settlement<V, F>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let Some(rx) = self.rx.as_mut() else {
            return Poll::Pending;
        };
        match Pin::new(rx).poll(cx) {
            Poll::Ready(Ok(settlement)) => {
                self.rx = None;
                Poll::Ready(settlement)
            }
            // Abandoned: stay pending forever, nothing will wake us.
            Poll::Ready(Err(_)) => {
                self.rx = None;
                Poll::Pending
            }
            Poll::Pending => Poll::Pending,
        }
    }
}
