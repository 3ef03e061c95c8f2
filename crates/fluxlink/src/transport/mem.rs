use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fluxlink_protocol::TransportError;
use tokio::sync::mpsc;

use super::Transport;

const CHANNEL_CAPACITY: usize = 64;

struct Inner<Out, In> {
    tx: mpsc::Sender<Out>,
    rx: tokio::sync::Mutex<mpsc::Receiver<In>>,
    closed: AtomicBool,
    _marker: PhantomData<(Out, In)>,
}

/// An in-process, channel-backed transport pair, used by tests and by
/// hosts that run both endpoints in the same process (§6.2's adapter
/// contract satisfied trivially: order is preserved by `mpsc`, `closed`
/// is the `Err(TransportError::Closed)` recv result).
pub struct MemTransport<Out, In> {
    inner: Arc<Inner<Out, In>>,
}

impl<Out, In> Clone for MemTransport<Out, In> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<Out: Send + 'static, In: Send + 'static> MemTransport<Out, In> {
    /// Builds a connected pair: `a` sends `Out` and receives `In`; `b`
    /// sends `In` and receives `Out`.
    pub fn pair() -> (MemTransport<Out, In>, MemTransport<In, Out>) {
        let (tx_a, rx_a) = mpsc::channel(CHANNEL_CAPACITY);
        let (tx_b, rx_b) = mpsc::channel(CHANNEL_CAPACITY);

        let a = MemTransport {
            inner: Arc::new(Inner {
                tx: tx_a,
                rx: tokio::sync::Mutex::new(rx_b),
                closed: AtomicBool::new(false),
                _marker: PhantomData,
            }),
        };
        let b = MemTransport {
            inner: Arc::new(Inner {
                tx: tx_b,
                rx: tokio::sync::Mutex::new(rx_a),
                closed: AtomicBool::new(false),
                _marker: PhantomData,
            }),
        };
        (a, b)
    }
}

impl<Out, In> Transport<Out, In> for MemTransport<Out, In>
where
    Out: Send + Sync + 'static,
    In: Send + Sync + 'static,
{
    async fn send(&self, message: Out) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.inner.tx.send(message).await.map_err(|_| TransportError::Closed)
    }

    async fn recv(&self) -> Result<In, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let mut rx = self.inner.rx.lock().await;
        rx.recv().await.ok_or(TransportError::Closed)
    }

    fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
    }

    fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }
}
