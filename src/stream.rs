use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use crate::registry::Listener;
use crate::subscription::ListenerGuard;

/// Build a listener that forwards clones of every event into an unbounded channel.
pub(crate) fn forwarder<P, E>() -> (Listener<P, E>, mpsc::UnboundedReceiver<(P, E)>)
where
    P: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    let (tx, rx) = mpsc::unbounded_channel();
    let listener: Listener<P, E> = Arc::new(move |payload: &P, event: &E| {
        // Receiver gone means the stream is being dropped; its guard removes us next.
        let _ = tx.send((payload.clone(), event.clone()));
    });
    (listener, rx)
}

/// Events of one channel as an async stream. The listener is removed when the stream is dropped.
///
/// The stream does not end on its own: the listener keeps the channel open for
/// as long as the stream exists.
pub struct EventStream<P, E> {
    rx: mpsc::UnboundedReceiver<(P, E)>,
    guard: ListenerGuard,
}

impl<P, E> EventStream<P, E> {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<(P, E)>, guard: ListenerGuard) -> Self {
        Self { rx, guard }
    }

    pub fn channel(&self) -> &'static str {
        self.guard.channel()
    }

    /// Wait for the next event.
    pub async fn recv(&mut self) -> Option<(P, E)> {
        self.rx.recv().await
    }

    /// Take an already delivered event without waiting.
    pub fn try_recv(&mut self) -> Option<(P, E)> {
        self.rx.try_recv().ok()
    }
}

impl<P, E> Stream for EventStream<P, E> {
    type Item = (P, E);

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl<P, E> std::fmt::Debug for EventStream<P, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStream")
            .field("channel", &self.channel())
            .finish()
    }
}
