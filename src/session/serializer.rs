//! Single-consumer event queue
//!
//! Producers hold a cloneable [`EventSerializer`] and never wait for their
//! events to be handled. One worker drains the [`EventQueue`] in enqueue order
//! and hands each event to the [`EventHandler`], which owns all the state the
//! events mutate. Exactly one event is being handled at any time.
//!
//! ```rust
//! use push_session::session::{EventHandler, EventSerializer, Flow};
//!
//! struct Counter(u32);
//!
//! #[async_trait::async_trait]
//! impl EventHandler for Counter {
//!     type Event = Option<u32>;
//!
//!     async fn handle(&mut self, event: Option<u32>) -> Flow {
//!         match event {
//!             Some(n) => {
//!                 self.0 += n;
//!                 Flow::Continue
//!             }
//!             None => Flow::Stop,
//!         }
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let (serializer, queue) = EventSerializer::channel();
//! let worker = queue.spawn(Counter(0));
//! serializer.post(Some(2));
//! serializer.post(None);
//! worker.await.unwrap();
//! assert!(!serializer.post(Some(3)));
//! # });
//! ```

use std::fmt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// Whether the worker keeps draining after an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Owner of the serialized state
#[async_trait::async_trait]
pub trait EventHandler: Send + 'static {
    type Event: Send + 'static;

    async fn handle(&mut self, event: Self::Event) -> Flow;
}

/// Producer side of the queue
pub struct EventSerializer<E> {
    tx: mpsc::UnboundedSender<E>,
}

impl<E> Clone for EventSerializer<E> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<E> fmt::Debug for EventSerializer<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSerializer")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}

impl<E: Send + 'static> EventSerializer<E> {
    /// Create a producer handle and the queue its events land in
    pub fn channel() -> (Self, EventQueue<E>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, EventQueue { rx })
    }

    /// Enqueue an event; returns false once the worker has stopped
    pub fn post(&self, event: E) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Consumer side of the queue
pub struct EventQueue<E> {
    rx: mpsc::UnboundedReceiver<E>,
}

impl<E: Send + 'static> EventQueue<E> {
    /// Run the worker on its own task
    pub fn spawn<H>(self, handler: H) -> JoinHandle<()>
    where
        H: EventHandler<Event = E>,
    {
        tokio::spawn(self.run(handler))
    }

    /// Drain events until every producer is gone or the handler asks to stop
    pub async fn run<H>(mut self, mut handler: H)
    where
        H: EventHandler<Event = E>,
    {
        while let Some(event) = self.rx.recv().await {
            if handler.handle(event).await == Flow::Stop {
                break;
            }
        }
        self.rx.close();
        debug!("Event serializer stopped");
    }
}
