//! Connection event surface.
//!
//! A [`Connection`](crate::connection::Connection) reports its lifecycle and
//! traffic through [`Event`] values. Applications that prefer callbacks over
//! pulling events register them on an [`EventHandlers`] registry and hand it
//! to the connection's dispatch loop.
//!
//! Handlers run in ascending priority order; handlers sharing a priority run
//! in registration order.

use crate::error::Error;

/// Default handler priority.
pub const DEFAULT_PRIORITY: i32 = 100;

/// An event emitted by a WebSocket connection.
#[derive(Debug)]
#[non_exhaustive]
pub enum Event {
    /// The connection transitioned to Open. Carries the connection id.
    Open {
        /// Unique id of the connection that opened.
        id: String,
    },
    /// A complete (reassembled) data message arrived.
    Message {
        /// The message payload.
        payload: Vec<u8>,
        /// True for binary messages, false for text.
        is_binary: bool,
    },
    /// A ping control frame arrived. A pong reply has already been sent.
    Ping(Vec<u8>),
    /// A pong control frame arrived.
    Pong(Vec<u8>),
    /// The connection reached its terminal state.
    Close {
        /// Close status code (1005 when the peer sent no code, 1006 on
        /// abnormal teardown).
        code: u16,
        /// Close reason, possibly empty.
        reason: String,
    },
    /// A fatal error occurred. Always followed by a `Close` event.
    Error(Error),
}

struct Handler<F: ?Sized> {
    priority: i32,
    callback: Box<F>,
}

/// An ordered list of handlers for one event kind.
struct HandlerList<F: ?Sized> {
    handlers: Vec<Handler<F>>,
}

impl<F: ?Sized> Default for HandlerList<F> {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }
}

impl<F: ?Sized> HandlerList<F> {
    /// Insert keeping ascending priority, after existing equal priorities.
    fn insert(&mut self, priority: i32, callback: Box<F>) {
        let pos = self
            .handlers
            .partition_point(|h| h.priority <= priority);
        self.handlers.insert(pos, Handler { priority, callback });
    }
}

type OpenFn = dyn FnMut(&str) + Send;
type MessageFn = dyn FnMut(&[u8], bool) + Send;
type PayloadFn = dyn FnMut(&[u8]) + Send;
type CloseFn = dyn FnMut(u16, &str) + Send;
type ErrorFn = dyn FnMut(&Error) + Send;

/// Subscriber registry for connection events.
///
/// Replaces an ad-hoc string-keyed emitter with one typed list per event
/// kind. Registration order is preserved among handlers of equal priority.
#[derive(Default)]
pub struct EventHandlers {
    open: HandlerList<OpenFn>,
    message: HandlerList<MessageFn>,
    ping: HandlerList<PayloadFn>,
    pong: HandlerList<PayloadFn>,
    close: HandlerList<CloseFn>,
    error: HandlerList<ErrorFn>,
}

impl EventHandlers {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an `open` handler at the default priority.
    pub fn on_open(&mut self, callback: impl FnMut(&str) + Send + 'static) -> &mut Self {
        self.on_open_priority(DEFAULT_PRIORITY, callback)
    }

    /// Register an `open` handler with an explicit priority.
    pub fn on_open_priority(
        &mut self,
        priority: i32,
        callback: impl FnMut(&str) + Send + 'static,
    ) -> &mut Self {
        self.open.insert(priority, Box::new(callback));
        self
    }

    /// Register a `message` handler at the default priority.
    pub fn on_message(&mut self, callback: impl FnMut(&[u8], bool) + Send + 'static) -> &mut Self {
        self.on_message_priority(DEFAULT_PRIORITY, callback)
    }

    /// Register a `message` handler with an explicit priority.
    pub fn on_message_priority(
        &mut self,
        priority: i32,
        callback: impl FnMut(&[u8], bool) + Send + 'static,
    ) -> &mut Self {
        self.message.insert(priority, Box::new(callback));
        self
    }

    /// Register a `ping` handler at the default priority.
    pub fn on_ping(&mut self, callback: impl FnMut(&[u8]) + Send + 'static) -> &mut Self {
        self.ping.insert(DEFAULT_PRIORITY, Box::new(callback));
        self
    }

    /// Register a `pong` handler at the default priority.
    pub fn on_pong(&mut self, callback: impl FnMut(&[u8]) + Send + 'static) -> &mut Self {
        self.pong.insert(DEFAULT_PRIORITY, Box::new(callback));
        self
    }

    /// Register a `close` handler at the default priority.
    pub fn on_close(&mut self, callback: impl FnMut(u16, &str) + Send + 'static) -> &mut Self {
        self.on_close_priority(DEFAULT_PRIORITY, callback)
    }

    /// Register a `close` handler with an explicit priority.
    pub fn on_close_priority(
        &mut self,
        priority: i32,
        callback: impl FnMut(u16, &str) + Send + 'static,
    ) -> &mut Self {
        self.close.insert(priority, Box::new(callback));
        self
    }

    /// Register an `error` handler at the default priority.
    pub fn on_error(&mut self, callback: impl FnMut(&Error) + Send + 'static) -> &mut Self {
        self.error.insert(DEFAULT_PRIORITY, Box::new(callback));
        self
    }

    /// Dispatch one event to every matching handler, in priority order.
    pub fn dispatch(&mut self, event: &Event) {
        match event {
            Event::Open { id } => {
                for h in &mut self.open.handlers {
                    (h.callback)(id);
                }
            }
            Event::Message { payload, is_binary } => {
                for h in &mut self.message.handlers {
                    (h.callback)(payload, *is_binary);
                }
            }
            Event::Ping(data) => {
                for h in &mut self.ping.handlers {
                    (h.callback)(data);
                }
            }
            Event::Pong(data) => {
                for h in &mut self.pong.handlers {
                    (h.callback)(data);
                }
            }
            Event::Close { code, reason } => {
                for h in &mut self.close.handlers {
                    (h.callback)(*code, reason);
                }
            }
            Event::Error(err) => {
                for h in &mut self.error.handlers {
                    (h.callback)(err);
                }
            }
        }
    }
}
