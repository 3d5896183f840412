//! Push-stream subscription.
//!
//! A [`StreamSubscription`] owns at most one live connection produced by a
//! [`Connector`]. The connection reports back through an event channel that
//! belongs to that connection alone, so events from a connection that has
//! been replaced or closed can never reach the subscription state.

use http::{HeaderMap, HeaderName, HeaderValue};
use log::{debug, info, warn};
use serde_json::Value;
use tokio::sync::mpsc;

pub mod sse;
pub mod transport;

pub use transport::SseConnector;

/// A stream message, resolved once at receipt.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Json(Value),
    Raw(String),
}

impl Payload {
    pub fn parse(raw: &str) -> Self {
        match serde_json::from_str(raw) {
            Ok(value) => Payload::Json(value),
            Err(_) => Payload::Raw(raw.to_owned()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Error,
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("unexpected response status {0}")]
    Status(u16),
    #[error("unexpected content type {0:?}")]
    ContentType(String),
    #[error("stream read failed: {0}")]
    Read(String),
    #[error("stream closed by server")]
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Open,
    Message(String),
    Error(TransportError),
}

pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

pub struct ConnectRequest<'a> {
    pub url: &'a str,
    pub with_credentials: bool,
    pub headers: &'a HeaderMap,
}

pub trait Connection {
    /// Releases the underlying transport. Called exactly once per connection.
    fn close(&mut self);
}

pub trait Connector {
    type Handle: Connection;

    fn connect(&self, request: ConnectRequest<'_>, events: EventSender) -> Self::Handle;
}

/// What changed after applying one transport event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Update {
    Opened,
    Data,
    Failed,
}

#[derive(Default)]
pub struct SubscribeOptions {
    with_credentials: bool,
    headers: HeaderMap,
    on_open: Option<Box<dyn FnMut()>>,
    on_error: Option<Box<dyn FnMut(&TransportError)>>,
}

impl SubscribeOptions {
    pub fn with_credentials(mut self, with_credentials: bool) -> Self {
        self.with_credentials = with_credentials;
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn on_open(mut self, f: impl FnMut() + 'static) -> Self {
        self.on_open = Some(Box::new(f));
        self
    }

    pub fn on_error(mut self, f: impl FnMut(&TransportError) + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }
}

pub struct StreamSubscription<C: Connector> {
    url: String,
    options: SubscribeOptions,
    connector: C,
    handle: Option<C::Handle>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    state: ConnectionState,
    data: Option<Payload>,
    error: Option<TransportError>,
    is_connected: bool,
}

impl<C: Connector> StreamSubscription<C> {
    pub fn open(connector: C, url: impl Into<String>, options: SubscribeOptions) -> Self {
        let (_, events) = mpsc::unbounded_channel();
        let mut subscription = Self {
            url: url.into(),
            options,
            connector,
            handle: None,
            events,
            state: ConnectionState::Connecting,
            data: None,
            error: None,
            is_connected: false,
        };
        subscription.connect();
        subscription
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn data(&self) -> Option<&Payload> {
        self.data.as_ref()
    }

    pub fn error(&self) -> Option<&TransportError> {
        self.error.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.is_connected
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Drops the current connection, if any, and dials the same URL again.
    pub fn reconnect(&mut self) {
        info!("reconnecting to {}", self.url);
        self.connect();
    }

    pub fn close(&mut self) {
        if self.release() {
            debug!("closed push stream {}", self.url);
        }
        self.is_connected = false;
        self.state = ConnectionState::Closed;
    }

    /// Waits for the next transport event and applies it.
    ///
    /// Returns `None` once the current connection can deliver nothing more.
    pub async fn next_update(&mut self) -> Option<Update> {
        if self.handle.is_none() {
            return None;
        }
        let event = self.events.recv().await?;
        Some(self.apply(event))
    }

    /// Applies an already delivered event without waiting.
    #[cfg(test)]
    pub fn try_next_update(&mut self) -> Option<Update> {
        if self.handle.is_none() {
            return None;
        }
        let event = self.events.try_recv().ok()?;
        Some(self.apply(event))
    }

    fn connect(&mut self) {
        self.release();

        let (tx, rx) = mpsc::unbounded_channel();
        self.events = rx;
        self.state = ConnectionState::Connecting;

        debug!("opening push stream {}", self.url);
        let handle = self.connector.connect(
            ConnectRequest {
                url: &self.url,
                with_credentials: self.options.with_credentials,
                headers: &self.options.headers,
            },
            tx,
        );
        self.handle = Some(handle);
    }

    fn release(&mut self) -> bool {
        match self.handle.take() {
            Some(mut handle) => {
                handle.close();
                true
            }
            None => false,
        }
    }

    fn apply(&mut self, event: TransportEvent) -> Update {
        match event {
            TransportEvent::Open => {
                info!("push stream {} connected", self.url);
                self.state = ConnectionState::Open;
                self.is_connected = true;
                self.error = None;
                if let Some(on_open) = self.options.on_open.as_mut() {
                    on_open();
                }
                Update::Opened
            }
            TransportEvent::Message(raw) => {
                self.data = Some(Payload::parse(&raw));
                Update::Data
            }
            TransportEvent::Error(error) => {
                warn!("push stream {} failed: {error}", self.url);
                self.state = ConnectionState::Error;
                self.is_connected = false;
                if let Some(on_error) = self.options.on_error.as_mut() {
                    on_error(&error);
                }
                self.error = Some(error);
                Update::Failed
            }
        }
    }
}

impl<C: Connector> Drop for StreamSubscription<C> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use std::{cell::RefCell, rc::Rc};

    use super::*;

    #[derive(Debug, Default)]
    pub struct MockState {
        pub connects: Vec<(String, bool)>,
        pub headers: Vec<HeaderMap>,
        pub closes: usize,
        pub senders: Vec<EventSender>,
    }

    /// Connector whose connections are driven by the test through
    /// [`MockConnector::send`].
    #[derive(Clone, Default)]
    pub struct MockConnector {
        pub state: Rc<RefCell<MockState>>,
    }

    pub struct MockHandle {
        state: Rc<RefCell<MockState>>,
    }

    impl Connection for MockHandle {
        fn close(&mut self) {
            self.state.borrow_mut().closes += 1;
        }
    }

    impl Connector for MockConnector {
        type Handle = MockHandle;

        fn connect(&self, request: ConnectRequest<'_>, events: EventSender) -> MockHandle {
            let mut state = self.state.borrow_mut();
            state
                .connects
                .push((request.url.to_owned(), request.with_credentials));
            state.headers.push(request.headers.clone());
            state.senders.push(events);
            MockHandle {
                state: self.state.clone(),
            }
        }
    }

    impl MockConnector {
        /// Delivers `event` on the most recent connection.
        pub fn send(&self, event: TransportEvent) {
            let state = self.state.borrow();
            let sender = state.senders.last().expect("no connection opened");
            sender.send(event).expect("subscription dropped its receiver");
        }

        pub fn send_on(&self, connection: usize, event: TransportEvent) -> bool {
            self.state.borrow().senders[connection].send(event).is_ok()
        }

        pub fn closes(&self) -> usize {
            self.state.borrow().closes
        }

        pub fn connects(&self) -> usize {
            self.state.borrow().connects.len()
        }
    }
}
