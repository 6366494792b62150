//! Named transport registry
//!
//! The set of transports is fixed when the coordinator is built. Each slot
//! owns its transport and, once the first request on it is suspended, that
//! transport's request buffer.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use tokio::sync::Mutex;
use tracing::debug;
use transport::Transport;

use crate::buffer::RequestBuffer;
use crate::error::{Error, Result};
use crate::events::EventSink;

/// Name a transport was registered under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransportName(String);

impl TransportName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransportName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for TransportName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TransportName {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl From<String> for TransportName {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// Buffer type for the requests of transport `T`.
pub type BufferFor<T> = RequestBuffer<
    <T as Transport>::Request,
    <T as Transport>::Response,
    <T as Transport>::Failure,
>;

pub(crate) struct Slot<T: Transport + ?Sized> {
    pub(crate) name: TransportName,
    pub(crate) transport: Arc<T>,
    buffer: OnceLock<BufferFor<T>>,
}

impl<T: Transport + ?Sized> Slot<T> {
    fn new(name: TransportName, transport: Arc<T>) -> Self {
        Self {
            name,
            transport,
            buffer: OnceLock::new(),
        }
    }

    /// The buffer, created on first use.
    pub(crate) fn buffer(&self) -> &BufferFor<T> {
        self.buffer.get_or_init(|| {
            debug!(transport = %self.name, "creating request buffer");
            RequestBuffer::new(self.name.clone())
        })
    }

    /// The buffer, if any request on this transport was ever suspended.
    pub(crate) fn existing_buffer(&self) -> Option<&BufferFor<T>> {
        self.buffer.get()
    }
}

/// State shared by the coordinator and every interceptor.
pub(crate) struct Registry<T: Transport + ?Sized> {
    slots: HashMap<TransportName, Arc<Slot<T>>>,
    pub(crate) sink: Arc<dyn EventSink<T::Failure>>,
    /// Transport that most recently suspended a request and has not been
    /// drained since. Lock order: `active` before any buffer.
    pub(crate) active: Mutex<Option<TransportName>>,
}

impl<T: Transport + ?Sized> Registry<T> {
    pub(crate) fn new(
        transports: Vec<(TransportName, Arc<T>)>,
        sink: Arc<dyn EventSink<T::Failure>>,
    ) -> Result<Self> {
        let mut slots = HashMap::with_capacity(transports.len());
        for (name, transport) in transports {
            if slots.contains_key(&name) {
                return Err(Error::DuplicateTransport(name.to_string()));
            }
            slots.insert(name.clone(), Arc::new(Slot::new(name, transport)));
        }
        Ok(Self {
            slots,
            sink,
            active: Mutex::new(None),
        })
    }

    pub(crate) fn slot(&self, name: &str) -> Result<&Arc<Slot<T>>> {
        self.slots
            .get(name)
            .ok_or_else(|| Error::UnknownTransport(name.to_string()))
    }

    pub(crate) fn names(&self) -> impl Iterator<Item = &TransportName> {
        self.slots.keys()
    }
}
