//! Live display endpoints and the sinks frames are pushed into.

use std::sync::Arc;

use shared::{
    domain::{DisplayEndpoint, DisplayMode, EndpointId},
    protocol::ServerFrame,
};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DeliveryError {
    #[error("endpoint queue is full")]
    Full,
    #[error("endpoint is gone")]
    Closed,
}

/// Outbound half of an endpoint. Delivery never blocks the caller.
pub trait FrameSink: Send + Sync {
    fn deliver(&self, frame: ServerFrame) -> Result<(), DeliveryError>;
}

/// Sink backed by a bounded channel; the receiving half belongs to whatever
/// renders or forwards the frames.
pub struct ChannelSink {
    tx: mpsc::Sender<ServerFrame>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<ServerFrame>) -> Self {
        Self { tx }
    }
}

impl FrameSink for ChannelSink {
    fn deliver(&self, frame: ServerFrame) -> Result<(), DeliveryError> {
        self.tx.try_send(frame).map_err(|err| match err {
            TrySendError::Full(_) => DeliveryError::Full,
            TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }
}

struct RegisteredDisplay {
    endpoint: DisplayEndpoint,
    sink: Arc<dyn FrameSink>,
}

/// Registration-ordered set of display endpoints. Unknown ids are no-ops.
#[derive(Default)]
pub struct DisplayRegistry {
    entries: Vec<RegisteredDisplay>,
}

impl DisplayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when an endpoint with the same id was replaced.
    pub fn register(&mut self, endpoint: DisplayEndpoint, sink: Arc<dyn FrameSink>) -> bool {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|entry| entry.endpoint.id == endpoint.id)
        {
            entry.endpoint = endpoint;
            entry.sink = sink;
            return true;
        }
        self.entries.push(RegisteredDisplay { endpoint, sink });
        false
    }

    pub fn unregister(&mut self, id: EndpointId) -> Option<DisplayEndpoint> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.endpoint.id == id)?;
        Some(self.entries.remove(index).endpoint)
    }

    pub fn list_by_mode(&self, mode: DisplayMode) -> Vec<&DisplayEndpoint> {
        self.entries
            .iter()
            .map(|entry| &entry.endpoint)
            .filter(|endpoint| endpoint.mode == mode)
            .collect()
    }

    pub fn get(&self, id: EndpointId) -> Option<&DisplayEndpoint> {
        self.entries
            .iter()
            .map(|entry| &entry.endpoint)
            .find(|endpoint| endpoint.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DisplayEndpoint, &Arc<dyn FrameSink>)> {
        self.entries.iter().map(|entry| (&entry.endpoint, &entry.sink))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[path = "tests/registry_tests.rs"]
mod tests;
