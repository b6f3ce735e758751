//! Protocol registry.
//!
//! Listeners are wired declaratively: each protocol is registered once by
//! name with its framing policy and a decoder factory, and listener configs
//! refer to protocols by that name. One decoder is built per connection, so
//! factories capture the shared directory and sink handles, never session
//! state.

use std::collections::HashMap;
use std::sync::Arc;

use crate::directory::DeviceDirectory;
use crate::error::{GatewayError, Result};
use crate::framing::FramingPolicy;
use crate::protocol::gt06::{self, Gt06Decoder};
use crate::protocol::ProtocolDecoder;
use crate::sink::PositionSink;

type DecoderFactory = Box<dyn Fn() -> Box<dyn ProtocolDecoder> + Send + Sync>;

/// A registered protocol: how to split its frames and how to decode them.
pub struct ProtocolEntry {
    framing: FramingPolicy,
    factory: DecoderFactory,
}

impl ProtocolEntry {
    pub fn framing(&self) -> &FramingPolicy {
        &self.framing
    }

    /// Build a fresh decoder for one connection.
    pub fn new_decoder(&self) -> Box<dyn ProtocolDecoder> {
        (self.factory)()
    }
}

/// Name-indexed protocol table consulted at listener startup.
#[derive(Default)]
pub struct ProtocolRegistry {
    entries: HashMap<String, ProtocolEntry>,
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a protocol under `name`, replacing any previous entry.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        framing: FramingPolicy,
        factory: impl Fn() -> Box<dyn ProtocolDecoder> + Send + Sync + 'static,
    ) {
        self.entries.insert(
            name.into(),
            ProtocolEntry {
                framing,
                factory: Box::new(factory),
            },
        );
    }

    /// Register the GT06 family against the given directory and sink.
    pub fn register_gt06(
        &mut self,
        directory: Arc<DeviceDirectory>,
        sink: Arc<dyn PositionSink>,
    ) {
        self.register("gt06", gt06::framing_policy(), move || {
            Box::new(Gt06Decoder::new(directory.clone(), sink.clone()))
        });
    }

    pub fn get(&self, name: &str) -> Result<&ProtocolEntry> {
        self.entries
            .get(name)
            .ok_or_else(|| GatewayError::Config(format!("unknown protocol '{}'", name)))
    }

    /// Registered protocol names, unordered.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}
