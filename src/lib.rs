//! Telemetry ingestion gateway for GPS tracker fleets.
//!
//! The gateway binds one listener per configured protocol and normalizes
//! every inbound report into a [`Position`](model::Position) record:
//!
//! ```text
//!  socket -> splitter -> decoder -> sink
//!               |           |
//!               |           +- CommandLink (acks, settings pushes)
//!               +- FramingPolicy (delimiter / length field / fixed / custom)
//! ```
//!
//! - [`framing`]: per-connection byte stream to complete frames.
//! - [`protocol`]: the decoder contract plus the GT06 tracker family.
//! - [`directory`]: unique-id to device-id resolution with a cached snapshot.
//! - [`sink`]: position persistence and device-settings state.
//! - [`registry`] + [`config`] + [`server`]: declarative listener wiring.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use trackwire::{Gateway, GatewayConfig, ProtocolRegistry};
//! use trackwire::directory::DeviceDirectory;
//! use trackwire::sink::MemorySink;
//!
//! # async fn run(store: Arc<dyn trackwire::directory::DeviceStore>) -> trackwire::Result<()> {
//! let directory = Arc::new(DeviceDirectory::new(store));
//! let sink = MemorySink::new();
//!
//! let mut registry = ProtocolRegistry::new();
//! registry.register_gt06(directory, sink.clone());
//!
//! let config = GatewayConfig::from_json(
//!     r#"{"listeners": [{"protocol": "gt06", "port": 5023}]}"#,
//! )?;
//! let mut gateway = Gateway::new(registry, sink);
//! gateway.bind(&config).await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod directory;
pub mod error;
pub mod framing;
pub mod model;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod sink;
pub mod writer;

pub use config::{GatewayConfig, ListenerConfig, Transport};
pub use error::{GatewayError, Result};
pub use model::{Device, DeviceId, Position};
pub use registry::ProtocolRegistry;
pub use server::Gateway;
