//! # Protocol Codecs
//!
//! Concrete [`crate::core::codec::PacketCodec`] implementations.
//!
//! - **mqtt**: MQTT control packet framing (fixed header + remaining length)

pub mod mqtt;

pub use mqtt::{MqttFrame, MqttFrameCodec};
