//! # Packet Channel
//!
//! Incremental packet framing over async duplex byte streams.
//!
//! A [`PacketChannel`] sits between a transport (TCP, a Unix socket, a
//! WebSocket adapter, an in-memory pipe) and a [`PacketCodec`]. It pulls
//! bytes as they arrive, hands the codec exactly the bytes it has not
//! rejected yet, and writes encoded packets back with one exclusive writer
//! at a time.
//!
//! ## Modules
//! - [`channel`]: receive loop, send path, lifecycle and inspection hooks
//! - [`core`]: codec contract, receive buffer, write lock, `Framed` adapter
//! - [`transport`]: the [`Transport`] trait and its implementations
//! - [`protocol`]: MQTT control packet framing
//! - [`config`]: TOML/env configuration with validation
//! - [`error`]: [`ChannelError`] and transport failure classification
//! - [`utils`]: logging setup and traffic counters
//!
//! ## Quick Start
//! ```rust,no_run
//! use std::sync::Arc;
//! use packet_channel::{PacketChannel, Received};
//! use packet_channel::protocol::MqttFrameCodec;
//! use tokio::net::TcpListener;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let listener = TcpListener::bind("127.0.0.1:1883").await?;
//! let (stream, _) = listener.accept().await?;
//! let channel = Arc::new(PacketChannel::new(stream, MqttFrameCodec::new()));
//! let cancel = CancellationToken::new();
//!
//! while let Received::Packet(frame) = channel.receive(&cancel).await? {
//!     println!("packet type {}", frame.packet_type());
//! }
//! channel.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
pub mod transport;
pub mod utils;

pub use channel::{ChannelState, PacketChannel, PacketInspector, Received, Sent, WriteStrategy};
pub use config::{ChannelConfig, ChannelSettings, LoggingConfig};
pub use crate::core::codec::{Decoded, EncodedPacket, PacketCodec};
pub use error::{ChannelError, Result};
pub use transport::{Framing, Transport, TransportInfo};
pub use utils::metrics::StatisticsSnapshot;
