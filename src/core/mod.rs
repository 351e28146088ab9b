//! # Core Channel Components
//!
//! Building blocks the packet channel is assembled from.
//!
//! ## Components
//! - **Codec**: the [`codec::PacketCodec`] contract and [`codec::EncodedPacket`]
//! - **Buffer**: the receive buffer with its consumed/examined cursor
//! - **Write lock**: cancellable exclusive access for the send path
//! - **Framed**: adapter running any packet codec under `tokio_util::codec::Framed`
//!
//! ## Receive Cursor
//! ```text
//! |<- consumed ->|<-------- unconsumed -------->|
//! |   dropped    |<- examined ->|   unseen      |
//! ```
//! Bytes before `consumed` belong to packets already returned. Bytes up to
//! `examined` were scanned by the codec without producing a packet and are
//! not offered again until more data is appended.

pub mod buffer;
pub mod codec;
pub mod framed;
pub mod write_lock;
