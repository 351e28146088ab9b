//! # Utility Modules
//!
//! Supporting utilities shared by every channel.
//!
//! ## Components
//! - **Logging**: Structured logging configuration
//! - **Metrics**: Thread-safe traffic counters

pub mod logging;
pub mod metrics;

pub use metrics::{ChannelStatistics, StatisticsSnapshot};
