//! Server-pushed event stream
//!
//! - `parser`: incremental `text/event-stream` decoding
//! - `transport`: opening the byte stream (HTTP or in-memory)
//! - `manager`: one connection per subscription, signals in arrival order

pub mod manager;
pub mod parser;
pub mod transport;

pub use manager::{ConnectionId, ConnectionManager, Delivery, StreamSignal};
pub use parser::{SseEvent, SseParser};
pub use transport::{ByteStream, EventTransport, HttpEventTransport};
