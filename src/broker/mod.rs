//! The optional asynchronous network backend
//!
//! At most one broker sink is active per LogSet tree. Configuration
//! failures and per-send failures degrade to structured warnings; only
//! the sink's own lifecycle (`closedown`) blocks, and only at shutdown.

pub mod sink;
pub mod transport;

pub use sink::{BrokerSink, BrokerState, DrainReport, PARTITION_KEY_FIELD};
pub use transport::{ChannelTransport, Record, TcpTransport, Transport, TransportError};
