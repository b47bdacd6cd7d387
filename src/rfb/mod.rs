pub mod transport;

pub use transport::{RfbClient, RfbConnector, TransportError, TransportResult};
