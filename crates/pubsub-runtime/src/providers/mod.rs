//! Transport driver implementations.
//!
//! Only the in-process transport ships with the runtime; broker and cloud
//! transports are registered by the application through
//! [`TransportCatalog`](crate::driver::TransportCatalog).

pub mod memory;

pub use memory::{DeadLetter, InMemoryDriver, InMemoryTransportFactory};
