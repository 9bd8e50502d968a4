//! Client for a remote discover/invoke tool protocol.
//!
//! Tools are discovered once at startup. Discovery failure disables tool
//! support for the session; it never fails startup.

pub mod invoker;
pub mod types;

pub use invoker::{ToolInvoker, connect};
pub use types::{DiscoveryResponse, ToolDescriptor};
