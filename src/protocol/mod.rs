//! Wire protocol.
//!
//! - [`messages`] - Request/response variants and envelopes
//! - [`codec`] - Versioned bincode framing
//! - [`service`] - Exhaustive request dispatch for one node

pub mod codec;
pub mod messages;
pub mod service;

pub use messages::{Request, RequestEnvelope, Response, ResponseEnvelope};
pub use service::{LoopbackProber, SequencerService};
