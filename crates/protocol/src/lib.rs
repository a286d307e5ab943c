//! Message contract for the buffering/upload worker boundary.
//!
//! When buffering and upload run in a separate execution context, the
//! capture side and the worker communicate purely by message passing keyed
//! on an opaque instance id — never by shared mutable memory. These are the
//! tagged request/response variants that cross that boundary.

mod messages;

pub use messages::{WorkerRequest, WorkerResponse};
