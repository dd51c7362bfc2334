// Pulse: optimistic mutation and reconciliation for a social feed client.
//
// This is the library root. Each module corresponds to one piece of the
// client-side engine: the remote API seam, the session caches, the
// mutation pipeline, and the terminal surfaces used by the CLI.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod model;
pub mod mutation;
pub mod output;
pub mod session;
pub mod status;
