//! JSON-RPC over a child process's stdio
//!
//! `transport` owns the process and moves lines, `codec` frames them,
//! `client` turns a method call into a classified [`CallOutcome`].

pub mod client;
pub mod codec;
pub mod transport;
pub mod types;

pub use client::{
    decode_line, decode_response, CallOutcome, NoResponseReason, RpcClient, REQUEST_ID,
};
pub use transport::{LaunchSpec, Transport};
pub use types::*;
