//! Rendezvous interaction
//!
//! The peer side of the bulletin board: a deliberately small HTTP/1.1
//! client (one request per connection, JSON bodies), a typed API wrapper
//! mapping status codes onto the session error taxonomy, and the upgraded
//! signaling channel.
//!
//! Nothing here is shared between sessions - each session owns its own
//! client so rooms stay independent values.

mod client;
mod http;
mod signal;

pub use client::RendezvousClient;
pub use signal::{SignalChannel, SignalSender};
