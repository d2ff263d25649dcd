#![doc = include_str!("../README.md")]
#![warn(
    missing_docs,
    clippy::panic_in_result_fn,
    clippy::missing_assert_message,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]

mod client;
mod connection_handle;
mod error;
mod misc;
mod name;
mod os;
mod server;

pub use client::Client;
pub use connection_handle::{ConnectionHandle, ConnectionState};
pub use error::Error;
pub use server::Server;
