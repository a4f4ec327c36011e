//! TCP connection management for the command and feed channels

pub mod connection;
pub mod server;

pub use connection::Connection;
pub use server::{Channel, CommServer};
