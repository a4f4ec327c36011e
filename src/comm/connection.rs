//! Connection state for one server endpoint

use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};

/// Lifecycle of one server endpoint.
///
/// A failed send or receive demotes `Connected` back to `Listening`, keeping
/// the bound listener so the host can reconnect without a re-bind of the
/// port. `Unbound` only occurs for endpoints created without sockets (tests).
#[derive(Debug)]
pub enum Connection {
    /// No socket bound
    Unbound,
    /// Bound and listening, no peer attached
    Listening(TcpListener),
    /// Listening with one peer attached
    Connected {
        listener: TcpListener,
        stream: TcpStream,
    },
}

impl Connection {
    pub fn is_connected(&self) -> bool {
        matches!(self, Connection::Connected { .. })
    }

    pub fn is_listening(&self) -> bool {
        matches!(self, Connection::Listening(_))
    }

    /// Address the endpoint listens on, if bound
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self {
            Connection::Unbound => None,
            Connection::Listening(listener) | Connection::Connected { listener, .. } => {
                listener.local_addr().ok()
            }
        }
    }

    /// Active peer stream, if connected
    pub fn stream_mut(&mut self) -> Option<&mut TcpStream> {
        match self {
            Connection::Connected { stream, .. } => Some(stream),
            _ => None,
        }
    }

    /// Drop the peer, keep the listener
    pub fn demote(&mut self) {
        let prev = std::mem::replace(self, Connection::Unbound);
        *self = match prev {
            Connection::Connected { listener, stream } => {
                let _ = stream.shutdown(Shutdown::Both);
                Connection::Listening(listener)
            }
            other => other,
        };
    }
}
