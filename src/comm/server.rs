//! TCP server for the command and feed channels
//!
//! Owns the two listening sockets and their at-most-one accepted peer each:
//!
//! - **Command channel**: request/reply configuration and version traffic
//! - **Feed channel**: one-way stream of captured frames
//!
//! # Connection Lifecycle
//!
//! ```text
//! 1. bind() creates both listeners (fatal on failure, startup only)
//! 2. accept_pending() promotes listening endpoints when a client arrives
//! 3. send()/receive_command() talk to the attached peer
//! 4. Any I/O failure demotes the endpoint back to listening
//! 5. The next accept_pending() picks up a reconnecting client
//! ```
//!
//! Listeners are nonblocking so a single cooperative thread can poll both in
//! one `accept_pending` call; accepted peer sockets are switched to blocking
//! with per-call read timeouts.

use crate::comm::connection::Connection;
use crate::error::{Error, Result};
use crate::protocol::{MsgHeader, HEADER_SIZE};
use std::fmt;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener};
use std::thread;
use std::time::Duration;

/// The two client-facing channels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Command,
    Feed,
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Command => write!(f, "command"),
            Channel::Feed => write!(f, "feed"),
        }
    }
}

/// TCP server owning the command and feed endpoints
pub struct CommServer {
    cmd: Connection,
    feed: Connection,
}

impl CommServer {
    /// Bind and listen on both server ports.
    ///
    /// Failure here is fatal: without the host link the device has no
    /// degraded mode to fall back to.
    pub fn bind(cmd_addr: &str, feed_addr: &str) -> Result<Self> {
        Ok(Self {
            cmd: Self::listen(cmd_addr)?,
            feed: Self::listen(feed_addr)?,
        })
    }

    fn listen(addr: &str) -> Result<Connection> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        Ok(Connection::Listening(listener))
    }

    /// Server without sockets; sends and receives fail soft with
    /// [`Error::NotConnected`]. For unit tests of the layers above.
    pub fn unbound() -> Self {
        Self {
            cmd: Connection::Unbound,
            feed: Connection::Unbound,
        }
    }

    pub fn cmd_local_addr(&self) -> Option<SocketAddr> {
        self.cmd.local_addr()
    }

    pub fn feed_local_addr(&self) -> Option<SocketAddr> {
        self.feed.local_addr()
    }

    pub fn is_connected(&self, channel: Channel) -> bool {
        self.connection(channel).is_connected()
    }

    fn connection(&self, channel: Channel) -> &Connection {
        match channel {
            Channel::Command => &self.cmd,
            Channel::Feed => &self.feed,
        }
    }

    fn connection_mut(&mut self, channel: Channel) -> &mut Connection {
        match channel {
            Channel::Command => &mut self.cmd,
            Channel::Feed => &mut self.feed,
        }
    }

    /// Accept pending clients on listening endpoints.
    ///
    /// Cheap no-op when both peers are already attached. When no client was
    /// waiting the call sleeps `timeout` to bound the poll rate of the
    /// control loop. Accept errors are logged, never fatal.
    pub fn accept_pending(&mut self, timeout: Duration) -> Result<()> {
        if self.cmd.is_connected() && self.feed.is_connected() {
            return Ok(());
        }

        let mut accepted = false;
        for channel in [Channel::Command, Channel::Feed] {
            let conn = self.connection_mut(channel);
            let result = match &*conn {
                Connection::Listening(listener) => listener.accept(),
                _ => continue,
            };
            match result {
                Ok((stream, peer)) => {
                    // Peer sockets run blocking with per-call read timeouts
                    if let Err(e) = stream.set_nonblocking(false) {
                        log::error!("Failed to set {} socket to blocking mode: {}", channel, e);
                        continue;
                    }
                    let prev = std::mem::replace(conn, Connection::Unbound);
                    if let Connection::Listening(listener) = prev {
                        *conn = Connection::Connected { listener, stream };
                    }
                    log::info!("{} client connected: {}", channel, peer);
                    accepted = true;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {}
                Err(e) => log::warn!("{} accept error: {}", channel, e),
            }
        }

        if !accepted {
            thread::sleep(timeout);
        }
        Ok(())
    }

    /// Send a whole buffer over a channel.
    ///
    /// Either the full buffer is written and its length returned, or the
    /// connection is demoted to listening and the error returned; no partial
    /// success exists. The caller must not assume the peer received anything
    /// on failure.
    pub fn send(&mut self, channel: Channel, buf: &[u8]) -> Result<usize> {
        let conn = self.connection_mut(channel);
        let stream = match conn.stream_mut() {
            Some(stream) => stream,
            None => return Err(Error::NotConnected),
        };
        match stream.write_all(buf) {
            Ok(()) => Ok(buf.len()),
            Err(e) => {
                log::warn!("{} send failed, dropping client: {}", channel, e);
                conn.demote();
                Err(Error::Io(e))
            }
        }
    }

    /// Receive one command message, waiting up to `timeout` for it to start.
    ///
    /// The body is read into `body` (reused across calls to avoid per-command
    /// allocation). Returns `Ok(None)` when no message arrived within the
    /// timeout, [`Error::NotConnected`] when no command client is attached,
    /// and an I/O error (after demotion) when the peer failed mid-message.
    pub fn receive_command(
        &mut self,
        timeout: Duration,
        body: &mut Vec<u8>,
    ) -> Result<Option<MsgHeader>> {
        let stream = match self.cmd.stream_mut() {
            Some(stream) => stream,
            None => return Err(Error::NotConnected),
        };
        stream.set_read_timeout(Some(timeout))?;

        let mut hdr_buf = [0u8; HEADER_SIZE];
        let first = match stream.read(&mut hdr_buf) {
            Ok(0) => {
                log::info!("Command client disconnected");
                self.cmd.demote();
                return Err(Error::ConnectionClosed);
            }
            Ok(n) => n,
            Err(e) if is_timeout(&e) => return Ok(None),
            Err(e) => {
                log::warn!("Command receive failed: {}", e);
                self.cmd.demote();
                return Err(Error::Io(e));
            }
        };
        // A message has started; the rest of the header must follow
        if first < HEADER_SIZE {
            if let Err(e) = stream.read_exact(&mut hdr_buf[first..]) {
                log::warn!("Short command header: {}", e);
                self.cmd.demote();
                return Err(Error::Io(e));
            }
        }

        let header = match MsgHeader::decode(&hdr_buf) {
            Ok(header) => header,
            Err(e) => {
                // The stream cannot be resynchronized after a garbled header
                log::warn!("Dropping command client: {}", e);
                self.cmd.demote();
                return Err(e);
            }
        };

        body.clear();
        body.resize(header.body_len as usize, 0);
        if !body.is_empty() {
            if let Err(e) = stream.read_exact(body) {
                log::warn!("Command body receive failed: {}", e);
                self.cmd.demote();
                return Err(Error::Io(e));
            }
        }
        Ok(Some(header))
    }
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}
