//! Connection abstraction: a capability set implemented by a plaintext
//! TCP backend and a TLS backend that composes it. See SPEC_FULL.md
//! §4.5. Modelled on the teacher's small-registry-of-trait-objects
//! pattern (`journal_registry`'s repository lookup), not a `dyn Any`
//! type map.

mod error;
mod registry;
mod tcp;
mod tls;

pub use error::{ConnError, Result};
pub use registry::ConnRegistry;
pub use tcp::TcpConnType;
pub use tls::{TlsConfig, TlsConnType};

use std::io::IoSlice;
use std::os::unix::io::RawFd;

/// One accepted, live connection. Implementations own the underlying
/// file descriptor (and, for TLS, the session state layered on top of
/// it) and release it on `close`.
pub trait Connection: Send {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Vectored write. The TCP backend issues a single `writev(2)`;
    /// the TLS backend flattens `bufs` into one buffer first since
    /// OpenSSL has no vectored write primitive (SPEC_FULL.md §4.5, and
    /// the REDESIGN FLAGS item about not hardcoding the iovec count).
    fn writev(&mut self, bufs: &[IoSlice<'_>]) -> Result<usize>;

    fn set_nonblocking(&mut self, nonblocking: bool) -> Result<()>;
    fn shutdown(&mut self) -> Result<()>;
    fn close(self: Box<Self>) -> Result<()>;
    fn peer_addr(&self) -> String;
    fn raw_fd(&self) -> RawFd;
}

/// A connection backend: owns socket creation, listening, and accept
/// for one transport kind. `conn_create`/`listen`/`accept` are kept as
/// separate steps (rather than one `bind_and_listen` call) to mirror
/// the source's `conn_create` / `conn_listen` / `conn_accept` split,
/// which the TLS backend relies on by delegating the first two to its
/// inner TCP backend and only intercepting `accept`.
pub trait ConnectionType: Send + Sync {
    fn get_type(&self) -> &'static str;

    /// Called once at registration. Most backends have nothing to do.
    fn init(&self) -> Result<()> {
        Ok(())
    }

    /// Backend-specific setup that must happen before `listen` (the
    /// TLS context). Backends without configuration accept the
    /// default no-op.
    fn configure(&self, _config: &TlsConfig) -> Result<()> {
        Ok(())
    }

    /// Creates the listening socket (`socket(2)`), unbound.
    fn conn_create(&self) -> Result<RawFd>;

    /// Binds `fd` to `addr:port` and starts listening (backlog 128).
    fn listen(&self, fd: RawFd, addr: &str, port: u16) -> Result<()>;

    /// Accepts one client on `listener`, returning a ready-to-use
    /// `Connection` (for TLS, the handshake has already completed).
    fn accept(&self, listener: RawFd) -> Result<Box<dyn Connection>>;
}
