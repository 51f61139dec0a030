use std::fmt;
use std::str::FromStr;

use tokio::net::TcpStream;

use crate::types::{ErrorKind, RedisError, RedisResult};

/// The address of a server, a plain `(host, port)` pair.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionAddr {
    /// Hostname or IP address.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

impl ConnectionAddr {
    /// Creates a new address from host and port.
    pub fn new(host: impl Into<String>, port: u16) -> ConnectionAddr {
        ConnectionAddr {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for ConnectionAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for ConnectionAddr {
    type Err = RedisError;

    // Parses `host:port`, the format redirect replies carry.
    fn from_str(s: &str) -> RedisResult<ConnectionAddr> {
        let (host, port) = s.rsplit_once(':').ok_or_else(|| {
            RedisError::from((
                ErrorKind::InvalidClientConfig,
                "Invalid address",
                format!("missing port in {s:?}"),
            ))
        })?;
        let port = port.parse().map_err(|_| {
            RedisError::from((
                ErrorKind::InvalidClientConfig,
                "Invalid address",
                format!("bad port in {s:?}"),
            ))
        })?;
        Ok(ConnectionAddr::new(host, port))
    }
}

/// Settings applied to every TCP stream the library opens.
#[derive(Clone, Debug)]
pub struct TcpSettings {
    nodelay: bool,
    keepalive: socket2::TcpKeepalive,
}

impl TcpSettings {
    /// Sets the value of the `TCP_NODELAY` option on new sockets.
    pub fn set_nodelay(self, nodelay: bool) -> Self {
        Self { nodelay, ..self }
    }

    /// Set parameters configuring TCP keepalive probes for new sockets.
    pub fn set_keepalive(self, keepalive: socket2::TcpKeepalive) -> Self {
        Self { keepalive, ..self }
    }
}

impl Default for TcpSettings {
    fn default() -> Self {
        Self {
            nodelay: true,
            keepalive: socket2::TcpKeepalive::new(),
        }
    }
}

/// Opens a TCP stream to `addr` and applies the socket settings.
pub(crate) async fn connect_tcp(
    addr: &ConnectionAddr,
    settings: &TcpSettings,
) -> RedisResult<TcpStream> {
    let stream = TcpStream::connect((addr.host.as_str(), addr.port)).await?;
    stream.set_nodelay(settings.nodelay)?;
    let sock = socket2::SockRef::from(&stream);
    sock.set_keepalive(true)?;
    sock.set_tcp_keepalive(&settings.keepalive)?;
    Ok(stream)
}
