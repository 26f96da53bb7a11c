//! Blocking TCP transport.

use std::io::{Read, Write};
use std::net::TcpStream;

use anyhow::{Context, Result};
use tracing::info;

/// A connected byte stream plus the local address advertised in message
/// heads. Abstracted so the session runner can be driven over loopback pairs
/// in tests.
pub trait Transport: Read + Write {
    fn local_address(&self) -> String;
}

/// TCP connection to the Vaultwire server.
pub struct TcpTransport {
    stream: TcpStream,
}

impl TcpTransport {
    pub fn connect(host: &str, port: u16) -> Result<Self> {
        let stream = TcpStream::connect((host, port))
            .with_context(|| format!("Failed to connect to {}:{}", host, port))?;
        info!(%host, port, "connected");
        Ok(TcpTransport { stream })
    }
}

impl Transport for TcpTransport {
    fn local_address(&self) -> String {
        self.stream
            .local_addr()
            .map(|a| a.ip().to_string())
            .unwrap_or_else(|_| "unknown".to_string())
    }
}

impl Read for TcpTransport {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for TcpTransport {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.stream.flush()
    }
}

impl Transport for TcpStream {
    fn local_address(&self) -> String {
        self.local_addr()
            .map(|a| a.ip().to_string())
            .unwrap_or_else(|_| "unknown".to_string())
    }
}
