//! Transport layer abstraction for the TCL RPC connection

use crate::error::{OpenOcdError, Result};

/// Byte stream to the TCL server
///
/// Transports are created unconnected; `open` establishes the connection
/// so a probe driver can be created long before it is used.
pub trait Transport {
    /// Establish the connection
    fn open(&mut self) -> Result<()>;

    /// Drop the connection
    fn close(&mut self) -> Result<()>;

    /// Write all bytes
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Read at least one byte into `buf`, returning the count
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
}

pub mod tcp {
    //! TCP socket transport implementation

    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::time::Duration;

    /// Replies slower than this are treated as a dead server
    const IO_TIMEOUT: Duration = Duration::from_secs(30);

    /// TCP socket transport
    pub struct TcpTransport {
        host: String,
        port: u16,
        stream: Option<TcpStream>,
    }

    impl TcpTransport {
        /// Create an unconnected transport for `host:port`
        pub fn new(host: &str, port: u16) -> Self {
            Self {
                host: host.to_string(),
                port,
                stream: None,
            }
        }

        fn stream(&mut self) -> Result<&mut TcpStream> {
            self.stream.as_mut().ok_or(OpenOcdError::NotConnected)
        }
    }

    impl Transport for TcpTransport {
        fn open(&mut self) -> Result<()> {
            let addr = format!("{}:{}", self.host, self.port);
            log::debug!("Connecting to OpenOCD at {}", addr);

            let stream = TcpStream::connect(&addr)
                .map_err(|e| OpenOcdError::ConnectionFailed(format!("{}: {}", addr, e)))?;
            stream.set_nodelay(true)?;
            stream.set_read_timeout(Some(IO_TIMEOUT))?;
            stream.set_write_timeout(Some(IO_TIMEOUT))?;

            log::info!("Connected to OpenOCD at {}", addr);
            self.stream = Some(stream);
            Ok(())
        }

        fn close(&mut self) -> Result<()> {
            if let Some(stream) = self.stream.take() {
                stream.shutdown(std::net::Shutdown::Both)?;
            }
            Ok(())
        }

        fn write(&mut self, data: &[u8]) -> Result<()> {
            self.stream()?.write_all(data)?;
            Ok(())
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            match self.stream()?.read(buf)? {
                0 => Err(OpenOcdError::Disconnected),
                n => Ok(n),
            }
        }
    }
}
