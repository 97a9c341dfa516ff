//! Connection management.

use crate::config::{ClientConfig, ServerAddress};
use crate::error::ClientError;
use crate::stream::ClientStream;
use bytes::BytesMut;
use sphinx_protocol::{Decoder, Encoder, Reply};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Default read buffer size (8 KiB).
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8 * 1024;

/// A handshaken connection to searchd.
///
/// One request is in flight at a time; every method takes `&mut self`.
pub struct Connection {
    stream: ClientStream,
    address: ServerAddress,
    decoder: Decoder,
    read_timeout: Duration,
    server_version: u32,
    persistent: bool,
}

impl Connection {
    /// Connects and performs the version handshake, both bounded by the connect timeout.
    pub async fn connect(config: &ClientConfig) -> Result<Self, ClientError> {
        let address = config
            .address()
            .map_err(|e| ClientError::Configuration(e.to_string()))?;
        tracing::debug!("Connecting to {}...", address);

        let mut stream = tokio::time::timeout(config.connect_timeout(), open_stream(&address))
            .await
            .map_err(|_| {
                tracing::debug!("Connection timeout");
                ClientError::Connect {
                    addr: address.to_string(),
                    source: io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
                }
            })?
            .map_err(|e| {
                tracing::debug!("Connection failed: {}", e);
                ClientError::Connect {
                    addr: address.to_string(),
                    source: e,
                }
            })?;

        tracing::debug!(
            "Connected to {} over {}",
            address,
            if stream.is_unix() { "unix socket" } else { "tcp" }
        );

        let server_version = tokio::time::timeout(config.connect_timeout(), handshake(&mut stream))
            .await
            .map_err(|_| ClientError::Timeout)??;
        tracing::debug!("Handshake complete, server protocol v{}", server_version);

        Ok(Self {
            stream,
            address,
            decoder: Decoder::new(),
            read_timeout: config.read_timeout(),
            server_version,
            persistent: false,
        })
    }

    /// Asks searchd to keep the connection open across requests.
    pub async fn persist(&mut self) -> Result<(), ClientError> {
        let frame = Encoder::persist()?;
        tokio::time::timeout(self.read_timeout, self.stream.write_all(&frame))
            .await
            .map_err(|_| ClientError::Timeout)??;
        self.persistent = true;
        tracing::debug!("Connection to {} is now persistent", self.address);
        Ok(())
    }

    /// Sends an encoded request and waits for the complete reply.
    ///
    /// The read timeout bounds each wait for the socket, not the whole reply:
    /// it restarts every time bytes arrive.
    pub async fn request(&mut self, frame: &BytesMut) -> Result<Reply, ClientError> {
        tracing::debug!("Sending request ({} bytes) to {}", frame.len(), self.address);
        self.decoder.clear();

        match tokio::time::timeout(self.read_timeout, self.stream.write_all(frame)).await {
            Ok(written) => written?,
            Err(_) => return Err(self.timed_out()),
        }

        let mut buf = vec![0u8; DEFAULT_READ_BUFFER_SIZE];
        loop {
            if let Some(reply) = self.decoder.decode_reply()? {
                tracing::debug!(
                    "Reply received: status={} body={} bytes",
                    reply.status,
                    reply.body.len()
                );
                return Ok(reply);
            }

            let read = tokio::time::timeout(self.read_timeout, self.stream.read(&mut buf));
            let n = match read.await {
                Ok(read) => read?,
                Err(_) => return Err(self.timed_out()),
            };
            if n == 0 {
                tracing::debug!("Connection closed (0 bytes)");
                return Err(ClientError::ConnectionClosed);
            }
            self.decoder.extend(&buf[..n]);
        }
    }

    fn timed_out(&self) -> ClientError {
        tracing::debug!("Request to {} timed out", self.address);
        ClientError::Timeout
    }

    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    /// Protocol version the server announced during the handshake.
    pub fn server_version(&self) -> u32 {
        self.server_version
    }

    pub fn is_persistent(&self) -> bool {
        self.persistent
    }

    /// Shuts the socket down. Errors are ignored, the socket is released either way.
    pub async fn close(mut self) {
        tracing::debug!("Closing connection to {}", self.address);
        let _ = self.stream.shutdown().await;
    }
}

async fn open_stream(address: &ServerAddress) -> io::Result<ClientStream> {
    match address {
        ServerAddress::Tcp { host, port } => {
            let stream = TcpStream::connect((host.as_str(), *port)).await?;
            stream.set_nodelay(true).ok();
            Ok(ClientStream::Tcp { stream })
        }
        #[cfg(unix)]
        ServerAddress::Unix(path) => {
            let stream = tokio::net::UnixStream::connect(path).await?;
            Ok(ClientStream::Unix { stream })
        }
        #[cfg(not(unix))]
        ServerAddress::Unix(_) => Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "unix sockets are not supported on this platform",
        )),
    }
}

async fn handshake(stream: &mut ClientStream) -> Result<u32, ClientError> {
    stream.write_all(&Encoder::handshake()).await?;

    let mut raw = [0u8; 4];
    stream.read_exact(&mut raw).await.map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            ClientError::ConnectionClosed
        } else {
            ClientError::Io(e)
        }
    })?;
    Ok(Decoder::handshake(raw)?)
}
