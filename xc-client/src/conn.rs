//! # Store Connection
//!
//! Purpose: One authenticated duplex session with the store. Frames commands
//! with the codec, enforces deadlines on every frame, and remembers when its
//! framing position can no longer be trusted.
//!
//! ## Design Principles
//! 1. **Exclusive Ownership**: A connection is driven by one caller at a time.
//! 2. **Deadline per Frame**: `send` and `receive` each check the deadline
//!    before touching the socket, then bound the I/O by it.
//! 3. **Poison on Doubt**: Any failed or abandoned frame marks the connection
//!    poisoned so the pool closes it instead of recycling it.
//! 4. **Buffer Reuse**: Read and write buffers live on the connection.

use std::io;
use std::time::Duration;

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout_at, Instant};

use crate::config::ClientConfig;
use crate::deadline::Deadline;
use crate::error::{ClientError, ClientResult};
use crate::resp::{decode, encode_into, Command, Reply};

/// A single store connection over a duplex byte stream.
#[derive(Debug)]
pub struct Connection<S = TcpStream> {
    stream: S,
    read_buf: BytesMut,
    write_buf: Vec<u8>,
    io_timeout: Duration,
    poisoned: bool,
}

impl Connection<TcpStream> {
    /// Dials `config.addr` and authenticates when credentials are configured.
    ///
    /// Dial and AUTH share one `connect_timeout` budget. On a failed handshake
    /// the stream is shut down before the error is returned.
    pub async fn open(config: &ClientConfig) -> ClientResult<Self> {
        let at = Instant::now() + config.connect_timeout;
        let stream = match timeout_at(at, TcpStream::connect(config.addr.as_str())).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(connect_error(config, source)),
            Err(_) => {
                let source = io::Error::new(io::ErrorKind::TimedOut, "connect timed out");
                return Err(connect_error(config, source));
            }
        };
        // Disable Nagle to keep request latency low for small payloads.
        stream
            .set_nodelay(true)
            .map_err(|source| connect_error(config, source))?;

        let mut conn = Connection::from_stream(stream, config.io_timeout);
        if let Some((username, password)) = config.credentials() {
            if let Err(err) = conn.auth(Deadline::at(at), username, password).await {
                conn.close().await;
                return Err(err);
            }
        }
        Ok(conn)
    }
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps an already connected stream.
    pub fn from_stream(stream: S, io_timeout: Duration) -> Self {
        Connection {
            stream,
            read_buf: BytesMut::with_capacity(4 * 1024),
            write_buf: Vec::with_capacity(256),
            io_timeout,
            poisoned: false,
        }
    }

    /// Issues AUTH and requires `+OK`.
    pub async fn auth(
        &mut self,
        deadline: Deadline,
        username: Option<&str>,
        password: &str,
    ) -> ClientResult<()> {
        match self.exec(deadline, &Command::auth(username, password)).await {
            Ok(Reply::Status(status)) if status == "OK" => Ok(()),
            Ok(Reply::Error(message)) => Err(ClientError::Auth(message)),
            Ok(other) => Err(ClientError::Auth(format!("unexpected reply {other:?}"))),
            Err(err) => Err(err),
        }
    }

    /// Sends PING and requires `+PONG`.
    pub async fn ping(&mut self, deadline: Deadline) -> ClientResult<()> {
        match self.exec(deadline, &Command::ping()).await? {
            Reply::Status(status) if status == "PONG" => Ok(()),
            Reply::Error(message) => Err(ClientError::Server(message)),
            other => Err(ClientError::UnexpectedReply(other)),
        }
    }

    /// One send followed by one receive.
    pub async fn exec(&mut self, deadline: Deadline, cmd: &Command) -> ClientResult<Reply> {
        self.send(deadline, cmd).await?;
        self.receive(deadline).await
    }

    /// Writes one complete command frame and flushes it.
    pub async fn send(&mut self, deadline: Deadline, cmd: &Command) -> ClientResult<()> {
        if deadline.is_expired() {
            return Err(ClientError::DeadlineExceeded);
        }
        let at = deadline.or_after(self.io_timeout);

        self.write_buf.clear();
        encode_into(cmd, &mut self.write_buf);

        // Stays set if the write fails or this future is dropped mid-frame.
        self.poisoned = true;
        let stream = &mut self.stream;
        let frame = &self.write_buf;
        let write = async move {
            stream.write_all(frame).await?;
            stream.flush().await
        };
        match timeout_at(at, write).await {
            Ok(Ok(())) => {
                self.poisoned = false;
                Ok(())
            }
            Ok(Err(err)) => Err(ClientError::Io(err)),
            Err(_) => Err(ClientError::DeadlineExceeded),
        }
    }

    /// Reads exactly one reply, leaving any following bytes buffered.
    pub async fn receive(&mut self, deadline: Deadline) -> ClientResult<Reply> {
        if deadline.is_expired() {
            return Err(ClientError::DeadlineExceeded);
        }
        let at = deadline.or_after(self.io_timeout);

        self.poisoned = true;
        let reply = timeout_at(at, self.read_reply())
            .await
            .map_err(|_| ClientError::DeadlineExceeded)??;
        self.poisoned = false;
        Ok(reply)
    }

    async fn read_reply(&mut self) -> ClientResult<Reply> {
        loop {
            if let Some((reply, used)) = decode(&self.read_buf)? {
                self.read_buf.advance(used);
                return Ok(reply);
            }
            let read = self.stream.read_buf(&mut self.read_buf).await?;
            if read == 0 {
                return Err(ClientError::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed by store",
                )));
            }
        }
    }

    /// True when the framing position is unknown after a failed or abandoned frame.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Shuts the stream down. Errors are ignored; the socket is dropped either way.
    pub async fn close(mut self) {
        let _ = self.stream.shutdown().await;
    }
}

fn connect_error(config: &ClientConfig, source: io::Error) -> ClientError {
    ClientError::Connect {
        addr: config.addr.clone(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, DuplexStream};

    fn pair() -> (Connection<DuplexStream>, DuplexStream) {
        let (client, server) = duplex(1024);
        (Connection::from_stream(client, Duration::from_secs(1)), server)
    }

    #[tokio::test]
    async fn send_writes_one_frame() {
        let (mut conn, mut server) = pair();
        conn.send(Deadline::none(), &Command::get(b"k")).await.unwrap();

        let mut buf = vec![0u8; 64];
        let n = server.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"*2\r\n$3\r\nGET\r\n$1\r\nk\r\n");
        assert!(!conn.is_poisoned());
    }

    #[tokio::test]
    async fn receive_stops_at_reply_boundary() {
        let (mut conn, mut server) = pair();
        server.write_all(b"$3\r\nabc\r\n:7\r\n").await.unwrap();

        let first = conn.receive(Deadline::none()).await.unwrap();
        let second = conn.receive(Deadline::none()).await.unwrap();
        assert_eq!(first, Reply::Bulk(b"abc".to_vec()));
        assert_eq!(second, Reply::Integer(7));
    }

    #[tokio::test]
    async fn receive_joins_split_frames() {
        let (mut conn, mut server) = pair();
        let writer = tokio::spawn(async move {
            server.write_all(b"$5\r\nhe").await.unwrap();
            tokio::time::sleep(Duration::from_millis(20)).await;
            server.write_all(b"llo\r\n").await.unwrap();
            server
        });

        let reply = conn.receive(Deadline::none()).await.unwrap();
        assert_eq!(reply, Reply::Bulk(b"hello".to_vec()));
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn expired_deadline_fails_without_io() {
        let (mut conn, _server) = pair();
        let expired = Deadline::after(Duration::ZERO);

        let err = conn.send(expired, &Command::ping()).await.unwrap_err();
        assert!(err.is_timeout());
        let err = conn.receive(expired).await.unwrap_err();
        assert!(err.is_timeout());
        assert!(!conn.is_poisoned());
    }

    #[tokio::test(start_paused = true)]
    async fn receive_timeout_poisons() {
        let (mut conn, _server) = pair();
        let err = conn
            .receive(Deadline::after(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(conn.is_poisoned());
    }

    #[tokio::test]
    async fn eof_is_an_io_error() {
        let (mut conn, server) = pair();
        drop(server);
        let err = conn.receive(Deadline::none()).await.unwrap_err();
        assert!(matches!(err, ClientError::Io(_)));
        assert!(conn.is_poisoned());
    }

    #[tokio::test]
    async fn malformed_reply_poisons() {
        let (mut conn, mut server) = pair();
        server.write_all(b":nope\r\n").await.unwrap();
        let err = conn.receive(Deadline::none()).await.unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)));
        assert!(conn.is_poisoned());
    }

    #[tokio::test]
    async fn server_error_reply_keeps_connection_usable() {
        let (mut conn, mut server) = pair();
        server.write_all(b"-ERR wrong type\r\n+PONG\r\n").await.unwrap();

        let reply = conn.receive(Deadline::none()).await.unwrap();
        assert_eq!(reply, Reply::Error("ERR wrong type".into()));
        assert!(!conn.is_poisoned());
        assert_eq!(conn.receive(Deadline::none()).await.unwrap(), Reply::Status("PONG".into()));
    }
}
