//! Transport session: one physical channel to the coordinator.
//!
//! A session runs two tasks over a serial port or TCP socket. The reader
//! delimits the incoming byte stream into frame bodies and delivers frames,
//! end-of-stream and read errors in order on a channel. The writer owns the
//! write half and serves write requests one at a time, so a stalled peer can
//! only ever block the writer task, which [`Session::close`] can abort.

use std::io;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, StopBits};
use tracing::{debug, trace, warn};
use zigate_protocol::FrameCodec;

/// Read buffer size for the reader task.
const READ_BUFFER_SIZE: usize = 1024;

/// Write requests queued ahead of the writer task.
const WRITE_QUEUE_DEPTH: usize = 16;

/// How long a graceful serial close may spend flushing.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Kind of physical channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// TCP socket to a network-attached coordinator.
    Socket,
    /// Local serial port.
    Serial,
}

impl TransportKind {
    /// Choose the transport from the shape of the address.
    ///
    /// `host:port` and `tcp://host:port` select a socket; anything else is a
    /// serial port name.
    pub fn detect(address: &str) -> Self {
        if socket_address(address).is_some() {
            TransportKind::Socket
        } else {
            TransportKind::Serial
        }
    }
}

/// The `host:port` part of a network address.
fn socket_address(address: &str) -> Option<&str> {
    let stripped = address.strip_prefix("tcp://").unwrap_or(address);
    if stripped.contains('/') || stripped.contains('\\') {
        return None;
    }
    let (host, port) = stripped.rsplit_once(':')?;
    if host.is_empty() || port.parse::<u16>().is_err() {
        return None;
    }
    Some(stripped)
}

/// Something that happened on the inbound side of a session.
#[derive(Debug)]
pub enum SessionEvent {
    /// A delimited, still escaped frame body.
    Frame(Vec<u8>),
    /// The peer closed the stream.
    Closed,
    /// Reading failed; the stream is unusable.
    Error(io::Error),
}

enum WriteOp {
    Data(Vec<u8>, oneshot::Sender<io::Result<()>>),
    Shutdown(oneshot::Sender<io::Result<()>>),
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "session closed")
}

/// An open channel to the coordinator.
pub struct Session {
    kind: TransportKind,
    writes: mpsc::Sender<WriteOp>,
    writer: Mutex<Option<JoinHandle<()>>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Open the channel named by `address`.
    ///
    /// Serial ports are configured for `baud_rate`, 8 data bits, no parity,
    /// one stop bit and no flow control.
    pub async fn open(
        address: &str,
        baud_rate: u32,
    ) -> io::Result<(Session, mpsc::UnboundedReceiver<SessionEvent>)> {
        match socket_address(address) {
            Some(host) => {
                let stream = TcpStream::connect(host).await?;
                stream.set_nodelay(true)?;
                Ok(Session::from_stream(TransportKind::Socket, stream))
            }
            None => {
                let port = tokio_serial::new(address, baud_rate)
                    .data_bits(DataBits::Eight)
                    .parity(Parity::None)
                    .stop_bits(StopBits::One)
                    .flow_control(FlowControl::None)
                    .open_native_async()
                    .map_err(io::Error::from)?;
                debug!("Opened serial port {} at {} baud", address, baud_rate);
                Ok(Session::from_stream(TransportKind::Serial, port))
            }
        }
    }

    /// Wrap an already-established duplex stream.
    pub fn from_stream<S>(kind: TransportKind, stream: S) -> (Session, mpsc::UnboundedReceiver<SessionEvent>)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Session::from_halves(kind, reader, writer)
    }

    /// Wrap separate read and write halves.
    pub fn from_halves<R, W>(
        kind: TransportKind,
        reader: R,
        writer: W,
    ) -> (Session, mpsc::UnboundedReceiver<SessionEvent>)
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (writes_tx, writes_rx) = mpsc::channel(WRITE_QUEUE_DEPTH);
        let reader = tokio::spawn(read_loop(reader, events_tx));
        let writer = tokio::spawn(write_loop(writer, writes_rx));
        let session = Session {
            kind,
            writes: writes_tx,
            writer: Mutex::new(Some(writer)),
            reader: Mutex::new(Some(reader)),
        };
        (session, events_rx)
    }

    /// Kind of channel.
    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Write bytes and flush them, giving up after `timeout`.
    ///
    /// A write that times out may still complete later; the session stays
    /// usable for [`close`](Self::close) either way.
    pub async fn write(&self, data: &[u8], timeout: Duration) -> io::Result<()> {
        let (reply, done) = oneshot::channel();
        let request = async {
            self.writes
                .send(WriteOp::Data(data.to_vec(), reply))
                .await
                .map_err(|_| not_connected())?;
            done.await.map_err(|_| not_connected())?
        };

        match tokio::time::timeout(timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                format!("write not completed within {}ms", timeout.as_millis()),
            )),
        }
    }

    /// Release the channel.
    ///
    /// Serial ports get a bounded flush and shutdown; sockets are torn down
    /// at once, even when a write is stuck. The reader task is stopped
    /// either way, so no further events are delivered.
    pub async fn close(&self) -> io::Result<()> {
        let writer = self.writer.lock().take();
        let result = match (self.kind, writer) {
            (TransportKind::Serial, Some(writer)) => {
                let result = self.flush_and_shutdown().await;
                writer.abort();
                result
            }
            (TransportKind::Socket, Some(writer)) => {
                writer.abort();
                Ok(())
            }
            (_, None) => Ok(()),
        };

        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
        debug!("Session closed ({:?})", self.kind);
        result
    }

    async fn flush_and_shutdown(&self) -> io::Result<()> {
        let (reply, done) = oneshot::channel();
        let request = async {
            self.writes
                .send(WriteOp::Shutdown(reply))
                .await
                .map_err(|_| not_connected())?;
            done.await.map_err(|_| not_connected())?
        };

        match tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, request).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Serial flush did not finish within {:?}", CLOSE_FLUSH_TIMEOUT);
                Err(io::Error::new(io::ErrorKind::TimedOut, "flush on close timed out"))
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.get_mut().take() {
            writer.abort();
        }
        if let Some(reader) = self.reader.get_mut().take() {
            reader.abort();
        }
    }
}

async fn read_loop<R: AsyncRead + Unpin>(mut reader: R, events: mpsc::UnboundedSender<SessionEvent>) {
    let mut codec = FrameCodec::new();
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                let _ = events.send(SessionEvent::Closed);
                return;
            }
            Ok(n) => n,
            Err(e) => {
                let _ = events.send(SessionEvent::Error(e));
                return;
            }
        };

        trace!(len = n, "read from transport");
        codec.push(&buf[..n]);
        while let Some(body) = codec.decode() {
            if events.send(SessionEvent::Frame(body)).is_err() {
                // Nobody is listening any more
                return;
            }
        }
    }
}

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, data: &[u8]) -> io::Result<()> {
    writer.write_all(data).await?;
    writer.flush().await
}

async fn shutdown<W: AsyncWrite + Unpin>(writer: &mut W) -> io::Result<()> {
    writer.flush().await?;
    writer.shutdown().await
}

async fn write_loop<W: AsyncWrite + Unpin>(mut writer: W, mut ops: mpsc::Receiver<WriteOp>) {
    while let Some(op) = ops.recv().await {
        match op {
            WriteOp::Data(data, reply) => {
                trace!(len = data.len(), "write to transport");
                let _ = reply.send(write_frame(&mut writer, &data).await);
            }
            WriteOp::Shutdown(reply) => {
                let _ = reply.send(shutdown(&mut writer).await);
                return;
            }
        }
    }
}
