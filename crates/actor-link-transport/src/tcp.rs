//! TCP connector: dials a peer and pumps frames in both directions.
//!
//! One reader task reassembles the inbound byte stream on the 4-byte length
//! prefix and emits complete frame buffers; one writer task drains the
//! outbound queue. Both tasks are aborted on [`TcpConnector::disconnect`],
//! which closes the socket by dropping its halves.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use actor_link_proto::{LEN_PREFIX_SIZE, MAX_FRAME_LEN};
use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{Result, TransportError};
use crate::{Connector, ConnectorEvent, SendCompletion};

/// Connects to a single remote endpoint over TCP.
///
/// The connector is reusable across threads (`&self` API) but carries at
/// most one live connection; a second [`connect`](Connector::connect) while
/// connected fails with [`TransportError::AlreadyConnected`].
pub struct TcpConnector {
    addr: SocketAddr,
    inner: Mutex<Option<Conn>>,
    connected: Arc<AtomicBool>,
}

struct Conn {
    out_tx: mpsc::UnboundedSender<Outbound>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

struct Outbound {
    frame: Bytes,
    completion: Option<SendCompletion>,
}

impl TcpConnector {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            inner: Mutex::new(None),
            connected: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn lock_inner(&self) -> MutexGuard<'_, Option<Conn>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn read_loop(
        mut read: OwnedReadHalf,
        events: mpsc::UnboundedSender<ConnectorEvent>,
        connected: Arc<AtomicBool>,
    ) {
        let mut len_buf = [0_u8; LEN_PREFIX_SIZE];

        loop {
            if read.read_exact(&mut len_buf).await.is_err() {
                break; // EOF or read error
            }
            let len = u32::from_be_bytes(len_buf) as usize;
            if len == 0 || len > MAX_FRAME_LEN {
                warn!(len, "invalid inbound frame length, closing connection");
                break;
            }

            // Deliver the frame with its prefix intact, so receivers can
            // parse it with the same codec that produced it.
            let mut frame = vec![0_u8; LEN_PREFIX_SIZE + len];
            frame[..LEN_PREFIX_SIZE].copy_from_slice(&len_buf);
            if read.read_exact(&mut frame[LEN_PREFIX_SIZE..]).await.is_err() {
                break;
            }

            if events.send(ConnectorEvent::Data(Bytes::from(frame))).is_err() {
                // Receiver gone; nobody cares about this connection anymore.
                break;
            }
        }

        if connected.swap(false, Ordering::SeqCst) {
            debug!("connection closed by peer or read failure");
            let _ = events.send(ConnectorEvent::Disconnected);
        }
    }

    async fn write_loop(
        mut write: OwnedWriteHalf,
        mut out_rx: mpsc::UnboundedReceiver<Outbound>,
        events: mpsc::UnboundedSender<ConnectorEvent>,
        connected: Arc<AtomicBool>,
    ) {
        while let Some(out) = out_rx.recv().await {
            match write.write_all(&out.frame).await {
                Ok(()) => {
                    if let Some(tx) = out.completion {
                        let _ = tx.send(Ok(()));
                    }
                }
                Err(e) => {
                    warn!(error = %e, "write failed, closing connection");
                    if let Some(tx) = out.completion {
                        let _ = tx.send(Err(TransportError::Io(e)));
                    }
                    if connected.swap(false, Ordering::SeqCst) {
                        let _ = events.send(ConnectorEvent::Disconnected);
                    }
                    return;
                }
            }
        }
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, timeout: Duration) -> Result<mpsc::UnboundedReceiver<ConnectorEvent>> {
        if self.lock_inner().is_some() {
            return Err(TransportError::AlreadyConnected);
        }

        let stream = tokio::time::timeout(timeout, TcpStream::connect(self.addr))
            .await
            .map_err(|_| TransportError::ConnectTimeout)??;
        stream.set_nodelay(true).ok();

        debug!(addr = %self.addr, "connected");

        let (read_half, write_half) = stream.into_split();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();

        self.connected.store(true, Ordering::SeqCst);
        let reader = tokio::spawn(Self::read_loop(
            read_half,
            event_tx.clone(),
            self.connected.clone(),
        ));
        let writer = tokio::spawn(Self::write_loop(
            write_half,
            out_rx,
            event_tx,
            self.connected.clone(),
        ));

        *self.lock_inner() = Some(Conn {
            out_tx,
            reader,
            writer,
        });
        Ok(event_rx)
    }

    fn send(&self, frame: Bytes, completion: Option<SendCompletion>) -> Result<()> {
        if frame.len() > LEN_PREFIX_SIZE + MAX_FRAME_LEN {
            return Err(TransportError::FrameTooLarge(frame.len()));
        }
        let guard = self.lock_inner();
        let conn = guard.as_ref().ok_or(TransportError::NotConnected)?;
        conn.out_tx
            .send(Outbound { frame, completion })
            .map_err(|_| TransportError::Closed)
    }

    fn disconnect(&self) {
        if let Some(conn) = self.lock_inner().take() {
            self.connected.store(false, Ordering::SeqCst);
            conn.reader.abort();
            conn.writer.abort();
            debug!(addr = %self.addr, "disconnected");
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for TcpConnector {
    fn drop(&mut self) {
        self.disconnect();
    }
}
