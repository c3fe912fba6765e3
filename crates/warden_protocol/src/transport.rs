//! The message transport primitive.
//!
//! A [`Transport`] is a reliable, ordered, length-delimited byte-message
//! channel. The protocol layer treats it as a primitive: frames go in with
//! [`Transport::send`], come out of [`Transport::recv`], and the channel can
//! be closed from either side at any time. Two constructors are provided: a
//! TCP-backed transport with a `u32` length prefix per frame, and an
//! in-memory cross-connected pair for tests.
//!
//! TLS wrapping is not handled here; deployments that need it terminate TLS
//! in front of the listener.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, trace};

use crate::error::ProtocolError;

/// Frames larger than this are treated as a protocol violation.
pub const MAX_FRAME_LEN: usize = 1 << 24;

/// A reliable, ordered message channel between two protocol endpoints.
///
/// All methods are safe to call concurrently; `recv` is intended to be
/// driven by a single pump task per session.
pub struct Transport {
    outbound: UnboundedSender<Vec<u8>>,
    inbound: Mutex<UnboundedReceiver<Vec<u8>>>,
    closed: Arc<AtomicBool>,
    close_notify: Arc<Notify>,
}

impl Transport {
    /// Wraps an established TCP stream, spawning reader and writer pump
    /// tasks. Each frame is written as a big-endian `u32` length followed by
    /// the frame bytes.
    pub fn from_tcp(stream: TcpStream) -> Self {
        let (mut read_half, mut write_half) = stream.into_split();
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Vec<u8>>();
        let (inbound_tx, inbound) = mpsc::unbounded_channel::<Vec<u8>>();
        let closed = Arc::new(AtomicBool::new(false));
        let close_notify = Arc::new(Notify::new());

        // Writer pump: drains the outbound queue onto the socket.
        {
            let closed = closed.clone();
            let close_notify = close_notify.clone();
            tokio::spawn(async move {
                loop {
                    let notified = close_notify.notified();
                    if closed.load(Ordering::SeqCst) {
                        break;
                    }
                    tokio::select! {
                        frame = outbound_rx.recv() => {
                            let Some(frame) = frame else { break };
                            if write_half.write_u32(frame.len() as u32).await.is_err()
                                || write_half.write_all(&frame).await.is_err()
                            {
                                mark_closed(&closed, &close_notify);
                                break;
                            }
                        }
                        _ = notified => break,
                    }
                }
                let _ = write_half.shutdown().await;
            });
        }

        // Reader pump: feeds inbound frames until EOF, error or close.
        {
            let closed = closed.clone();
            let close_notify = close_notify.clone();
            tokio::spawn(async move {
                loop {
                    let notified = close_notify.notified();
                    if closed.load(Ordering::SeqCst) {
                        break;
                    }
                    tokio::select! {
                        frame = read_frame(&mut read_half) => {
                            match frame {
                                Ok(frame) => {
                                    if inbound_tx.send(frame).is_err() {
                                        break;
                                    }
                                }
                                Err(e) => {
                                    trace!("transport read ended: {e}");
                                    mark_closed(&closed, &close_notify);
                                    break;
                                }
                            }
                        }
                        _ = notified => break,
                    }
                }
            });
        }

        Self {
            outbound,
            inbound: Mutex::new(inbound),
            closed,
            close_notify,
        }
    }

    /// Creates a cross-connected in-memory transport pair.
    ///
    /// Frames sent on one end arrive at the other. Closing either end closes
    /// both, matching how a closed socket looks from each side.
    pub fn pair() -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let close_notify = Arc::new(Notify::new());
        let a = Self {
            outbound: a_tx,
            inbound: Mutex::new(a_rx),
            closed: closed.clone(),
            close_notify: close_notify.clone(),
        };
        let b = Self {
            outbound: b_tx,
            inbound: Mutex::new(b_rx),
            closed,
            close_notify,
        };
        (a, b)
    }

    /// Queues a frame for delivery. Fails once the transport is closed.
    pub fn send(&self, frame: Vec<u8>) -> Result<(), ProtocolError> {
        if self.is_closed() {
            return Err(ProtocolError::ConnectionClosed);
        }
        self.outbound
            .send(frame)
            .map_err(|_| ProtocolError::ConnectionClosed)
    }

    /// Receives the next inbound frame, or `None` once the transport is
    /// closed and drained.
    pub async fn recv(&self) -> Option<Vec<u8>> {
        let mut inbound = self.inbound.lock().await;
        // Frames that arrived before a close are still delivered.
        match inbound.try_recv() {
            Ok(frame) => return Some(frame),
            Err(mpsc::error::TryRecvError::Empty) => {}
            Err(mpsc::error::TryRecvError::Disconnected) => return None,
        }
        let notified = self.close_notify.notified();
        if self.is_closed() {
            return None;
        }
        tokio::select! {
            frame = inbound.recv() => frame,
            _ = notified => None,
        }
    }

    /// Whether the transport has been closed from either side.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Closes the transport. Idempotent; wakes any pending `recv`.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("transport closed");
            self.close_notify.notify_waiters();
        }
    }

    /// Completes once the transport is closed.
    pub async fn closed(&self) {
        let notified = self.close_notify.notified();
        if self.is_closed() {
            return;
        }
        notified.await;
    }
}

fn mark_closed(closed: &AtomicBool, notify: &Notify) {
    if !closed.swap(true, Ordering::SeqCst) {
        notify.notify_waiters();
    }
}

async fn read_frame(
    read_half: &mut tokio::net::tcp::OwnedReadHalf,
) -> Result<Vec<u8>, ProtocolError> {
    let len = read_half.read_u32().await? as usize;
    if len > MAX_FRAME_LEN {
        return Err(ProtocolError::Violation(format!(
            "frame length {len} exceeds limit"
        )));
    }
    let mut frame = vec![0u8; len];
    read_half.read_exact(&mut frame).await?;
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn pair_delivers_frames_in_order() {
        let (a, b) = Transport::pair();
        a.send(b"one".to_vec()).unwrap();
        a.send(b"two".to_vec()).unwrap();
        assert_eq!(b.recv().await.unwrap(), b"one");
        assert_eq!(b.recv().await.unwrap(), b"two");
    }

    #[tokio::test]
    async fn close_wakes_pending_recv() {
        let (a, b) = Transport::pair();
        let pending = tokio::spawn(async move { b.recv().await });
        tokio::task::yield_now().await;
        a.close();
        let received = timeout(Duration::from_secs(1), pending)
            .await
            .expect("recv should wake on close")
            .unwrap();
        assert!(received.is_none());
    }

    #[tokio::test]
    async fn send_after_close_fails() {
        let (a, b) = Transport::pair();
        b.close();
        assert!(matches!(
            a.send(b"late".to_vec()),
            Err(ProtocolError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn tcp_transport_round_trip() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let transport = Transport::from_tcp(stream);
            let frame = transport.recv().await.unwrap();
            transport.send(frame).unwrap();
            // Hold the transport open until the peer is done.
            transport.closed().await;
        });

        let stream = TcpStream::connect(addr).await.unwrap();
        let client = Transport::from_tcp(stream);
        client.send(b"echo me".to_vec()).unwrap();
        let echoed = timeout(Duration::from_secs(2), client.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(echoed, b"echo me");
        client.close();
        let _ = timeout(Duration::from_secs(2), server).await;
    }
}
