//! Framed TCP transport
//!
//! Each connection runs a background read loop and write loop bridging
//! the socket to a `ChannelHandle`. A framing error ends the connection;
//! the stream cannot be resynchronised after one.

use std::net::SocketAddr;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use anchorsync_core::{SyncError, SyncResult};
use anchorsync_wire::FrameCodec;

use crate::{ChannelHandle, ChannelReceiver, ChannelSender};

/// Read buffer growth step
const READ_CHUNK: usize = 8 * 1024;

/// Connect to a channel server
pub async fn connect(addr: SocketAddr, codec: FrameCodec) -> SyncResult<ChannelHandle> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| SyncError::Transport(e.to_string()))?;
    tracing::info!(%addr, "channel: connected");
    Ok(spawn_stream(stream, codec))
}

/// Bridge an established stream to a `ChannelHandle`
pub fn spawn_stream(stream: TcpStream, codec: FrameCodec) -> ChannelHandle {
    let _ = stream.set_nodelay(true);
    let peer = stream.peer_addr().ok();
    let (reader, writer) = stream.into_split();

    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let (in_tx, in_rx) = mpsc::unbounded_channel();

    tokio::spawn(write_loop(writer, out_rx, codec, peer));
    tokio::spawn(read_loop(reader, in_tx, codec, peer));

    ChannelHandle::new(out_tx, in_rx)
}

async fn read_loop(
    mut reader: OwnedReadHalf,
    tx: ChannelSender,
    codec: FrameCodec,
    peer: Option<SocketAddr>,
) {
    let mut buf = BytesMut::with_capacity(READ_CHUNK);
    loop {
        loop {
            match codec.decode(&mut buf) {
                Ok(Some(msg)) => {
                    tracing::debug!(?peer, event = msg.event_name(), "channel: received");
                    if tx.send(msg).is_err() {
                        return; // Subscriber gone
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!(?peer, "channel: dropping connection: {}", e);
                    return;
                }
            }
        }

        buf.reserve(READ_CHUNK);
        match reader.read_buf(&mut buf).await {
            Ok(0) => {
                tracing::debug!(?peer, "channel: peer closed");
                return;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(?peer, "channel: receive error: {}", e);
                return;
            }
        }
    }
}

async fn write_loop(
    mut writer: OwnedWriteHalf,
    mut rx: ChannelReceiver,
    codec: FrameCodec,
    peer: Option<SocketAddr>,
) {
    let mut buf = BytesMut::new();
    while let Some(msg) = rx.recv().await {
        buf.clear();
        if let Err(e) = codec.encode_into(&msg, &mut buf) {
            tracing::warn!(?peer, event = msg.event_name(), "channel: cannot encode: {}", e);
            continue;
        }
        if let Err(e) = writer.write_all(&buf).await {
            tracing::warn!(?peer, "channel: send error: {}", e);
            return;
        }
    }
    let _ = writer.shutdown().await;
}

/// Accepting side of the channel
pub struct ChannelListener {
    listener: TcpListener,
    local_addr: SocketAddr,
    codec: FrameCodec,
}

impl ChannelListener {
    pub async fn bind(addr: SocketAddr, codec: FrameCodec) -> SyncResult<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| SyncError::Transport(e.to_string()))?;

        Ok(ChannelListener {
            listener,
            local_addr,
            codec,
        })
    }

    /// Get local address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Wait for the next connection
    pub async fn accept(&self) -> SyncResult<(ChannelHandle, SocketAddr)> {
        let (stream, peer) = self
            .listener
            .accept()
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))?;
        tracing::debug!(%peer, "channel: accepted");
        Ok((spawn_stream(stream, self.codec), peer))
    }
}
