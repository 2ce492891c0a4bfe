//! Frame codec for the real-time channel
//!
//! Frame = 4-byte big-endian body length + JSON body

use bytes::{Buf, BufMut, Bytes, BytesMut};

use anchorsync_core::{SyncError, SyncResult};

use crate::ChannelMessage;

/// Length prefix size
pub const FRAME_HEADER_SIZE: usize = 4;

/// Default maximum body size (1 MiB)
pub const MAX_FRAME_SIZE: usize = 1 << 20;

/// Length-prefixed JSON codec
#[derive(Clone, Copy, Debug)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl FrameCodec {
    pub fn new() -> Self {
        FrameCodec {
            max_frame_size: MAX_FRAME_SIZE,
        }
    }

    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        FrameCodec { max_frame_size }
    }

    #[inline]
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Encode one message into a standalone frame
    pub fn encode(&self, msg: &ChannelMessage) -> SyncResult<Bytes> {
        let mut buf = BytesMut::new();
        self.encode_into(msg, &mut buf)?;
        Ok(buf.freeze())
    }

    /// Append one frame to `dst`
    pub fn encode_into(&self, msg: &ChannelMessage, dst: &mut BytesMut) -> SyncResult<()> {
        let body = serde_json::to_vec(msg)?;
        if body.len() > self.max_frame_size {
            return Err(SyncError::FrameTooLarge {
                actual: body.len(),
                max: self.max_frame_size,
            });
        }

        dst.reserve(FRAME_HEADER_SIZE + body.len());
        dst.put_u32(body.len() as u32);
        dst.put_slice(&body);
        Ok(())
    }

    /// Pop one complete frame from `src`, or `None` if more bytes are needed
    pub fn decode(&self, src: &mut BytesMut) -> SyncResult<Option<ChannelMessage>> {
        if src.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        let mut header = [0u8; FRAME_HEADER_SIZE];
        header.copy_from_slice(&src[..FRAME_HEADER_SIZE]);
        let body_len = u32::from_be_bytes(header) as usize;

        if body_len > self.max_frame_size {
            return Err(SyncError::FrameTooLarge {
                actual: body_len,
                max: self.max_frame_size,
            });
        }

        if src.len() < FRAME_HEADER_SIZE + body_len {
            src.reserve(FRAME_HEADER_SIZE + body_len - src.len());
            return Ok(None);
        }

        src.advance(FRAME_HEADER_SIZE);
        let body = src.split_to(body_len);
        let msg = serde_json::from_slice(&body)?;
        Ok(Some(msg))
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}
