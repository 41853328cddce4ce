//! Packet frame layout as seen by the harness.
//!
//! ```text
//! 0..2   crc
//! 2      size (bytes following the 12-byte header)
//! 3      flags
//! 4..12  device identity
//! 12     service size
//! 13     service index
//! 14..16 service command (little-endian)
//! 16..   payload
//! ```
//!
//! Only the fields the harness inspects are decoded; CRC and flags are carried
//! through untouched.

use crate::core::device_id::DeviceId;

pub const FRAME_HEADER_LEN: usize = 12;
pub const SERVICE_HEADER_LEN: usize = 4;
const PACKET_START: usize = FRAME_HEADER_LEN + SERVICE_HEADER_LEN;

/// Borrowed view over a single frame.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    bytes: &'a [u8],
}

impl<'a> Frame<'a> {
    /// Wrap `bytes` if they are long enough to carry a service header.
    pub fn parse(bytes: &'a [u8]) -> Option<Self> {
        if bytes.len() < PACKET_START {
            return None;
        }
        Some(Self { bytes })
    }

    pub fn device_id_bytes(&self) -> &'a [u8] {
        &self.bytes[4..FRAME_HEADER_LEN]
    }

    pub fn is_from(&self, device: &DeviceId) -> bool {
        self.device_id_bytes() == device.as_bytes()
    }

    pub fn service_index(&self) -> u8 {
        self.bytes[13]
    }

    pub fn service_command(&self) -> u16 {
        u16::from_le_bytes([self.bytes[14], self.bytes[15]])
    }

    /// Bytes after the service command word.
    pub fn payload(&self) -> &'a [u8] {
        &self.bytes[PACKET_START..]
    }
}

/// Encode a single-packet frame.
pub fn encode_frame(device: &DeviceId, service_index: u8, command: u16, payload: &[u8]) -> Vec<u8> {
    let service_size = u8::try_from(payload.len()).unwrap_or(u8::MAX);
    let payload = &payload[..usize::from(service_size)];
    let size = u8::try_from(SERVICE_HEADER_LEN + payload.len()).unwrap_or(u8::MAX);

    let mut frame = Vec::with_capacity(PACKET_START + payload.len());
    frame.extend_from_slice(&[0, 0, size, 0]);
    frame.extend_from_slice(device.as_bytes());
    frame.push(service_size);
    frame.push(service_index);
    frame.extend_from_slice(&command.to_le_bytes());
    frame.extend_from_slice(payload);
    frame.truncate(FRAME_HEADER_LEN + usize::from(size));
    frame
}

/// Splits a byte stream into frames using the header size byte.
#[derive(Debug, Default)]
pub struct FrameSplitter {
    pending: Vec<u8>,
}

impl FrameSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return every frame completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.pending.extend_from_slice(chunk);
        let mut frames = Vec::new();
        loop {
            if self.pending.len() < FRAME_HEADER_LEN {
                break;
            }
            let total = FRAME_HEADER_LEN + usize::from(self.pending[2]);
            if self.pending.len() < total {
                break;
            }
            frames.push(self.pending.drain(..total).collect());
        }
        frames
    }

    /// Bytes received that do not yet form a full frame.
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }
}
