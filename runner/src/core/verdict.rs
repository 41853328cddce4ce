//! Recognition of the verdict signal a test program emits when it finishes.
//!
//! A running program reports completion through its asynchronous fault event:
//! service index 2, an event command (high bit set) whose low byte is the
//! panic opcode, and a one-byte result code right after the command word. A
//! verdict packet cut short before the code byte reads as code 0.

use std::fmt;

use crate::core::device_id::DeviceId;
use crate::core::frame::Frame;

pub const VERDICT_SERVICE_INDEX: u8 = 2;
pub const EVENT_FLAG: u16 = 0x8000;
pub const PANIC_EVENT_CODE: u8 = 0x80;

/// Outcome reported by the program under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Pass,
    /// Program reported a non-zero panic code.
    Fail { code: u8 },
}

impl Verdict {
    pub fn from_code(code: u8) -> Self {
        if code == 0 {
            Verdict::Pass
        } else {
            Verdict::Fail { code }
        }
    }

    pub fn passed(&self) -> bool {
        matches!(self, Verdict::Pass)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => f.write_str("test OK"),
            Verdict::Fail { code } => write!(f, "test failed (code {code})"),
        }
    }
}

/// Interpret a raw frame emitted by the session owning `device`.
///
/// Returns `None` for frames from other devices and non-verdict packets.
pub fn verdict_signal(bytes: &[u8], device: &DeviceId) -> Option<Verdict> {
    let frame = Frame::parse(bytes)?;
    if !frame.is_from(device) {
        return None;
    }
    if !is_verdict_command(frame.service_index(), frame.service_command()) {
        return None;
    }
    let code = frame.payload().first().copied().unwrap_or(0);
    Some(Verdict::from_code(code))
}

fn is_verdict_command(service_index: u8, command: u16) -> bool {
    service_index == VERDICT_SERVICE_INDEX
        && command & EVENT_FLAG != 0
        && (command & 0xff) as u8 == PANIC_EVENT_CODE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::frame::encode_frame;

    fn device() -> DeviceId {
        DeviceId::parse("12abdd2289421234")
    }

    #[test]
    fn zero_code_is_pass() {
        let frame = encode_frame(&device(), 2, 0x8080, &[0]);
        assert_eq!(verdict_signal(&frame, &device()), Some(Verdict::Pass));
    }

    #[test]
    fn nonzero_code_is_fail() {
        let frame = encode_frame(&device(), 2, 0x8080, &[3]);
        assert_eq!(
            verdict_signal(&frame, &device()),
            Some(Verdict::Fail { code: 3 })
        );
    }

    #[test]
    fn other_event_bits_in_high_byte_are_accepted() {
        let frame = encode_frame(&device(), 2, 0x9280, &[0]);
        assert_eq!(verdict_signal(&frame, &device()), Some(Verdict::Pass));
    }

    #[test]
    fn foreign_device_is_ignored() {
        let frame = encode_frame(&DeviceId::parse("0000000000000001"), 2, 0x8080, &[0]);
        assert_eq!(verdict_signal(&frame, &device()), None);
    }

    #[test]
    fn non_verdict_packets_are_ignored() {
        // wrong service index
        let frame = encode_frame(&device(), 1, 0x8080, &[0]);
        assert_eq!(verdict_signal(&frame, &device()), None);
        // not an event
        let frame = encode_frame(&device(), 2, 0x0080, &[0]);
        assert_eq!(verdict_signal(&frame, &device()), None);
        // different event code
        let frame = encode_frame(&device(), 2, 0x8081, &[0]);
        assert_eq!(verdict_signal(&frame, &device()), None);
    }

    #[test]
    fn verdict_without_result_byte_passes() {
        let frame = encode_frame(&device(), 2, 0x8080, &[]);
        assert_eq!(verdict_signal(&frame, &device()), Some(Verdict::Pass));
    }

    #[test]
    fn display_distinguishes_outcomes() {
        assert_eq!(Verdict::Pass.to_string(), "test OK");
        assert_eq!(Verdict::Fail { code: 3 }.to_string(), "test failed (code 3)");
    }
}
