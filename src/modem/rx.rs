//! Inbound payload extraction from the AT stream
//!
//! The module delivers socket data as unsolicited notifications
//! `+MIPRTCP:<id>,<len>,<data>` interleaved with ordinary responses. The
//! assembler classifies every byte: payload bytes are returned to the caller,
//! everything else is left for the response matcher.

/// Notification marker preceding inbound socket data
pub const MARKER: &[u8] = b"+MIPRTCP:";

/// Length digits kept before further digits are ignored
const MAX_LEN_DIGITS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Scanning for the marker
    Search,
    /// Skipping the channel id up to the first comma
    SkipId,
    /// Collecting length digits up to the second comma
    ReadLen,
    /// Passing payload bytes through
    ReadData,
}

/// Byte-at-a-time `+MIPRTCP:` demultiplexer
#[derive(Debug, Clone)]
pub struct RxAssembler {
    phase: Phase,
    matched: usize,
    digits: [u8; MAX_LEN_DIGITS],
    digit_count: usize,
    remaining: usize,
}

impl Default for RxAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl RxAssembler {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            phase: Phase::Search,
            matched: 0,
            digits: [0; MAX_LEN_DIGITS],
            digit_count: 0,
            remaining: 0,
        }
    }

    /// Return to the initial search state, dropping any partial match
    pub const fn reset(&mut self) {
        *self = Self::new();
    }

    /// True when no notification is partially parsed
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.phase == Phase::Search && self.matched == 0
    }

    /// Payload bytes still expected for the current notification
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.remaining
    }

    /// Feed one byte; returns it back if it is payload
    pub fn feed(&mut self, byte: u8) -> Option<u8> {
        match self.phase {
            Phase::Search => {
                if byte == MARKER[self.matched] {
                    self.matched += 1;
                    if self.matched == MARKER.len() {
                        self.phase = Phase::SkipId;
                        self.matched = 0;
                    }
                } else {
                    // The failing byte may itself start a new marker
                    self.matched = usize::from(byte == MARKER[0]);
                }
                None
            }
            Phase::SkipId => {
                if byte == b',' {
                    self.phase = Phase::ReadLen;
                    self.digit_count = 0;
                }
                None
            }
            Phase::ReadLen => {
                if byte == b',' {
                    self.remaining = self.parse_len();
                    self.phase = if self.remaining > 0 {
                        Phase::ReadData
                    } else {
                        Phase::Search
                    };
                } else if byte.is_ascii_digit() && self.digit_count < MAX_LEN_DIGITS {
                    self.digits[self.digit_count] = byte;
                    self.digit_count += 1;
                }
                None
            }
            Phase::ReadData => {
                self.remaining -= 1;
                if self.remaining == 0 {
                    self.phase = Phase::Search;
                    self.matched = 0;
                }
                Some(byte)
            }
        }
    }

    fn parse_len(&self) -> usize {
        let value = self.digits[..self.digit_count]
            .iter()
            .fold(0u64, |acc, d| acc * 10 + u64::from(d - b'0'));
        usize::try_from(value).unwrap_or(usize::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload_of(asm: &mut RxAssembler, input: &[u8]) -> Vec<u8> {
        input.iter().filter_map(|&b| asm.feed(b)).collect()
    }

    #[test]
    fn test_single_notification() {
        let mut asm = RxAssembler::new();
        let out = payload_of(&mut asm, b"\r\n+MIPRTCP: 1,4,wxyz\r\nOK\r\n");

        assert_eq!(out, b"wxyz");
        assert!(asm.is_idle());
    }

    #[test]
    fn test_zero_length_notification_is_skipped() {
        let mut asm = RxAssembler::new();
        let mut input = Vec::new();
        input.extend_from_slice(b"+MIPRTCP:1,3,");
        input.extend_from_slice(&[0xAA, b'+', 0x00]);
        input.extend_from_slice(b"+MIPRTCP:1,0,");
        input.extend_from_slice(b"+MIPRTCP:1,2,");
        input.extend_from_slice(&[b',', 0xFF]);

        let out = payload_of(&mut asm, &input);

        assert_eq!(out, vec![0xAA, b'+', 0x00, b',', 0xFF]);
        assert!(asm.is_idle());
    }

    #[test]
    fn test_marker_restart_on_repeated_plus() {
        let mut asm = RxAssembler::new();
        // "++MIPRTCP:" must still match: the second '+' restarts the match
        let out = payload_of(&mut asm, b"++MIPRTCP:1,1,Q");
        assert_eq!(out, b"Q");

        let mut asm = RxAssembler::new();
        let out = payload_of(&mut asm, b"+MIP+MIPRTCP:1,2,ok");
        assert_eq!(out, b"ok");
    }

    #[test]
    fn test_payload_may_contain_marker_text() {
        let mut asm = RxAssembler::new();
        let out = payload_of(&mut asm, b"+MIPRTCP:1,9,+MIPRTCP:");
        assert_eq!(out, b"+MIPRTCP:");
        assert!(asm.is_idle());
    }

    #[test]
    fn test_length_ignores_spaces_and_caps_digits() {
        let mut asm = RxAssembler::new();
        let out = payload_of(&mut asm, b"+MIPRTCP: 1, 3,abc");
        assert_eq!(out, b"abc");

        let mut asm = RxAssembler::new();
        payload_of(&mut asm, b"+MIPRTCP:1,123456789012345,");
        assert_eq!(asm.remaining(), 1_234_567_890);
    }

    #[test]
    fn test_ordinary_responses_are_not_payload() {
        let mut asm = RxAssembler::new();
        let out = payload_of(&mut asm, b"AT\r\r\nOK\r\n+MIPOPEN: 1,1\r\n+MIPCALL: 1,10.0.0.2\r\n");
        assert!(out.is_empty());
        assert!(asm.is_idle());
    }

    #[test]
    fn test_reset_drops_partial_state() {
        let mut asm = RxAssembler::new();
        payload_of(&mut asm, b"+MIPRTCP:1,50,ab");
        assert_eq!(asm.remaining(), 48);

        asm.reset();
        assert!(asm.is_idle());
        let out = payload_of(&mut asm, b"+MIPRTCP:1,2,hi");
        assert_eq!(out, b"hi");
    }
}
