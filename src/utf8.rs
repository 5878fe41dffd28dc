//! Streaming UTF-8 validation for text frame payloads and close reasons.
//!
//! This is a small table-driven DFA in the style described by Bjoern
//! Hoehrmann ("Flexible and Economical UTF-8 Decoder"): each state
//! transition consumes one byte and the automaton accepts iff it ends in
//! the start state. It is used incrementally across frame fragments, which
//! a one-shot `str::from_utf8` check cannot do — a multi-byte codepoint can
//! be split across two fragments and must still validate as the fragments
//! arrive, per `websocketpp::message::utf8_message`.

const UTF8_ACCEPT: u8 = 0;
const UTF8_REJECT: u8 = 12;

#[rustfmt::skip]
const TRANSITION_TABLE: [u8; 256] = [
    // The byte class lookup: maps each of the 256 byte values to one of 12
    // character classes.
    0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0, 0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,
    0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0, 0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,
    0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0, 0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,
    0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0, 0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,0,
    1,1,1,1,1,1,1,1,1,1,1,1,1,1,1,1, 9,9,9,9,9,9,9,9,9,9,9,9,9,9,9,9,
    7,7,7,7,7,7,7,7,7,7,7,7,7,7,7,7, 7,7,7,7,7,7,7,7,7,7,7,7,7,7,7,7,
    8,8,2,2,2,2,2,2,2,2,2,2,2,2,2,2, 2,2,2,2,2,2,2,2,2,2,2,2,2,2,2,2,
    10,3,3,3,3,3,3,3,3,3,3,3,3,4,3,3, 11,6,6,6,5,8,8,8,8,8,8,8,8,8,8,8,
];

#[rustfmt::skip]
const STATE_TABLE: [u8; 108] = [
    0,12,24,36,60,96,84,12,12,12,48,72,
    12,0,12,12,12,12,12,0,12,0,12,12,
    12,24,12,12,12,12,12,24,12,24,12,12,
    12,12,12,12,12,12,12,24,12,12,12,12,
    12,24,12,12,12,12,12,12,12,24,12,12,
    12,12,12,12,12,12,12,12,12,12,12,12,
    12,36,12,12,12,12,12,36,12,36,12,12,
    12,36,12,12,12,12,12,12,12,12,12,12,
    12,36,12,12,12,12,12,12,12,12,12,12,
];

fn decode_step(state: u8, byte: u8) -> u8 {
    let class = TRANSITION_TABLE[byte as usize];
    STATE_TABLE[(state + class) as usize]
}

/// A streaming UTF-8 validator.
///
/// Feed bytes one at a time with [`consume`](Utf8Validator::consume); it
/// returns `false` as soon as the sequence can no longer be a valid UTF-8
/// prefix. After the last byte, [`complete`](Utf8Validator::complete) tells
/// you whether the sequence ended mid-codepoint (which is only acceptable
/// when more fragments are still coming).
#[derive(Debug, Clone, Default)]
pub struct Utf8Validator {
    state: u8,
    failed: bool,
}

impl Utf8Validator {
    pub fn new() -> Self {
        Self {
            state: UTF8_ACCEPT,
            failed: false,
        }
    }

    /// Feeds one byte into the automaton. Returns `true` if the sequence
    /// consumed so far is still a valid UTF-8 prefix.
    pub fn consume(&mut self, byte: u8) -> bool {
        if self.failed {
            return false;
        }
        self.state = decode_step(self.state, byte);
        if self.state == UTF8_REJECT {
            self.failed = true;
            return false;
        }
        true
    }

    /// Feeds a whole byte slice, short-circuiting on the first invalid byte.
    pub fn consume_slice(&mut self, bytes: &[u8]) -> bool {
        for &b in bytes {
            if !self.consume(b) {
                return false;
            }
        }
        true
    }

    /// Whether the sequence consumed so far ends on a codepoint boundary,
    /// i.e. is not waiting for continuation bytes.
    pub fn complete(&self) -> bool {
        !self.failed && self.state == UTF8_ACCEPT
    }

    /// Resets the validator to its initial state for reuse on a new message.
    pub fn reset(&mut self) {
        self.state = UTF8_ACCEPT;
        self.failed = false;
    }
}

/// One-shot validation helper for a complete, non-fragmented buffer.
pub fn is_valid_utf8(bytes: &[u8]) -> bool {
    let mut v = Utf8Validator::new();
    v.consume_slice(bytes) && v.complete()
}
