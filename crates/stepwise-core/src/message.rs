//! Fixed-width uplink payload codec
//!
//! Packs up to three named readings into a 12-byte frame, the largest
//! payload the uplink network accepts.
//!
//! ## Field Layout
//!
//! ```text
//! ┌──────────────────────────┬──────────────────────────┐
//! │  Name (2B, LE)           │  Value (2B, LE)          │   x 3 max
//! └──────────────────────────┴──────────────────────────┘
//!
//! Name word:  [x][ c0 (5b) ][ c1 (5b) ][ c2 (5b) ]
//!             a-z -> 1..26, 0-4 -> 27..31, other -> 0
//! Value word: reading x 10 as i16, or 3 letters packed like a name
//! ```

use byteorder::{ByteOrder, LittleEndian};
use std::fmt;
use thiserror::Error;

/// Largest frame the uplink accepts
pub const MAX_MESSAGE_BYTES: usize = 12;

/// Bytes taken by one field (name word + value word)
pub const FIELD_BYTES: usize = 4;

/// Letters kept per name
pub const NAME_LETTERS: usize = 3;

const FIRST_LETTER: u8 = 1;
const FIRST_DIGIT: u8 = 27;

/// Codec errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    /// Adding a field would exceed the frame width
    #[error("message too long, already {used} bytes")]
    MessageFull {
        /// Bytes already encoded
        used: usize,
    },

    /// Nothing to send
    #[error("nothing to send")]
    Empty,

    /// Frame length is not a whole number of fields
    #[error("frame of {0} bytes is not a whole number of 4-byte fields")]
    Truncated(usize),

    /// Frame longer than the uplink allows
    #[error("frame of {0} bytes exceeds the 12-byte limit")]
    TooLong(usize),

    /// Hex text could not be parsed
    #[error("invalid hex: {0}")]
    InvalidHex(String),
}

/// Result type alias for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

fn encode_letter(ch: char) -> u8 {
    let ch = ch.to_ascii_lowercase();
    match ch {
        'a'..='z' => ch as u8 - b'a' + FIRST_LETTER,
        '0'..='4' => ch as u8 - b'0' + FIRST_DIGIT,
        _ => 0,
    }
}

fn decode_letter(code: u8) -> Option<char> {
    match code {
        0 => None,
        c if c < FIRST_DIGIT => Some((c - FIRST_LETTER + b'a') as char),
        c => Some((c - FIRST_DIGIT + b'0') as char),
    }
}

/// Pack up to three characters into a 15-bit word
pub fn pack_name(name: &str) -> u16 {
    let mut codes = [0u8; NAME_LETTERS];
    for (slot, ch) in codes.iter_mut().zip(name.chars()) {
        *slot = encode_letter(ch);
    }
    ((codes[0] as u16) << 10) | ((codes[1] as u16) << 5) | codes[2] as u16
}

/// Unpack a name word; unencodable positions are skipped
pub fn unpack_name(word: u16) -> String {
    [(word >> 10) & 31, (word >> 5) & 31, word & 31]
        .iter()
        .filter_map(|&code| decode_letter(code as u8))
        .collect()
}

/// An uplink payload under construction
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    bytes: Vec<u8>,
}

impl Message {
    /// Create an empty message
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a reading with one decimal place (stored x 10)
    pub fn add_number(&mut self, name: &str, value: f64) -> CodecResult<&mut Self> {
        self.add_scaled(name, (value * 10.0) as i16)
    }

    /// Add a value that is already scaled by 10
    pub fn add_scaled(&mut self, name: &str, scaled: i16) -> CodecResult<&mut Self> {
        self.push_field(pack_name(name), scaled as u16)
    }

    /// Add a short text value (first three letters kept)
    pub fn add_text(&mut self, name: &str, value: &str) -> CodecResult<&mut Self> {
        self.push_field(pack_name(name), pack_name(value))
    }

    fn push_field(&mut self, name: u16, value: u16) -> CodecResult<&mut Self> {
        if self.bytes.len() + FIELD_BYTES > MAX_MESSAGE_BYTES {
            return Err(CodecError::MessageFull {
                used: self.bytes.len(),
            });
        }
        let mut field = [0u8; FIELD_BYTES];
        LittleEndian::write_u16(&mut field[0..2], name);
        LittleEndian::write_u16(&mut field[2..4], value);
        self.bytes.extend_from_slice(&field);
        Ok(self)
    }

    /// Encoded bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of encoded bytes
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Check for no fields
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Lowercase hex form handed to the transceiver
    pub fn to_hex(&self) -> String {
        to_hex(&self.bytes)
    }

    /// Final frame, refusing an empty or oversized one
    pub fn frame(&self) -> CodecResult<Vec<u8>> {
        if self.bytes.is_empty() {
            return Err(CodecError::Empty);
        }
        if self.bytes.len() > MAX_MESSAGE_BYTES {
            return Err(CodecError::TooLong(self.bytes.len()));
        }
        Ok(self.bytes.clone())
    }

    /// Build a message from `name=value` pairs separated by commas
    ///
    /// Values that parse as numbers become readings, anything else is text.
    pub fn parse_fields(text: &str) -> CodecResult<Self> {
        let mut message = Message::new();
        for pair in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            let value = value.trim();
            match value.parse::<f64>() {
                Ok(number) => message.add_number(name.trim(), number)?,
                Err(_) => message.add_text(name.trim(), value)?,
            };
        }
        Ok(message)
    }
}

/// A decoded field
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Field name
    pub name: String,
    /// Reading (scaled value / 10)
    pub value: f64,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\":{:.1}", self.name, self.value)
    }
}

/// Decode a frame into ordered fields
pub fn decode(frame: &[u8]) -> CodecResult<Vec<Field>> {
    if frame.len() > MAX_MESSAGE_BYTES {
        return Err(CodecError::TooLong(frame.len()));
    }
    if frame.len() % FIELD_BYTES != 0 {
        return Err(CodecError::Truncated(frame.len()));
    }
    Ok(frame
        .chunks_exact(FIELD_BYTES)
        .map(|chunk| Field {
            name: unpack_name(LittleEndian::read_u16(&chunk[0..2])),
            value: LittleEndian::read_i16(&chunk[2..4]) as f64 / 10.0,
        })
        .collect())
}

/// Decode the hex form of a frame
pub fn decode_hex(hex: &str) -> CodecResult<Vec<Field>> {
    decode(&from_hex(hex)?)
}

/// Render fields as a JSON-like object, e.g. `{"tmp":25.5,"hum":60.0}`
pub fn render(fields: &[Field]) -> String {
    let body: Vec<String> = fields.iter().map(Field::to_string).collect();
    format!("{{{}}}", body.join(","))
}

/// Lowercase hex encoding
pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Parse hex text (either case)
pub fn from_hex(hex: &str) -> CodecResult<Vec<u8>> {
    let hex = hex.trim();
    if hex.len() % 2 != 0 || !hex.is_ascii() {
        return Err(CodecError::InvalidHex(hex.to_string()));
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|_| CodecError::InvalidHex(hex.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_letter_codes() {
        assert_eq!(encode_letter('a'), 1);
        assert_eq!(encode_letter('Z'), 26);
        assert_eq!(encode_letter('0'), 27);
        assert_eq!(encode_letter('4'), 31);
        assert_eq!(encode_letter('5'), 0);
        assert_eq!(encode_letter('-'), 0);
        assert_eq!(decode_letter(27), Some('0'));
        assert_eq!(decode_letter(0), None);
    }

    #[test]
    fn test_pack_name() {
        // t=20, m=13, p=16
        assert_eq!(pack_name("tmp"), (20 << 10) | (13 << 5) | 16);
        assert_eq!(unpack_name(pack_name("TMP")), "tmp");
        assert_eq!(unpack_name(pack_name("temperature")), "tem");
        assert_eq!(unpack_name(pack_name("a")), "a");
    }

    #[test]
    fn test_number_field_bytes() {
        let mut msg = Message::new();
        msg.add_number("ctr", 1.0).unwrap();
        // value 10 little-endian
        assert_eq!(&msg.as_bytes()[2..4], &[0x0a, 0x00]);
        assert_eq!(msg.len(), 4);
    }

    #[test]
    fn test_message_full_after_three_fields() {
        let mut msg = Message::new();
        msg.add_number("tmp", 25.5).unwrap();
        msg.add_number("hum", 60.0).unwrap();
        msg.add_text("sta", "ok").unwrap();
        let err = msg.add_number("vlt", 3.3).unwrap_err();
        assert_eq!(err, CodecError::MessageFull { used: 12 });
        assert_eq!(msg.len(), MAX_MESSAGE_BYTES);
    }

    #[test]
    fn test_decode_readings() {
        let mut msg = Message::new();
        msg.add_number("tmp", 25.5).unwrap();
        msg.add_number("neg", -1.5).unwrap();
        let fields = decode_hex(&msg.to_hex()).unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].name, "tmp");
        assert!((fields[0].value - 25.5).abs() < 1e-9);
        assert!((fields[1].value + 1.5).abs() < 1e-9);
        assert_eq!(render(&fields), r#"{"tmp":25.5,"neg":-1.5}"#);
    }

    #[test]
    fn test_empty_message_refuses_frame() {
        assert_eq!(Message::new().frame(), Err(CodecError::Empty));
    }

    #[test]
    fn test_decode_rejects_bad_lengths() {
        assert_eq!(decode(&[1, 2, 3]), Err(CodecError::Truncated(3)));
        assert_eq!(decode(&[0; 16]), Err(CodecError::TooLong(16)));
        assert!(matches!(decode_hex("abc"), Err(CodecError::InvalidHex(_))));
        assert!(matches!(decode_hex("zz00"), Err(CodecError::InvalidHex(_))));
    }

    #[test]
    fn test_parse_fields() {
        let msg = Message::parse_fields("tmp=21.5, sta=ok").unwrap();
        assert_eq!(msg.len(), 8);
        let fields = decode(msg.as_bytes()).unwrap();
        assert_eq!(fields[0].name, "tmp");
        assert_eq!(fields[1].name, "sta");
        assert_eq!(LittleEndian::read_u16(&msg.as_bytes()[6..8]), pack_name("ok"));
    }
}
