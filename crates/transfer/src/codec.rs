//! Segment payload codec.
//!
//! Binary transports carry segment bytes unchanged. Text-only transports get
//! standard base64 (RFC 4648 alphabet, `=` padding).

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Error returned by [`encode_code_points`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("code point {code_point:?} at index {index} does not represent a byte")]
    NotAByte { index: usize, code_point: char },
}

/// How segment payloads travel on the wire. Resolved once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecMode {
    /// Raw bytes in binary frames.
    Binary,
    /// Base64 text in text frames.
    Text,
}

impl CodecMode {
    /// Picks the payload mode from the transport's capabilities.
    pub fn negotiate(binary_frames: bool, force_text: bool) -> Self {
        if binary_frames && !force_text {
            Self::Binary
        } else {
            Self::Text
        }
    }

    /// Turns the bytes of one segment into its payload frame.
    pub fn encode_segment(self, bytes: Vec<u8>) -> Payload {
        match self {
            Self::Binary => Payload::Binary(bytes),
            Self::Text => Payload::Text(encode(&bytes)),
        }
    }
}

/// An encoded segment payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Binary(Vec<u8>),
    Text(String),
}

impl Payload {
    /// Size of the payload on the wire, in bytes.
    pub fn len(&self) -> usize {
        match self {
            Self::Binary(b) => b.len(),
            Self::Text(t) => t.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Base64-encodes a byte buffer.
pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Base64-encodes a string whose code points each stand for one byte
/// (U+0000..=U+00FF), as produced by latin-1 "binary string" readers.
///
/// Produces the same text as [`encode`] on the equivalent byte buffer.
pub fn encode_code_points(text: &str) -> Result<String, CodecError> {
    let bytes = text
        .chars()
        .enumerate()
        .map(|(index, code_point)| {
            u8::try_from(u32::from(code_point))
                .map_err(|_| CodecError::NotAByte { index, code_point })
        })
        .collect::<Result<Vec<u8>, _>>()?;
    Ok(encode(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_group_has_no_padding() {
        assert_eq!(encode(&[0, 0, 0]), "AAAA");
        assert_eq!(encode(b"Man"), "TWFu");
    }

    #[test]
    fn one_trailing_byte_gets_two_pads() {
        assert_eq!(encode(&[255]), "/w==");
        assert_eq!(encode(b"M"), "TQ==");
    }

    #[test]
    fn two_trailing_bytes_get_one_pad() {
        assert_eq!(encode(b"Ma"), "TWE=");
        assert_eq!(encode(&[0xfb, 0xff]), "+/8=");
    }

    #[test]
    fn empty_input() {
        assert_eq!(encode(&[]), "");
        assert_eq!(encode_code_points("").unwrap(), "");
    }

    #[test]
    fn matches_reference_decoder() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        for len in [0, 1, 2, 3, 4, 5, 6, 7, 254, 255, 256, 999, 1000] {
            let encoded = encode(&data[..len]);
            assert_eq!(encoded.len(), len.div_ceil(3) * 4);
            let decoded = STANDARD.decode(&encoded).unwrap();
            assert_eq!(decoded, &data[..len], "length {len}");
        }
    }

    #[test]
    fn segments_of_three_byte_multiples_concatenate() {
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let joined: String = data.chunks(999).map(encode).collect();
        assert_eq!(joined, encode(&data));
        assert_eq!(STANDARD.decode(joined).unwrap(), data);
    }

    #[test]
    fn code_points_match_bytes() {
        let bytes: Vec<u8> = (0..=255u8).rev().collect();
        let text: String = bytes.iter().map(|&b| char::from(b)).collect();
        assert_eq!(encode_code_points(&text).unwrap(), encode(&bytes));
    }

    #[test]
    fn code_points_above_latin1_are_rejected() {
        assert_eq!(
            encode_code_points("ab\u{0100}"),
            Err(CodecError::NotAByte {
                index: 2,
                code_point: '\u{0100}'
            })
        );
    }

    #[test]
    fn negotiation() {
        assert_eq!(CodecMode::negotiate(true, false), CodecMode::Binary);
        assert_eq!(CodecMode::negotiate(true, true), CodecMode::Text);
        assert_eq!(CodecMode::negotiate(false, false), CodecMode::Text);
    }

    #[test]
    fn segment_payloads() {
        assert_eq!(
            CodecMode::Binary.encode_segment(vec![1, 2, 3]),
            Payload::Binary(vec![1, 2, 3])
        );
        let text = CodecMode::Text.encode_segment(vec![0, 0, 0]);
        assert_eq!(text, Payload::Text("AAAA".into()));
        assert_eq!(text.len(), 4);
    }
}
