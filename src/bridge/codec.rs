//! Byte-preserving transcoding for binary payloads.
//!
//! The bridge only carries text, so chunk bytes travel as a string with one
//! char per byte: byte `b` becomes the char whose code point is `b`
//! (U+0000..=U+00FF). Decoding is the exact inverse and rejects anything
//! outside that range. This is not a text encoding; never run payloads
//! through UTF-8 or any other charset conversion.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("code point U+{code_point:04X} at char {position} is not a byte")]
    OutOfRange { position: usize, code_point: u32 },
}

/// Transcode raw bytes into a bridge-safe string
pub fn encode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Recover the raw bytes from a transcoded string
pub fn decode(text: &str) -> Result<Vec<u8>, CodecError> {
    text.chars()
        .enumerate()
        .map(|(position, c)| {
            u8::try_from(u32::from(c)).map_err(|_| CodecError::OutOfRange {
                position,
                code_point: u32::from(c),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn every_byte_repeated(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 256) as u8).collect()
    }

    #[test]
    fn test_round_trip_all_byte_values() {
        for len in [0, 1, 255, 256, 257, 4096, 65535] {
            let bytes = every_byte_repeated(len);
            let encoded = encode(&bytes);
            assert_eq!(encoded.chars().count(), bytes.len());
            assert_eq!(decode(&encoded).unwrap(), bytes, "len = {len}");
        }
    }

    #[test]
    fn test_round_trip_through_json() {
        // What actually crosses the bridge is the JSON form of the string
        let bytes = every_byte_repeated(512);
        let json = serde_json::to_string(&encode(&bytes)).unwrap();
        let text: String = serde_json::from_str(&json).unwrap();
        assert_eq!(decode(&text).unwrap(), bytes);
    }

    #[test]
    fn test_high_bytes_are_not_utf8_interpreted() {
        // 0xC3 0xA9 is "é" in UTF-8; here it must stay two separate chars
        let encoded = encode(&[0xC3, 0xA9]);
        assert_eq!(encoded, "\u{00C3}\u{00A9}");
    }

    #[test]
    fn test_rejects_wide_chars() {
        let err = decode("ab\u{0100}").unwrap_err();
        assert_eq!(
            err,
            CodecError::OutOfRange {
                position: 2,
                code_point: 0x100
            }
        );
        assert!(decode("😀").is_err());
    }
}
