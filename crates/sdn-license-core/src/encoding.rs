//! Decoding of 32-byte keys from text.
//!
//! Keys arrive as hex or as any of the four common base64 alphabets. The
//! accepted encodings are an explicit, ordered list of [`KeyDecoder`]s; the
//! first one that yields exactly 32 bytes wins. Nothing else is guessed.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use zeroize::Zeroizing;

use crate::error::CoreError;

/// One way of turning text into bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDecoder {
    /// Hex, with an optional `0x` prefix.
    Hex,
    /// Standard alphabet, no padding.
    StandardNoPad,
    /// Standard alphabet, padded.
    Standard,
    /// URL-safe alphabet, no padding.
    UrlSafeNoPad,
    /// URL-safe alphabet, padded.
    UrlSafe,
}

/// The order keys are decoded in unless a caller says otherwise.
pub const DEFAULT_KEY_DECODERS: &[KeyDecoder] = &[
    KeyDecoder::Hex,
    KeyDecoder::StandardNoPad,
    KeyDecoder::Standard,
    KeyDecoder::UrlSafeNoPad,
    KeyDecoder::UrlSafe,
];

impl KeyDecoder {
    /// Decode `input`, returning `None` if it is not valid for this encoding.
    pub fn decode(self, input: &str) -> Option<Zeroizing<Vec<u8>>> {
        let decoded = match self {
            KeyDecoder::Hex => hex::decode(strip_hex_prefix(input)).ok(),
            KeyDecoder::StandardNoPad => STANDARD_NO_PAD.decode(input).ok(),
            KeyDecoder::Standard => STANDARD.decode(input).ok(),
            KeyDecoder::UrlSafeNoPad => URL_SAFE_NO_PAD.decode(input).ok(),
            KeyDecoder::UrlSafe => URL_SAFE.decode(input).ok(),
        };
        decoded.map(Zeroizing::new)
    }

    pub fn name(self) -> &'static str {
        match self {
            KeyDecoder::Hex => "hex",
            KeyDecoder::StandardNoPad => "base64-std-nopad",
            KeyDecoder::Standard => "base64-std",
            KeyDecoder::UrlSafeNoPad => "base64-url-nopad",
            KeyDecoder::UrlSafe => "base64-url",
        }
    }
}

/// Remove a leading `0x` from a hex string.
pub fn strip_hex_prefix(input: &str) -> &str {
    input.strip_prefix("0x").unwrap_or(input)
}

/// Decode a 32-byte key using `decoders` in order.
///
/// The input is trimmed first. The result is zeroized on drop because the
/// same helper reads symmetric bundle keys.
pub fn decode_key32(input: &str, decoders: &[KeyDecoder]) -> Result<Zeroizing<[u8; 32]>, CoreError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CoreError::KeyDecoding("key is empty".into()));
    }

    for decoder in decoders {
        if let Some(bytes) = decoder.decode(trimmed) {
            if bytes.len() == 32 {
                let mut key = Zeroizing::new([0u8; 32]);
                key.copy_from_slice(&bytes);
                return Ok(key);
            }
        }
    }

    Err(CoreError::KeyDecoding(
        "key must decode to exactly 32 bytes (hex or base64)".into(),
    ))
}

/// Decode hex (optional `0x`) into exactly `N` bytes.
pub fn decode_hex_exact<const N: usize>(input: &str) -> Result<[u8; N], CoreError> {
    let bytes = hex::decode(strip_hex_prefix(input.trim()))
        .map_err(|e| CoreError::KeyDecoding(e.to_string()))?;
    bytes
        .as_slice()
        .try_into()
        .map_err(|_| CoreError::InvalidKeyLength {
            expected: N,
            got: bytes.len(),
        })
}
