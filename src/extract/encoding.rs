//! Character encoding detection for text formats.
//!
//! Order of evidence:
//! 1. a byte-order mark (UTF-8, UTF-16 LE/BE)
//! 2. valid UTF-8
//! 3. a `chardetng` guess for legacy code pages (Windows-1252, Latin-1, …)
//!
//! Without a BOM, NUL bytes or a decoded result full of control characters
//! mean the bytes are not text at all.

use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use std::borrow::Cow;
use tracing::debug;

/// How much of the content is scanned for NUL bytes before calling it text.
const NUL_SNIFF_WINDOW: usize = 8192;

/// Decode `bytes` to text, or `None` when they are not text in any
/// supported encoding. A BOM is never part of the result.
pub(crate) fn decode(bytes: &[u8]) -> Option<Cow<'_, str>> {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        debug!("{} byte-order mark", encoding.name());
        return encoding.decode_without_bom_handling_and_without_replacement(&bytes[bom_len..]);
    }

    if bytes[..bytes.len().min(NUL_SNIFF_WINDOW)].contains(&0) {
        return None;
    }

    if let Ok(text) = std::str::from_utf8(bytes) {
        return Some(Cow::Borrowed(text));
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let encoding = detector.guess(None, true);
    let text = encoding.decode_without_bom_handling_and_without_replacement(bytes)?;
    if mostly_controls(&text) {
        return None;
    }
    debug!("Decoded legacy text as {}", encoding.name());
    Some(text)
}

/// Single-byte code pages map nearly every byte to something; binary data
/// shows up as a high share of control characters.
fn mostly_controls(text: &str) -> bool {
    let mut total = 0usize;
    let mut controls = 0usize;
    for c in text.chars() {
        total += 1;
        if c.is_control() && !matches!(c, '\n' | '\r' | '\t' | '\u{0C}') {
            controls += 1;
        }
    }
    controls * 50 > total
}

#[cfg(test)]
mod tests {
    use super::*;

    fn utf16(text: &str, big_endian: bool) -> Vec<u8> {
        let mut out = if big_endian {
            vec![0xFE, 0xFF]
        } else {
            vec![0xFF, 0xFE]
        };
        for unit in text.encode_utf16() {
            let pair = if big_endian {
                unit.to_be_bytes()
            } else {
                unit.to_le_bytes()
            };
            out.extend_from_slice(&pair);
        }
        out
    }

    #[test]
    fn utf8_is_borrowed_and_bom_dropped() {
        assert!(matches!(decode(b"plain words"), Some(Cow::Borrowed("plain words"))));
        assert_eq!(decode(b"\xEF\xBB\xBFwith bom").as_deref(), Some("with bom"));
    }

    #[test]
    fn utf16_with_bom() {
        assert_eq!(decode(&utf16("Hello world.", false)).as_deref(), Some("Hello world."));
        assert_eq!(decode(&utf16("Grüße, Welt", true)).as_deref(), Some("Grüße, Welt"));
    }

    #[test]
    fn windows_1252_text() {
        let bytes =
            b"Caf\xe9 menu\n\nCr\xe8me br\xfbl\xe9e, cr\xeapes et g\xe2teau \xe0 la fran\xe7aise.";
        let text = decode(bytes).unwrap();
        assert!(text.starts_with("Café menu"), "{text}");
        assert!(text.contains("Crème brûlée"), "{text}");
    }

    #[test]
    fn binary_is_not_text() {
        assert!(decode(&[0x89, 0x01, 0x00, 0x7F, 0x02]).is_none());
        let noise: Vec<u8> = (1u8..=31).cycle().take(400).chain([0xC3, 0x28]).collect();
        assert!(decode(&noise).is_none());
    }
}
