//! Text-string encode/decode helpers.
//!
//! PDF "text strings" (as opposed to byte strings used for binary data) are
//! either PDFDocEncoding or UTF-16BE with a leading BOM. Names and ordinary
//! byte strings are untouched arbitrary bytes and never go through here.

use encoding_rs::UTF_16BE;

const UTF16_BOM: [u8; 2] = [0xFE, 0xFF];

/// Encode a Rust string as a PDF text string: PDFDocEncoding if every
/// character is representable in it, UTF-16BE with a BOM otherwise.
pub fn encode_text_string(s: &str) -> Vec<u8> {
    if let Some(encoded) = try_pdf_doc_encode(s) {
        return encoded;
    }
    let (encoded, _, _) = UTF_16BE.encode(s);
    let mut out = Vec::with_capacity(encoded.len() + 2);
    out.extend_from_slice(&UTF16_BOM);
    out.extend_from_slice(&encoded);
    out
}

/// Decode bytes previously produced by a PDF text string field.
pub fn decode_text_string(bytes: &[u8]) -> String {
    if bytes.starts_with(&UTF16_BOM) {
        let (decoded, _, _) = UTF_16BE.decode(&bytes[2..]);
        decoded.into_owned()
    } else {
        decode_pdf_doc(bytes)
    }
}

/// PDFDocEncoding is ASCII-transparent for 0x20..=0x7E; outside that it only
/// covers a fixed table of Latin-1-like code points. We accept the common
/// case (pure printable ASCII plus `\n`/`\r`/`\t`) and fall back to `None`
/// for anything else so the caller uses UTF-16BE instead.
fn try_pdf_doc_encode(s: &str) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(s.len());
    for c in s.chars() {
        let b = c as u32;
        if b == 0x09 || b == 0x0A || b == 0x0D || (0x20..=0x7E).contains(&b) {
            out.push(b as u8);
        } else {
            return None;
        }
    }
    Some(out)
}

fn decode_pdf_doc(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_round_trips_as_pdf_doc_encoding() {
        let s = "Hello, world!";
        let encoded = encode_text_string(s);
        assert_eq!(encoded, s.as_bytes());
        assert_eq!(decode_text_string(&encoded), s);
    }

    #[test]
    fn non_ascii_uses_utf16_with_bom() {
        let s = "caf\u{e9} \u{1F600}";
        let encoded = encode_text_string(s);
        assert_eq!(&encoded[..2], &UTF16_BOM);
        assert_eq!(decode_text_string(&encoded), s);
    }
}
