//! Signing-assistance primitives: byte-addressable placeholder management
//! for `/ByteRange` and `/Contents` inside an as-yet-unsigned signature
//! dictionary. These have no notion of CMS/CAdES structure — they only find,
//! size, and patch byte ranges.

use crate::bytes::Scanner;
use crate::error::{Error, Result};

/// `[0 0000000000 0000000000 0000000000]` — fixed width so a later patch
/// never changes the file's length.
pub fn create_byte_range_placeholder() -> Vec<u8> {
    b"[0 0000000000 0000000000 0000000000]".to_vec()
}

pub const DEFAULT_ESTIMATED_SIGNATURE_SIZE: usize = 16 * 1024;

/// A hex-string placeholder of `2 * estimated_size` zero digits.
pub fn create_contents_placeholder(estimated_size: usize) -> Vec<u8> {
    let digit_count = estimated_size * 2;
    let mut out = Vec::with_capacity(digit_count + 2);
    out.push(b'<');
    out.resize(out.len() + digit_count, b'0');
    out.push(b'>');
    out
}

/// Byte offsets (within the serialized document) of the unmatched
/// `/ByteRange` and `/Contents` placeholders.
#[derive(Debug, Clone, Copy)]
pub struct PlaceholderLocations {
    pub byte_range_start: usize,
    pub byte_range_end: usize,
    pub contents_start: usize,
    pub contents_end: usize,
}

pub fn find_placeholders(bytes: &[u8]) -> Result<PlaceholderLocations> {
    let (byte_range_start, byte_range_end) = find_delimited_value(bytes, b"/ByteRange", b'[', b']')?;
    let (contents_start, contents_end) = find_delimited_value(bytes, b"/Contents", b'<', b'>')?;
    Ok(PlaceholderLocations { byte_range_start, byte_range_end, contents_start, contents_end })
}

/// Locate the `open`/`close`-delimited value following each occurrence of
/// `marker`. When more than one is found the one with the highest file
/// offset (the most recently appended) wins; two candidates tied at the same
/// offset is a genuine ambiguity.
fn find_delimited_value(bytes: &[u8], marker: &[u8], open: u8, close: u8) -> Result<(usize, usize)> {
    let occurrences = Scanner::find_all(bytes, marker);
    if occurrences.is_empty() {
        return Err(Error::PlaceholderNotFound("marker not found"));
    }

    let mut spans = Vec::new();
    for start in occurrences {
        let mut pos = start + marker.len();
        while pos < bytes.len() && bytes[pos] != open && bytes[pos] != close {
            pos += 1;
        }
        if pos >= bytes.len() || bytes[pos] != open {
            continue;
        }
        let open_pos = pos;
        if let Some(rel) = bytes[open_pos + 1..].iter().position(|&b| b == close) {
            spans.push((open_pos, open_pos + 1 + rel + 1));
        }
    }

    match spans.len() {
        0 => Err(Error::PlaceholderNotFound("marker found but no delimited value followed it")),
        _ => {
            let max_start = spans.iter().map(|(s, _)| *s).max().unwrap();
            let winners: Vec<_> = spans.iter().filter(|(s, _)| *s == max_start).collect();
            if winners.len() > 1 {
                return Err(Error::AmbiguousPlaceholder);
            }
            Ok(*winners[0])
        }
    }
}

/// The four `/ByteRange` integers: `(0, offsetOfContentsOpen,
/// offsetAfterContentsClose, lengthFromThereToEnd)`.
pub fn calculate_byte_range(bytes: &[u8], locations: &PlaceholderLocations) -> [u64; 4] {
    let first_length = locations.contents_start as u64;
    let second_start = locations.contents_end as u64;
    let second_length = bytes.len() as u64 - second_start;
    [0, first_length, second_start, second_length]
}

/// Overwrite the `/ByteRange` placeholder in place with `range`, left-padded
/// to exactly fill the original placeholder's width.
pub fn patch_byte_range(bytes: &mut [u8], locations: &PlaceholderLocations, range: [u64; 4]) -> Result<()> {
    let original_len = locations.byte_range_end - locations.byte_range_start;
    let formatted = format!("[0 {:010} {:010} {:010}]", range[1], range[2], range[3]);
    if formatted.len() != original_len {
        return Err(Error::PlaceholderNotFound("ByteRange placeholder width does not match the expected fixed format"));
    }
    bytes[locations.byte_range_start..locations.byte_range_end].copy_from_slice(formatted.as_bytes());
    Ok(())
}

/// Overwrite the `/Contents` placeholder with `signature_der` hex-encoded,
/// zero-padded on the right to the placeholder's original length.
pub fn patch_contents(bytes: &mut [u8], locations: &PlaceholderLocations, signature_der: &[u8]) -> Result<()> {
    let interior_len = locations.contents_end - locations.contents_start - 2;
    let hex_len = signature_der.len() * 2;
    if hex_len > interior_len {
        return Err(Error::PlaceholderNotFound("signature is larger than the reserved /Contents placeholder"));
    }

    let mut interior = String::with_capacity(interior_len);
    for byte in signature_der {
        interior.push_str(&format!("{byte:02X}"));
    }
    interior.push_str(&"0".repeat(interior_len - hex_len));

    bytes[locations.contents_start + 1..locations.contents_end - 1].copy_from_slice(interior.as_bytes());
    Ok(())
}

/// The concatenation of `bytes[0..contentsOpen) || bytes[contentsClose..end)`
/// as named by `range`, ready for external hashing/signing.
pub fn extract_signed_bytes(bytes: &[u8], range: [u64; 4]) -> Vec<u8> {
    let mut out = Vec::with_capacity((range[1] + range[3]) as usize);
    out.extend_from_slice(&bytes[range[0] as usize..(range[0] + range[1]) as usize]);
    out.extend_from_slice(&bytes[range[2] as usize..(range[2] + range[3]) as usize]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn placeholder_patching_round_trip() {
        let mut doc = b"<< /ByteRange ".to_vec();
        doc.extend_from_slice(&create_byte_range_placeholder());
        doc.extend_from_slice(b" /Contents ");
        doc.extend_from_slice(&create_contents_placeholder(4));
        doc.extend_from_slice(b" >>");

        let original_len = doc.len();
        let locations = find_placeholders(&doc).unwrap();
        let range = calculate_byte_range(&doc, &locations);
        patch_byte_range(&mut doc, &locations, range).unwrap();
        patch_contents(&mut doc, &locations, &[0xDE, 0xAD, 0xBE, 0xEF]).unwrap();

        assert_eq!(doc.len(), original_len);
        let signed = extract_signed_bytes(&doc, range);
        assert!(!signed.is_empty());
        let contents_slice = &doc[locations.contents_start + 1..locations.contents_start + 9];
        assert_eq!(contents_slice, b"DEADBEEF");
    }

    #[test]
    fn missing_marker_errors() {
        assert!(find_placeholders(b"<< /Root 1 0 R >>").is_err());
    }
}
