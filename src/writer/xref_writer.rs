//! Shared xref-section serialization: a classic table or an xref stream,
//! used by both the full-rewrite and incremental-update paths.

use crate::bytes::ByteWriter;
use crate::filters;
use crate::object::{Dictionary, Object};
use crate::xref::XrefEntry;

/// One contiguous subsection: `first` is the lowest object number in it,
/// `records` the entries for `first, first+1, ...` in order.
pub(super) struct XrefSection {
    pub first: u32,
    pub records: Vec<XrefEntry>,
}

/// Group an ascending, already-deduplicated id/entry list into subsections
/// of consecutive object numbers (classic xref's "first nEntries" header
/// only covers a contiguous run).
pub(super) fn group_into_sections(entries: Vec<(u32, XrefEntry)>) -> Vec<XrefSection> {
    let mut sections: Vec<XrefSection> = Vec::new();
    for (id, entry) in entries {
        match sections.last_mut() {
            Some(section) if section.first + section.records.len() as u32 == id => {
                section.records.push(entry);
            }
            _ => sections.push(XrefSection { first: id, records: vec![entry] }),
        }
    }
    sections
}

/// Emit a classic `xref` table: one `first nEntries` header per subsection
/// followed by that subsection's fixed 20-byte records.
pub(super) fn write_classic(writer: &mut ByteWriter, sections: &[XrefSection]) {
    writer.write_ascii("xref\n");
    for section in sections {
        writer.write_ascii(&format!("{} {}\n", section.first, section.records.len()));
        for entry in &section.records {
            match *entry {
                XrefEntry::Normal { offset, generation } => {
                    writer.write_ascii(&format!("{offset:010} {generation:05} n \n"));
                }
                XrefEntry::Free { next_free, generation } => {
                    writer.write_ascii(&format!("{next_free:010} {generation:05} f \n"));
                }
                XrefEntry::UnusableFree => {
                    writer.write_ascii(&format!("{:010} {:05} f \n", 0, 65535));
                }
                XrefEntry::Compressed { .. } => {
                    unreachable!("a compressed entry cannot appear in a classic xref table")
                }
            }
        }
    }
}

/// Build a circular free-entry linked list over `free_ids` (ascending): each
/// points at the next free object number, the last wraps back to 0 (the
/// list's head). Most readers never chase the chain, but writers following
/// the format produce one anyway.
pub(super) fn link_free_entries(free_ids: &[u32]) -> Vec<(u32, XrefEntry)> {
    free_ids
        .iter()
        .enumerate()
        .map(|(i, &id)| {
            let next = free_ids.get(i + 1).copied().unwrap_or(0);
            let generation = if id == 0 { 65535 } else { 0 };
            (id, XrefEntry::Free { next_free: next, generation })
        })
        .collect()
}

/// Minimum number of bytes needed to hold `value` in a big-endian field.
pub(super) fn bytes_needed(value: u64) -> usize {
    let mut n = 1usize;
    let mut v = value >> 8;
    while v > 0 {
        n += 1;
        v >>= 8;
    }
    n
}

fn write_field(out: &mut Vec<u8>, value: u64, width: usize) {
    for i in (0..width).rev() {
        out.push(((value >> (8 * i)) & 0xFF) as u8);
    }
}

/// Build the `/Type /XRef` stream dictionary and compressed body for
/// `sections`. `base_trailer` carries the non-xref-specific trailer keys
/// (`/Root`, `/Info`, `/Prev`, `/ID`, ...) the caller has already assembled.
pub(super) fn build_xref_stream(sections: &[XrefSection], size: u32, mut base_trailer: Dictionary) -> (Dictionary, Vec<u8>) {
    let field2_of = |e: &XrefEntry| -> u64 {
        match *e {
            XrefEntry::Normal { offset, .. } => offset as u64,
            XrefEntry::Compressed { container, .. } => container as u64,
            XrefEntry::Free { next_free, .. } => next_free as u64,
            XrefEntry::UnusableFree => 0,
        }
    };
    let field3_of = |e: &XrefEntry| -> u64 {
        match *e {
            XrefEntry::Normal { generation, .. } => generation as u64,
            XrefEntry::Free { generation, .. } => generation as u64,
            XrefEntry::Compressed { index, .. } => index as u64,
            XrefEntry::UnusableFree => 65535,
        }
    };

    let max_field2 = sections.iter().flat_map(|s| s.records.iter()).map(field2_of).max().unwrap_or(0);
    let max_field3 = sections.iter().flat_map(|s| s.records.iter()).map(field3_of).max().unwrap_or(0);
    let widths = [1usize, bytes_needed(max_field2), bytes_needed(max_field3)];

    let mut data = Vec::new();
    for section in sections {
        for entry in &section.records {
            let (type_field, field2, field3) = match *entry {
                XrefEntry::Free { next_free, generation } => (0u64, next_free as u64, generation as u64),
                XrefEntry::UnusableFree => (0, 0, 65535),
                XrefEntry::Normal { offset, generation } => (1, offset as u64, generation as u64),
                XrefEntry::Compressed { container, index } => (2, container as u64, index as u64),
            };
            write_field(&mut data, type_field, widths[0]);
            write_field(&mut data, field2, widths[1]);
            write_field(&mut data, field3, widths[2]);
        }
    }

    let index: Vec<Object> =
        sections.iter().flat_map(|s| [Object::Integer(s.first as i64), Object::Integer(s.records.len() as i64)]).collect();

    base_trailer.set("Type", Object::Name(b"XRef".to_vec()));
    base_trailer.set("Size", size as i64);
    base_trailer.set(
        "W",
        Object::Array(vec![Object::Integer(widths[0] as i64), Object::Integer(widths[1] as i64), Object::Integer(widths[2] as i64)]),
    );
    base_trailer.set("Index", Object::Array(index));
    base_trailer.set("Filter", Object::Name(b"FlateDecode".to_vec()));

    (base_trailer, filters::flate_encode(&data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_needed_grows_with_magnitude() {
        assert_eq!(bytes_needed(0), 1);
        assert_eq!(bytes_needed(255), 1);
        assert_eq!(bytes_needed(256), 2);
        assert_eq!(bytes_needed(65536), 3);
    }

    #[test]
    fn groups_consecutive_runs_only() {
        let entries = vec![
            (1, XrefEntry::Normal { offset: 10, generation: 0 }),
            (2, XrefEntry::Normal { offset: 20, generation: 0 }),
            (5, XrefEntry::Normal { offset: 50, generation: 0 }),
        ];
        let sections = group_into_sections(entries);
        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].first, 1);
        assert_eq!(sections[0].records.len(), 2);
        assert_eq!(sections[1].first, 5);
    }

    #[test]
    fn free_chain_wraps_to_zero() {
        let chain = link_free_entries(&[0, 3, 7]);
        assert_eq!(chain[0], (0, XrefEntry::Free { next_free: 3, generation: 65535 }));
        assert_eq!(chain[2], (7, XrefEntry::Free { next_free: 0, generation: 0 }));
    }
}
