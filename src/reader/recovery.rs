//! Brute-force recovery: used when the declared xref chain is unreadable or
//! its declared offsets don't locate real objects. Scans the whole buffer
//! for `N G obj` at the start of a line and rebuilds a synthetic table from
//! what it finds.

use std::collections::HashSet;

use crate::bytes::Scanner;
use crate::document::WarningKind;
use crate::error::Result;
use crate::object::Object;
use crate::parser::ParserInput;
use crate::xref::{Xref, XrefEntry, XrefType};

use super::Reader;

impl Reader<'_> {
    pub(crate) fn recover_via_brute_force(&mut self) -> Result<()> {
        let mut xref = Xref::new(0, XrefType::CrossReferenceTable);
        let mut scanner = Scanner::new(self.buffer);
        let mut at_line_start = true;

        while !scanner.is_at_end() {
            if at_line_start {
                let start = scanner.position();
                match parse_obj_header(&mut scanner) {
                    Some((obj_num, generation)) => {
                        xref.insert(obj_num, XrefEntry::Normal { offset: start as u32, generation });
                        at_line_start = false;
                        continue;
                    }
                    None => scanner.seek(start),
                }
            }
            at_line_start = matches!(scanner.advance(), Some(b'\n'));
        }

        xref.size = xref.max_id() + 1;
        self.document.reference_table = xref;
        self.document.recovered_via_brute_force = true;
        self.document
            .warn(WarningKind::RecoveredViaBruteForce, "recovered cross-reference table via brute-force object scan");

        self.recover_trailer()
    }

    fn recover_trailer(&mut self) -> Result<()> {
        if self.document.trailer.get(b"Root").is_ok() {
            return Ok(());
        }

        if let Some(pos) = Scanner::rfind_from(self.buffer, b"trailer", 0) {
            if let Ok((_, dict)) = crate::parser::dictionary(ParserInput::new_extra(&self.buffer[pos + 7..], "recovered-trailer")) {
                if dict.get(b"Root").is_ok() {
                    self.document.trailer = dict;
                    return Ok(());
                }
            }
        }

        let entries: Vec<_> = self.document.reference_table.entries.iter().map(|(k, v)| (*k, *v)).collect();
        for (obj_num, entry) in entries {
            if let XrefEntry::Normal { offset, .. } = entry {
                if let Ok((id, obj)) = self.read_object(offset as usize, None, &mut HashSet::new()) {
                    if let Ok(dict) = obj.as_dict() {
                        if dict.has_type(b"Catalog") {
                            self.document.trailer.set("Root", Object::Reference(id));
                            self.document.trailer.set("Size", (obj_num + 1) as i64);
                            return Ok(());
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

fn parse_obj_header(scanner: &mut Scanner) -> Option<(u32, u16)> {
    let obj_num = scanner.read_decimal()? as u32;
    if scanner.peek() != Some(b' ') {
        return None;
    }
    scanner.advance();
    let generation = scanner.read_decimal()? as u16;
    if scanner.peek() != Some(b' ') {
        return None;
    }
    scanner.advance();
    if !scanner.match_literal(b"obj") {
        return None;
    }
    Some((obj_num, generation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Document;

    #[test]
    fn recovers_objects_after_corrupted_xref() {
        let content = b"%PDF-1.4\n1 0 obj<</Type/Catalog/Pages 2 0 R>>endobj\n2 0 obj<</Type/Pages/Kids[]/Count 0>>endobj\nxref\ngarbage\ntrailer\n<<>>\nstartxref\n0\n%%EOF";
        let doc = Document::load_mem(content).unwrap();
        assert!(doc.was_recovered_via_brute_force());
        assert!(doc.get_catalog().is_ok());
    }
}
