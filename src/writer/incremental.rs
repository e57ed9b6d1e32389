//! Incremental-update save path (spec §4.8): copy the original bytes
//! verbatim and append only the objects that changed, so an existing digital
//! signature's byte range stays intact.

use std::io::Write;

use super::full::write_indirect;
use super::options::SaveOptions;
use super::xref_writer;
use crate::bytes::ByteWriter;
use crate::document::{IncrementalDocument, WarningKind};
use crate::error::Result;
use crate::object::{Dictionary, Object};
use crate::xref::{XrefEntry, XrefType};

impl IncrementalDocument {
    pub fn save<W: Write>(&mut self, target: W) -> Result<()> {
        self.save_with_options(target, &SaveOptions::builder().incremental(true).build())
    }

    pub fn save_with_options<W: Write>(&mut self, mut target: W, options: &SaveOptions) -> Result<()> {
        let bytes = self.save_to_bytes(options)?;
        target.write_all(&bytes)?;
        Ok(())
    }

    pub fn save_to_bytes(&mut self, options: &SaveOptions) -> Result<Vec<u8>> {
        if !options.incremental {
            return self.document.full_rewrite(options);
        }

        if let Some(reason) = self.incremental_precondition_failure() {
            self.document.warn(
                WarningKind::IncrementalSaveFellBackToFullRewrite,
                format!("incremental save refused ({reason}), falling back to a full rewrite"),
            );
            return self.document.full_rewrite(options);
        }

        self.incremental_update(options)
    }

    fn incremental_precondition_failure(&self) -> Option<String> {
        if self.document.is_linearized() {
            return Some("document is linearized".to_string());
        }
        if self.document.was_recovered_via_brute_force() {
            return Some("document was recovered via brute-force scanning".to_string());
        }
        if self.document.is_encrypted() != self.original_encrypted {
            return Some("encryption state changed since the document was opened".to_string());
        }
        None
    }

    /// Append only dirty/new objects after the original bytes, and write a
    /// fresh xref section that chains back to the original via `/Prev`.
    fn incremental_update(&mut self, options: &SaveOptions) -> Result<Vec<u8>> {
        let use_xref_stream =
            options.use_xref_stream.unwrap_or(self.document.reference_table.xref_type == XrefType::CrossReferenceStream);

        let base_len = self.original_bytes.len();
        let mut writer = ByteWriter::with_capacity(4096);
        if !self.original_bytes.ends_with(b"\n") {
            writer.write_bytes(b"\n");
        }

        let changed: Vec<(crate::object::ObjectId, Object)> =
            self.document.iter_changed().map(|(id, obj)| (id, obj.clone())).collect();

        let mut entries: BTreeMapEntries = Vec::new();
        for (id, obj) in &changed {
            let offset = base_len as u64 + writer.position();
            write_indirect(&mut writer, *id, obj);
            entries.push((id.0, XrefEntry::Normal { offset: offset as u32, generation: id.1 }));
        }
        entries.sort_by_key(|(id, _)| *id);

        let size = self.document.max_id + 1;
        let trailer = self.build_trailer(size);

        let xref_offset = base_len as u64 + writer.position();
        if use_xref_stream {
            let xref_container_id = (self.document.max_id + 1, 0);
            let mut all_entries = entries.clone();
            all_entries.push((xref_container_id.0, XrefEntry::Normal { offset: xref_offset as u32, generation: 0 }));
            all_entries.sort_by_key(|(id, _)| *id);
            let sections = xref_writer::group_into_sections(all_entries);
            let (xref_dict, xref_body) = xref_writer::build_xref_stream(&sections, xref_container_id.0 + 1, trailer);
            write_indirect(&mut writer, xref_container_id, &Object::Stream(crate::object::Stream::new(xref_dict, xref_body)));
        } else {
            let sections = xref_writer::group_into_sections(entries);
            xref_writer::write_classic(&mut writer, &sections);
            writer.write_ascii("trailer\n");
            let mut buf = Vec::new();
            trailer.write(&mut buf);
            writer.write_bytes(&buf);
            writer.write_bytes(b"\n");
        }

        writer.write_ascii(&format!("startxref\n{xref_offset}\n%%EOF\n"));

        let mut out = self.original_bytes.clone();
        out.extend_from_slice(writer.as_slice());

        self.document.xref_start = xref_offset as usize;
        self.document.dirty.clear();
        self.document.new_objects.clear();

        Ok(out)
    }

    fn build_trailer(&self, size: u32) -> Dictionary {
        let mut trailer = Dictionary::new();
        trailer.set("Size", size as i64);
        if let Ok(root) = self.document.trailer.get(b"Root") {
            trailer.set("Root", root.clone());
        }
        if let Ok(info) = self.document.trailer.get(b"Info") {
            trailer.set("Info", info.clone());
        }
        if let Ok(id) = self.document.trailer.get(b"ID") {
            trailer.set("ID", id.clone());
        }
        trailer.set("Prev", self.document.xref_start as i64);
        trailer
    }
}

type BTreeMapEntries = Vec<(u32, XrefEntry)>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary;
    use crate::document::Document;

    fn sample_document() -> Document {
        let mut doc = Document::new();
        let page = doc.register(Object::Dictionary(dictionary! { "Type" => Object::Name(b"Page".to_vec()) }));
        let pages = doc.register(Object::Dictionary(dictionary! {
            "Type" => Object::Name(b"Pages".to_vec()),
            "Kids" => Object::Array(vec![Object::Reference(page)]),
            "Count" => 1i64,
        }));
        let catalog = doc.register(Object::Dictionary(dictionary! {
            "Type" => Object::Name(b"Catalog".to_vec()),
            "Pages" => Object::Reference(pages),
        }));
        doc.trailer.set("Root", Object::Reference(catalog));
        doc
    }

    #[test]
    fn incremental_save_appends_and_preserves_the_prefix() {
        let mut doc = sample_document();
        let original = doc.save_to_bytes(&SaveOptions::default()).unwrap();

        let mut incremental = IncrementalDocument::create_from(original.clone(), Document::load_mem(&original).unwrap());
        let info = incremental.document.register(Object::Dictionary(dictionary! { "Producer" => Object::string_literal("test") }));
        incremental.document.trailer.set("Info", Object::Reference(info));

        let options = SaveOptions::builder().incremental(true).build();
        let saved = incremental.save_to_bytes(&options).unwrap();

        assert!(saved.len() > original.len());
        assert_eq!(&saved[..original.len()], original.as_slice());

        let reparsed = Document::load_mem(&saved).unwrap();
        assert_eq!(reparsed.get_pages().len(), 1);
    }

    #[test]
    fn incremental_save_falls_back_to_full_rewrite_when_linearized() {
        let mut doc = sample_document();
        let original = doc.save_to_bytes(&SaveOptions::default()).unwrap();

        let mut loaded = Document::load_mem(&original).unwrap();
        loaded.linearized = true;
        let mut incremental = IncrementalDocument::create_from(original.clone(), loaded);

        let options = SaveOptions::builder().incremental(true).build();
        let saved = incremental.save_to_bytes(&options).unwrap();

        assert!(incremental.document.warnings().iter().any(|w| w.kind == WarningKind::IncrementalSaveFellBackToFullRewrite));
        assert_ne!(&saved[..original.len().min(saved.len())], original.as_slice());
    }
}
