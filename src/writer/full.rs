//! Full-rewrite save path (spec §4.8): every loaded object re-serialized in
//! ascending object-number order, a fresh xref section, and a fresh trailer.

use std::collections::BTreeMap;
use std::io::Write;

use rand::RngCore;

use super::options::SaveOptions;
use super::xref_writer::{self};
use crate::bytes::ByteWriter;
use crate::document::Document;
use crate::encryption;
use crate::error::Result;
use crate::object::{Dictionary, Object, ObjectId, Stream, StringFormat};
use crate::object_stream::{ObjectStreamBuilder, ObjectStreamConfig};
use crate::xref::XrefEntry;

impl Document {
    /// Write a full rewrite to `target` using default options (classic xref).
    pub fn save<W: Write>(&mut self, target: W) -> Result<()> {
        self.save_with_options(target, &SaveOptions::default())
    }

    /// Write a full rewrite to `target`. A plain `Document` has no original
    /// bytes to append to, so `options.incremental` has no effect here --
    /// use [`crate::document::IncrementalDocument::save`] for true
    /// incremental saves.
    pub fn save_with_options<W: Write>(&mut self, mut target: W, options: &SaveOptions) -> Result<()> {
        let bytes = self.full_rewrite(options)?;
        target.write_all(&bytes)?;
        Ok(())
    }

    /// Full rewrite, returned as an in-memory byte vector.
    pub fn save_to_bytes(&mut self, options: &SaveOptions) -> Result<Vec<u8>> {
        self.full_rewrite(options)
    }

    pub(super) fn full_rewrite(&mut self, options: &SaveOptions) -> Result<Vec<u8>> {
        let use_xref_stream = options.use_xref_stream.unwrap_or(false);
        // Object streams inherit the encrypting container's protection rather
        // than being individually keyed, so packing and re-encrypting at the
        // same time would either double-encrypt or leave plaintext exposed.
        // Simplest correct choice: skip packing while encryption is active.
        let pack_into_streams = use_xref_stream && self.encryption_state.is_none();

        let mut writer = ByteWriter::with_capacity(self.objects.len() * 256 + 256);
        writer.write_ascii(&format!("%PDF-{}\n%", self.version));
        writer.write_bytes(&self.binary_mark.clone());
        writer.write_bytes(b"\n");

        let mut next_free_id = self.max_id + 1;
        let encrypt_id: Option<ObjectId> = self.encryption_state.as_ref().map(|_| {
            let id = (next_free_id, 0);
            next_free_id += 1;
            id
        });

        let all: Vec<(ObjectId, Object)> = self.objects.iter().map(|(id, o)| (*id, o.clone())).collect();
        let (direct, to_pack): (Vec<(ObjectId, Object)>, Vec<(ObjectId, Object)>) = if pack_into_streams {
            all.into_iter().partition(|(id, obj)| id.1 != 0 || matches!(obj, Object::Stream(_)))
        } else {
            (all, Vec::new())
        };

        let mut entries: BTreeMap<u32, XrefEntry> = BTreeMap::new();

        for (id, obj) in &direct {
            let offset = writer.position() as u32;
            match &self.encryption_state {
                Some(state) => {
                    let mut owned = obj.clone();
                    let _ = encryption::encrypt_object(state, *id, &mut owned);
                    write_indirect(&mut writer, *id, &owned);
                }
                None => write_indirect(&mut writer, *id, obj),
            }
            entries.insert(id.0, XrefEntry::Normal { offset, generation: id.1 });
        }

        if !to_pack.is_empty() {
            let owned_map: BTreeMap<ObjectId, Object> = to_pack.into_iter().collect();
            let builder = ObjectStreamBuilder::new(ObjectStreamConfig::default());
            for built in builder.build_object_streams(&owned_map) {
                let container_id = (next_free_id, 0);
                next_free_id += 1;
                let offset = writer.position() as u32;
                let stream_obj = Object::Stream(Stream::new(built.dict, built.content));
                write_indirect(&mut writer, container_id, &stream_obj);
                entries.insert(container_id.0, XrefEntry::Normal { offset, generation: 0 });
                for (index, member_id) in built.member_order.iter().enumerate() {
                    entries.insert(member_id.0, XrefEntry::Compressed { container: container_id.0, index: index as u32 });
                }
            }
        }

        if let (Some(state), Some(id)) = (&self.encryption_state, encrypt_id) {
            let offset = writer.position() as u32;
            let dict_obj = Object::Dictionary(state.encrypt_dict.clone());
            write_indirect(&mut writer, id, &dict_obj);
            entries.insert(id.0, XrefEntry::Normal { offset, generation: 0 });
        }

        let size = next_free_id;
        fill_free_entries(&mut entries, size);

        let sections = xref_writer::group_into_sections(entries.into_iter().collect());
        let trailer = self.build_trailer(size, encrypt_id);

        let xref_offset = writer.position();
        if use_xref_stream {
            let xref_container_id = (next_free_id, 0);
            let size_with_self = next_free_id + 1;

            let mut entries2: BTreeMap<u32, XrefEntry> = BTreeMap::new();
            for section in &sections {
                for (i, entry) in section.records.iter().enumerate() {
                    entries2.insert(section.first + i as u32, *entry);
                }
            }
            entries2.insert(xref_container_id.0, XrefEntry::Normal { offset: xref_offset as u32, generation: 0 });
            fill_free_entries(&mut entries2, size_with_self);

            let sections2 = xref_writer::group_into_sections(entries2.into_iter().collect());
            let (xref_dict, xref_body) = xref_writer::build_xref_stream(&sections2, size_with_self, trailer);
            write_indirect(&mut writer, xref_container_id, &Object::Stream(Stream::new(xref_dict, xref_body)));
        } else {
            xref_writer::write_classic(&mut writer, &sections);
            writer.write_ascii("trailer\n");
            let mut buf = Vec::new();
            trailer.write(&mut buf);
            writer.write_bytes(&buf);
            writer.write_bytes(b"\n");
        }

        writer.write_ascii(&format!("startxref\n{xref_offset}\n%%EOF\n"));

        self.xref_start = xref_offset as usize;
        self.dirty.clear();
        self.new_objects.clear();

        Ok(writer.into_inner())
    }

    fn build_trailer(&mut self, size: u32, encrypt_id: Option<ObjectId>) -> Dictionary {
        let mut trailer = Dictionary::new();
        trailer.set("Size", size as i64);
        if let Ok(root) = self.trailer.get(b"Root") {
            trailer.set("Root", root.clone());
        }
        if let Ok(info) = self.trailer.get(b"Info") {
            trailer.set("Info", info.clone());
        }
        if let Some(id) = encrypt_id {
            trailer.set("Encrypt", Object::Reference(id));
        }
        trailer.set("ID", Object::Array(self.ensure_id()));
        trailer
    }

    /// `/ID` generation per spec §4.8: on a document's first save the two
    /// elements are identical fresh random bytes; every later save keeps the
    /// first element and only regenerates the second.
    fn ensure_id(&mut self) -> Vec<Object> {
        let existing_first = self.trailer.get(b"ID").and_then(Object::as_array).ok().and_then(|arr| arr.first().cloned());

        let mut second_bytes = [0u8; 16];
        rand::rng().fill_bytes(&mut second_bytes);
        let second = Object::String(second_bytes.to_vec(), StringFormat::Hexadecimal);

        let first = match existing_first {
            Some(first_obj) => first_obj,
            None => second.clone(),
        };

        let id = vec![first, second];
        self.trailer.set("ID", Object::Array(id.clone()));
        id
    }
}

/// Fill every object number in `0..size` not already present in `entries`
/// with a linked free-list entry.
pub(super) fn fill_free_entries(entries: &mut BTreeMap<u32, XrefEntry>, size: u32) {
    let free_ids: Vec<u32> = (0..size).filter(|n| !entries.contains_key(n)).collect();
    for (id, entry) in xref_writer::link_free_entries(&free_ids) {
        entries.insert(id, entry);
    }
}

pub(super) fn write_indirect(writer: &mut ByteWriter, id: ObjectId, obj: &Object) {
    writer.write_ascii(&format!("{} {} obj\n", id.0, id.1));
    let mut buf = Vec::new();
    obj.write(&mut buf);
    writer.write_bytes(&buf);
    writer.write_ascii("\nendobj\n");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary;

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
    fn full_rewrite_round_trips_through_the_parser() {
        let mut doc = sample_document();
        let bytes = doc.save_to_bytes(&SaveOptions::default()).unwrap();

        let reparsed = Document::load_mem(&bytes).unwrap();
        assert_eq!(reparsed.get_pages().len(), 1);
        assert!(reparsed.trailer.get(b"ID").is_ok());
        assert!(!doc.is_dirty());
    }

    #[test]
    fn full_rewrite_preserves_id_first_element_across_saves() {
        let mut doc = sample_document();
        let first_save = doc.save_to_bytes(&SaveOptions::default()).unwrap();
        let reparsed = Document::load_mem(&first_save).unwrap();
        let first_id = reparsed.trailer.get(b"ID").unwrap().as_array().unwrap()[0].clone();

        let mut doc2 = Document::load_mem(&first_save).unwrap();
        let second_save = doc2.save_to_bytes(&SaveOptions::default()).unwrap();
        let reparsed2 = Document::load_mem(&second_save).unwrap();
        let second_id_first_element = reparsed2.trailer.get(b"ID").unwrap().as_array().unwrap()[0].clone();

        assert_eq!(first_id, second_id_first_element);
    }

    #[test]
    fn xref_stream_round_trips_too() {
        let mut doc = sample_document();
        let options = SaveOptions::builder().use_xref_streams(true).build();
        let bytes = doc.save_to_bytes(&options).unwrap();
        let reparsed = Document::load_mem(&bytes).unwrap();
        assert_eq!(reparsed.get_pages().len(), 1);
    }
}
