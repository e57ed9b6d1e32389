mod encrypted;
mod load;
mod metadata;
mod object_loader;
mod recovery;

#[cfg(test)]
mod tests;

use log::{error, warn};
use std::cmp;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

use crate::encryption::EncryptionState;
use crate::error::{ParseError, XrefError};
use crate::object_stream::ObjectStream;
use crate::parser::{self, ParserInput};
use crate::writer::Credentials;
use crate::xref::XrefEntry;
use crate::{Document, Error, Object, Result};

pub use metadata::PdfMetadata;

pub(crate) type FilterFunc = fn((u32, u16), &mut Object) -> Option<((u32, u16), Object)>;

pub struct Reader<'a> {
    pub buffer: &'a [u8],
    pub document: Document,
    pub encryption_state: Option<EncryptionState>,
    pub password: Option<String>,
    /// When `false`, a broken xref chain or an xref table whose declared
    /// offsets resolve to nothing is surfaced as a hard error instead of
    /// being papered over by brute-force recovery.
    pub(crate) lenient: bool,
    /// Raw, still-encrypted object bytes extracted before the `/Encrypt`
    /// dictionary is authenticated (see `encrypted.rs`).
    pub(crate) raw_objects: HashMap<(u32, u16), Vec<u8>>,
}

/// Maximum allowed nesting of literal strings.
pub const MAX_BRACKET: usize = 100;

impl<'a> Reader<'a> {
    pub(crate) fn new(buffer: &'a [u8], credentials: Option<Credentials>, lenient: bool) -> Self {
        let password = credentials.map(|c| c.as_password_string());
        Reader { buffer, document: Document::new(), encryption_state: None, password, lenient, raw_objects: HashMap::new() }
    }

    /// Read the whole document.
    ///
    /// The document structure can be expressed in PEG as:
    ///   document <- header indirect_object* xref trailer xref_start
    pub fn read(mut self, filter_func: Option<FilterFunc>) -> Result<Document> {
        let offset = self.buffer.windows(5).position(|w| w == b"%PDF-").unwrap_or(0);
        self.buffer = &self.buffer[offset..];

        let version = parser::header(ParserInput::new_extra(self.buffer, "header")).ok_or(ParseError::InvalidFileHeader)?;

        if let Some(pos) = self.buffer.iter().position(|&byte| byte == b'\n') {
            if let Some(binary_mark) = parser::binary_mark(ParserInput::new_extra(&self.buffer[pos + 1..], "binary_mark")) {
                if binary_mark.iter().all(|&byte| byte >= 128) {
                    self.document.binary_mark = binary_mark;
                }
            }
        }

        self.document.linearized = Self::detect_linearized(self.buffer);

        match self.read_xref_chain() {
            Ok(()) => {}
            Err(e) => {
                if !self.lenient {
                    return Err(e);
                }
                warn!("xref chain unreadable, falling back to brute-force recovery");
                self.recover_via_brute_force()?;
            }
        }

        let xref_entry_count = self.document.reference_table.max_id().checked_add(1).ok_or(ParseError::InvalidXref)?;
        if self.document.reference_table.size != xref_entry_count {
            warn!(
                "Size entry of trailer dictionary is {}, correct value is {}.",
                self.document.reference_table.size, xref_entry_count
            );
            self.document.reference_table.size = xref_entry_count;
        }

        self.document.version = version;
        self.document.max_id = self.document.reference_table.size.saturating_sub(1);

        let is_encrypted = self.document.trailer.get(b"Encrypt").is_ok();
        if is_encrypted {
            self.load_encrypted_document(filter_func)?;
        } else {
            self.load_objects_raw(filter_func)?;
        }

        // If no live entries at all resolved (e.g. declared offsets were
        // stale), fall back to scanning the raw bytes.
        if self.document.objects.is_empty() && !self.document.reference_table.entries.is_empty() {
            if !self.lenient {
                return Err(Error::Xref(XrefError::Invalid));
            }
            self.recover_via_brute_force()?;
            self.load_objects_raw(filter_func)?;
        }

        Ok(self.document)
    }

    fn read_xref_chain(&mut self) -> Result<()> {
        let xref_start = Self::get_xref_start(self.buffer)?;
        if xref_start > self.buffer.len() {
            return Err(Error::Xref(XrefError::Start));
        }
        self.document.xref_start = xref_start;

        let (mut xref, mut trailer) = parser::xref_and_trailer(ParserInput::new_extra(&self.buffer[xref_start..], "xref"), self)?;

        let mut already_seen = HashSet::new();
        let mut prev_xref_start = trailer.remove(b"Prev");
        while let Some(prev) = prev_xref_start.and_then(|offset| offset.as_i64().ok()) {
            if already_seen.contains(&prev) {
                break;
            }
            already_seen.insert(prev);
            if prev < 0 || prev as usize > self.buffer.len() {
                return Err(Error::Xref(XrefError::PrevStart));
            }

            let (prev_xref, prev_trailer) = parser::xref_and_trailer(ParserInput::new_extra(&self.buffer[prev as usize..], ""), self)?;
            xref.merge(prev_xref);

            let prev_xref_stream_start = trailer.remove(b"XRefStm");
            if let Some(prev) = prev_xref_stream_start.and_then(|offset| offset.as_i64().ok()) {
                if prev < 0 || prev as usize > self.buffer.len() {
                    return Err(Error::Xref(XrefError::StreamStart));
                }
                let (prev_xref, _) = parser::xref_and_trailer(ParserInput::new_extra(&self.buffer[prev as usize..], ""), self)?;
                xref.merge(prev_xref);
            }

            prev_xref_start = prev_trailer.get(b"Prev").cloned().ok();
        }

        self.document.trailer = trailer;
        self.document.reference_table = xref;
        Ok(())
    }

    /// A linearized document's first indirect object is a dict carrying
    /// `/Linearized`. Incremental saves are refused on such documents.
    ///
    /// Full object-model parsing would require a `Reader` to resolve a
    /// possible indirect `/Length`, which doesn't exist yet this early in
    /// `read()`; a first-object textual scan is simpler and sufficient,
    /// since `/Linearized` only ever appears in that first dictionary.
    fn detect_linearized(buffer: &[u8]) -> bool {
        const PROBE_WINDOW: usize = 2048;
        let header_end = buffer.windows(5).position(|w| w == b"%PDF-").map(|p| p + 8).unwrap_or(0);
        let window_end = (header_end + PROBE_WINDOW).min(buffer.len());
        let window = &buffer[header_end.min(buffer.len())..window_end];

        let first_obj_end = crate::bytes::Scanner::find_all(window, b"obj").first().copied();
        let first_endobj = crate::bytes::Scanner::find_all(window, b"endobj").first().copied();
        match (first_obj_end, first_endobj) {
            (Some(start), Some(end)) if start < end => {
                crate::bytes::Scanner::find_all(&window[start..end], b"/Linearized").first().is_some()
            }
            _ => false,
        }
    }

    fn load_objects_raw(&mut self, filter_func: Option<FilterFunc>) -> Result<()> {
        let is_encrypted = self.document.trailer.get(b"Encrypt").is_ok();
        let zero_length_streams = Mutex::new(vec![]);
        let object_streams = Mutex::new(vec![]);

        let entries_filter_map = |(_, entry): (&_, &_)| {
            if let XrefEntry::Normal { offset, .. } = *entry {
                let result = self.read_object(offset as usize, None, &mut HashSet::new());
                let (object_id, mut object) = match result {
                    Ok(obj) => obj,
                    Err(e) => {
                        if is_encrypted {
                            warn!("Skipping encrypted object at offset {}: {:?}", offset, e);
                        } else {
                            error!("Object load error at offset {}: {e:?}", offset);
                        }
                        return None;
                    }
                };
                if let Some(filter_func) = filter_func {
                    filter_func(object_id, &mut object)?;
                }

                if let Ok(ref mut stream) = object.as_stream_mut() {
                    if stream.dict.has_type(b"ObjStm") && !is_encrypted {
                        let obj_stream = ObjectStream::new(stream).ok()?;
                        let mut object_streams = object_streams.lock().expect("object_streams mutex poisoned");
                        if let Some(filter_func) = filter_func {
                            let objects: BTreeMap<(u32, u16), Object> = obj_stream
                                .objects
                                .into_iter()
                                .filter_map(|(object_id, mut object)| filter_func(object_id, &mut object))
                                .collect();
                            object_streams.extend(objects);
                        } else {
                            object_streams.extend(obj_stream.objects);
                        }
                    } else if stream.content.is_empty() && stream.start_position.is_some() {
                        let mut zero_length_streams = zero_length_streams.lock().expect("zero_length_streams mutex poisoned");
                        zero_length_streams.push(object_id);
                    }
                }

                Some((object_id, object))
            } else {
                None
            }
        };

        #[cfg(feature = "rayon")]
        {
            self.document.objects =
                self.document.reference_table.entries.par_iter().filter_map(entries_filter_map).collect();
        }
        #[cfg(not(feature = "rayon"))]
        {
            self.document.objects = self.document.reference_table.entries.iter().filter_map(entries_filter_map).collect();
        }

        // Per PDF spec, first definition wins for duplicate object IDs.
        for (id, entry) in object_streams.into_inner().expect("object_streams mutex poisoned") {
            self.document.objects.entry(id).or_insert(entry);
        }

        for object_id in zero_length_streams.into_inner().expect("zero_length_streams mutex poisoned") {
            let _ = self.read_stream_content(object_id);
        }

        Ok(())
    }

    fn get_xref_start(buffer: &[u8]) -> Result<usize> {
        let seek_pos = buffer.len() - cmp::min(buffer.len(), 1024);
        Self::search_substring(buffer, b"%%EOF", seek_pos)
            .and_then(|eof_pos| if eof_pos > 25 { Some(eof_pos) } else { None })
            .and_then(|eof_pos| Self::search_substring(buffer, b"startxref", eof_pos - 25))
            .ok_or(Error::Xref(XrefError::Start))
            .and_then(|xref_pos| {
                if xref_pos <= buffer.len() {
                    match parser::xref_start(ParserInput::new_extra(&buffer[xref_pos..], "xref")) {
                        Some(startxref) => Ok(startxref as usize),
                        None => Err(Error::Xref(XrefError::Start)),
                    }
                } else {
                    Err(Error::Xref(XrefError::Start))
                }
            })
    }

    pub(crate) fn search_substring(buffer: &[u8], pattern: &[u8], start_pos: usize) -> Option<usize> {
        crate::bytes::Scanner::rfind_from(buffer, pattern, start_pos)
    }
}
