//! The object registry: the loaded/unloaded object graph, the dirty set, and
//! the operations that let callers read and mutate a PDF without ever
//! touching xref bytes directly.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};

use crate::encryption::EncryptionState;
use crate::error::{Error, RangeError, Result};
use crate::object::{Dictionary, Object, ObjectId};
use crate::pages::PagesTree;
use crate::xref::{Xref, XrefEntry, XrefType};

/// A non-fatal observation accumulated while reading or writing a document.
/// Warnings never interrupt control flow; callers inspect them after the
/// fact via [`Document::warnings`].
#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    XrefSizeMismatch,
    RecoveredViaBruteForce,
    SkippedUnresolvableKid,
    PageTreeFlattened,
    IncrementalSaveFellBackToFullRewrite,
    EncryptedObjectSkipped,
    NonStandardEncryptionVersion,
}

/// An in-memory PDF document: the object graph plus enough bookkeeping
/// (dirty set, xref, trailer) to support both full rewrites and incremental
/// updates.
pub struct Document {
    pub version: String,
    pub binary_mark: Vec<u8>,
    pub objects: BTreeMap<ObjectId, Object>,
    pub reference_table: Xref,
    pub trailer: Dictionary,
    pub max_id: u32,
    pub xref_start: usize,
    pub encryption_state: Option<EncryptionState>,

    pub(crate) dirty: BTreeSet<ObjectId>,
    pub(crate) new_objects: BTreeSet<ObjectId>,
    next_object_number: u32,
    warnings: RefCell<Vec<Warning>>,

    pub(crate) recovered_via_brute_force: bool,
    pub(crate) linearized: bool,
    pages: RefCell<Option<PagesTree>>,
    pages_flattened: std::cell::Cell<bool>,
}

impl Document {
    pub fn new() -> Self {
        Document {
            version: String::from("1.4"),
            binary_mark: vec![0xE2, 0xE3, 0xCF, 0xD3],
            objects: BTreeMap::new(),
            reference_table: Xref::new(0, XrefType::CrossReferenceTable),
            trailer: Dictionary::new(),
            max_id: 0,
            xref_start: 0,
            encryption_state: None,
            dirty: BTreeSet::new(),
            new_objects: BTreeSet::new(),
            next_object_number: 1,
            warnings: RefCell::new(Vec::new()),
            recovered_via_brute_force: false,
            linearized: false,
            pages: RefCell::new(None),
            pages_flattened: std::cell::Cell::new(false),
        }
    }

    pub(crate) fn warn(&self, kind: WarningKind, message: impl Into<String>) {
        self.warnings.borrow_mut().push(Warning { kind, message: message.into() });
    }

    /// All warnings accumulated so far, oldest first.
    pub fn warnings(&self) -> Vec<Warning> {
        self.warnings.borrow().clone()
    }

    pub fn is_encrypted(&self) -> bool {
        self.encryption_state.is_some()
    }

    pub fn get_object(&self, id: ObjectId) -> Result<&Object> {
        self.objects.get(&id).ok_or(Error::MissingXrefEntry)
    }

    pub fn get_object_mut(&mut self, id: ObjectId) -> Result<&mut Object> {
        self.dirty.insert(id);
        self.objects.get_mut(&id).ok_or(Error::MissingXrefEntry)
    }

    pub fn get_dictionary(&self, id: ObjectId) -> Result<&Dictionary> {
        self.get_object(id).and_then(Object::as_dict)
    }

    /// Resolve `value` one level: if it's a `Reference`, look up the target
    /// object; otherwise hand back the value as-is (with its own id unknown,
    /// signalled by `(0, 0)`).
    pub fn dereference<'a>(&'a self, value: &'a Object) -> Result<(Option<ObjectId>, &'a Object)> {
        match value {
            Object::Reference(id) => self.get_object(*id).map(|o| (Some(*id), o)),
            other => Ok((None, other)),
        }
    }

    pub fn get_catalog(&self) -> Result<&Dictionary> {
        let root = self.trailer.get(b"Root").and_then(Object::as_reference).map_err(|_| Error::MissingCatalog)?;
        self.get_dictionary(root).map_err(|_| Error::MissingCatalog)
    }

    /// Allocate a fresh object number (generation 0) for a value that has no
    /// entry on disk yet.
    pub fn register(&mut self, value: Object) -> ObjectId {
        let id = (self.next_object_number, 0);
        self.next_object_number += 1;
        self.max_id = self.max_id.max(id.0);
        self.objects.insert(id, value);
        self.new_objects.insert(id);
        id
    }

    pub fn mark_dirty(&mut self, id: ObjectId) {
        if !self.new_objects.contains(&id) {
            self.dirty.insert(id);
        }
    }

    /// All newly created objects and all dirty loaded objects, in ascending
    /// object-number order.
    pub fn iter_changed(&self) -> impl Iterator<Item = (ObjectId, &Object)> {
        let mut ids: Vec<ObjectId> = self.new_objects.iter().chain(self.dirty.iter()).copied().collect();
        ids.sort_unstable();
        ids.dedup();
        ids.into_iter().filter_map(move |id| self.objects.get(&id).map(|o| (id, o)))
    }

    pub fn get_entry(&self, id: ObjectId) -> Option<&XrefEntry> {
        self.reference_table.get(id.0)
    }

    /// True once any mutation has touched this document's object graph.
    pub fn is_dirty(&self) -> bool {
        !self.dirty.is_empty() || !self.new_objects.is_empty()
    }

    pub fn was_recovered_via_brute_force(&self) -> bool {
        self.recovered_via_brute_force
    }

    pub fn is_linearized(&self) -> bool {
        self.linearized
    }

    /// The flattened, load-time-walked page list, keyed by 1-based page
    /// number in document order. Walked once and cached; mutations through
    /// [`Document::insert_page`]/[`remove_page`](Self::remove_page)/
    /// [`move_page`](Self::move_page) invalidate and rebuild the cache.
    pub fn get_pages(&self) -> BTreeMap<u32, ObjectId> {
        self.pages_tree().pages().iter().enumerate().map(|(i, id)| (i as u32 + 1, *id)).collect()
    }

    fn pages_tree(&self) -> std::cell::Ref<'_, PagesTree> {
        {
            let mut slot = self.pages.borrow_mut();
            if slot.is_none() {
                *slot = Some(PagesTree::walk(self));
            }
        }
        std::cell::Ref::map(self.pages.borrow(), |o| o.as_ref().unwrap())
    }

    fn invalidate_pages_cache(&self) {
        *self.pages.borrow_mut() = None;
    }

    pub fn insert_page(&mut self, index: usize, dict: Dictionary) -> Result<ObjectId> {
        let id = self.register(Object::Dictionary(dict));
        self.flatten_and_mutate(|flat| {
            let clamped = index.min(flat.len());
            flat.insert(clamped, id);
        })?;
        Ok(id)
    }

    pub fn remove_page(&mut self, index: usize) -> Result<ObjectId> {
        let mut removed = None;
        self.flatten_and_mutate(|flat| {
            if index < flat.len() {
                removed = Some(flat.remove(index));
            }
        })?;
        removed.ok_or_else(|| RangeError::PageIndex { index, len: 0 }.into())
    }

    pub fn move_page(&mut self, from: usize, to: usize) -> Result<()> {
        let mut ok = false;
        self.flatten_and_mutate(|flat| {
            if from < flat.len() && to < flat.len() {
                let id = flat.remove(from);
                flat.insert(to, id);
                ok = true;
            }
        })?;
        if ok {
            Ok(())
        } else {
            Err(RangeError::PageIndex { index: from.max(to), len: 0 }.into())
        }
    }

    /// Flatten the page tree (if not already flat) and apply `mutate` to the
    /// ordered id list, then write it back as the catalog's single-level
    /// `/Kids` array per spec §4.7.
    fn flatten_and_mutate(&mut self, mutate: impl FnOnce(&mut Vec<ObjectId>)) -> Result<()> {
        let mut flat: Vec<ObjectId> = self.pages_tree().pages().to_vec();
        let was_flat = self.pages_flattened.get();

        mutate(&mut flat);

        let root = self.trailer.get(b"Root").and_then(Object::as_reference).map_err(|_| Error::MissingCatalog)?;
        let catalog = self.get_dictionary(root).map_err(|_| Error::MissingCatalog)?;
        let pages_root = catalog.get(b"Pages").and_then(Object::as_reference)?;

        let kids: Vec<Object> = flat.iter().map(|id| Object::Reference(*id)).collect();
        let count = flat.len() as i64;

        {
            let pages_dict = self.get_object_mut(pages_root).and_then(Object::as_dict_mut)?;
            pages_dict.set(b"Kids", Object::Array(kids));
            pages_dict.set(b"Count", count);
        }

        for id in &flat {
            if let Ok(page_dict) = self.get_object_mut(*id).and_then(Object::as_dict_mut) {
                page_dict.set(b"Parent", Object::Reference(pages_root));
            }
        }

        if !was_flat {
            self.warn(WarningKind::PageTreeFlattened, "page tree flattened on first mutation");
        }
        self.pages_flattened.set(true);
        self.invalidate_pages_cache();
        Ok(())
    }

    /// Authenticate `password` against the current `/Encrypt` dictionary
    /// without mutating `encryption_state`; used both by the reader (which
    /// only commits the resulting state on success) and by callers probing
    /// credentials ahead of time.
    pub fn authenticate_password(&self, password: &str) -> Result<EncryptionState> {
        EncryptionState::decode(self, password)
    }
}

impl Default for Document {
    fn default() -> Self {
        Document::new()
    }
}

/// A document opened for incremental saving: the original bytes plus the
/// loaded [`Document`]. Saving through this type appends rather than
/// rewrites, preserving the byte range signatures depend on.
pub struct IncrementalDocument {
    pub original_bytes: Vec<u8>,
    pub document: Document,
    /// Whether the document was encrypted at the moment it was opened;
    /// compared at save time to detect encryption being added or removed,
    /// one of the preconditions that forces a fall-back full rewrite.
    pub(crate) original_encrypted: bool,
}

impl IncrementalDocument {
    pub fn create_from(original_bytes: Vec<u8>, document: Document) -> Self {
        let original_encrypted = document.is_encrypted();
        IncrementalDocument { original_bytes, document, original_encrypted }
    }

    pub fn get_document(&self) -> &Document {
        &self.document
    }

    pub fn get_document_mut(&mut self) -> &mut Document {
        &mut self.document
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_allocates_ascending_ids() {
        let mut doc = Document::new();
        let a = doc.register(Object::Integer(1));
        let b = doc.register(Object::Integer(2));
        assert_eq!(a, (1, 0));
        assert_eq!(b, (2, 0));
        assert!(doc.is_dirty());
    }

    #[test]
    fn iter_changed_is_ascending_and_deduped() {
        let mut doc = Document::new();
        let a = doc.register(Object::Integer(1));
        doc.mark_dirty(a);
        doc.mark_dirty(a);
        let ids: Vec<_> = doc.iter_changed().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![a]);
    }
}
