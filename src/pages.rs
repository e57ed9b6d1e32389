//! Page-tree walking: recursive descent from `Catalog./Pages`, run once at
//! load and cached by [`Document`](crate::Document) until a mutation
//! invalidates it.

use std::collections::HashSet;

use crate::document::{Document, WarningKind};
use crate::object::{Object, ObjectId};

pub(crate) struct PagesTree {
    pages: Vec<ObjectId>,
}

impl PagesTree {
    pub(crate) fn pages(&self) -> &[ObjectId] {
        &self.pages
    }

    /// Walk the tree from the catalog's `/Pages` root. Untyped/unresolvable
    /// kids are skipped silently or with a warning per spec §4.7; cycles are
    /// broken by a visited set.
    pub(crate) fn walk(document: &Document) -> PagesTree {
        let mut pages = Vec::new();
        if let Ok(root) = document.get_catalog().and_then(|cat| cat.get(b"Pages").and_then(Object::as_reference)) {
            let mut seen = HashSet::new();
            walk_node(document, root, &mut seen, &mut pages);
        }
        PagesTree { pages }
    }
}

fn walk_node(document: &Document, id: ObjectId, seen: &mut HashSet<ObjectId>, pages: &mut Vec<ObjectId>) {
    if !seen.insert(id) {
        return;
    }

    let dict = match document.get_dictionary(id) {
        Ok(dict) => dict,
        Err(_) => {
            document.warn(WarningKind::SkippedUnresolvableKid, format!("page-tree node {id:?} could not be resolved"));
            return;
        }
    };

    match dict.get_type() {
        Ok(b"Page") => pages.push(id),
        Ok(b"Pages") => {
            if let Ok(kids) = dict.get(b"Kids").and_then(Object::as_array) {
                for kid in kids {
                    match kid.as_reference() {
                        Ok(kid_id) => walk_node(document, kid_id, seen, pages),
                        Err(_) => document.warn(WarningKind::SkippedUnresolvableKid, "non-reference kid in /Kids"),
                    }
                }
            }
        }
        _ => {
            // Untyped or unknown node type: lenient parsing skips it silently.
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary;

    fn sample_document() -> Document {
        let mut doc = Document::new();
        let page1 = doc.register(Object::Dictionary(dictionary! {
            "Type" => Object::Name(b"Page".to_vec()),
        }));
        let page2 = doc.register(Object::Dictionary(dictionary! {
            "Type" => Object::Name(b"Page".to_vec()),
        }));
        let pages_root = doc.register(Object::Dictionary(dictionary! {
            "Type" => Object::Name(b"Pages".to_vec()),
            "Kids" => Object::Array(vec![Object::Reference(page1), Object::Reference(page2)]),
            "Count" => 2i64,
        }));
        let catalog = doc.register(Object::Dictionary(dictionary! {
            "Type" => Object::Name(b"Catalog".to_vec()),
            "Pages" => Object::Reference(pages_root),
        }));
        doc.trailer.set("Root", Object::Reference(catalog));
        doc
    }

    #[test]
    fn walks_flat_page_tree() {
        let doc = sample_document();
        let pages = doc.get_pages();
        assert_eq!(pages.len(), 2);
    }

    #[test]
    fn insert_flattens_and_updates_count() {
        let mut doc = sample_document();
        let new_dict = dictionary! { "Type" => Object::Name(b"Page".to_vec()) };
        doc.insert_page(1, new_dict).unwrap();
        assert_eq!(doc.get_pages().len(), 3);
        assert!(doc.warnings().iter().any(|w| w.kind == WarningKind::PageTreeFlattened));
    }

    #[test]
    fn remove_out_of_range_errors() {
        let mut doc = sample_document();
        assert!(doc.remove_page(99).is_err());
    }
}
