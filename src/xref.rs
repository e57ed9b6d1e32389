use std::collections::BTreeMap;

/// How the most-recently-parsed xref section was encoded on disk, so an
/// incremental save can match the newest section's format by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrefType {
    CrossReferenceTable,
    CrossReferenceStream,
}

/// One cross-reference table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrefEntry {
    /// Part of the free-object linked list; `next_free`/`generation` are the
    /// exact fields stored in a classic xref free record.
    Free { next_free: u32, generation: u16 },
    /// A free entry whose `next_free` could not be resolved as belonging to a
    /// further free record (e.g. invented during brute-force recovery, or
    /// object 0's self-referential terminator).
    UnusableFree,
    /// A live, in-use object at the given byte offset.
    Normal { offset: u32, generation: u16 },
    /// An object compressed inside an object stream.
    Compressed { container: u32, index: u32 },
}

/// The effective cross-reference table: one section merged with its `/Prev`
/// chain, later sections overriding earlier ones.
#[derive(Debug, Clone)]
pub struct Xref {
    pub entries: BTreeMap<u32, XrefEntry>,
    pub size: u32,
    pub xref_type: XrefType,
}

impl Xref {
    pub fn new(size: u32, xref_type: XrefType) -> Self {
        Xref {
            entries: BTreeMap::new(),
            size,
            xref_type,
        }
    }

    pub fn insert(&mut self, object_number: u32, entry: XrefEntry) -> Option<XrefEntry> {
        self.entries.insert(object_number, entry)
    }

    pub fn get(&self, object_number: u32) -> Option<&XrefEntry> {
        self.entries.get(&object_number)
    }

    pub fn max_id(&self) -> u32 {
        self.entries.keys().next_back().copied().unwrap_or(0)
    }

    /// Merge an earlier (`/Prev`) section into this one. Entries already
    /// present in `self` win; `other`'s entries fill in the gaps.
    pub fn merge(&mut self, other: Xref) {
        for (id, entry) in other.entries {
            self.entries.entry(id).or_insert(entry);
        }
        if other.size > self.size {
            self.size = other.size;
        }
    }

    /// Same as [`merge`](Self::merge) but takes the other table by reference;
    /// used when the hybrid-reference `/XRefStm` section must be folded in
    /// without consuming it.
    pub fn extend(&mut self, other: Xref) {
        self.merge(other);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&u32, &XrefEntry)> {
        self.entries.iter()
    }
}
