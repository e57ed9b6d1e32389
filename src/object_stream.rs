//! Object streams (`/Type /ObjStm`): a single stream whose decoded payload
//! packs multiple logical objects, used by the xref-stream generation of PDF
//! as a space optimization. Reading is `ObjectStream`; writing (compaction)
//! is `ObjectStreamBuilder`.

use std::collections::BTreeMap;

use nom_locate::LocatedSpan;

use crate::error::{Error, ParseError, Result};
use crate::object::{Dictionary, Object, ObjectId, Stream};
use crate::parser;

/// The decoded contents of one object stream: every logical object it
/// contains, keyed by (object number, generation 0).
pub struct ObjectStream {
    pub objects: BTreeMap<ObjectId, Object>,
}

impl ObjectStream {
    pub fn new(stream: &mut Stream) -> Result<Self> {
        let data = stream.decompressed_content()?;

        let n = stream
            .dict
            .get(b"N")
            .and_then(Object::as_i64)
            .map_err(|_| Error::Parse(ParseError::InvalidObjectStream))? as usize;
        let first = stream
            .dict
            .get(b"First")
            .and_then(Object::as_i64)
            .map_err(|_| Error::Parse(ParseError::InvalidObjectStream))? as usize;

        let header_span = LocatedSpan::new_extra(&data[..first.min(data.len())], "objstm-header");
        let header_pairs = parser::object_stream_header(header_span, n)
            .ok_or(Error::Parse(ParseError::InvalidObjectStream))?;

        let mut objects = BTreeMap::new();
        for (i, (obj_num, rel_offset)) in header_pairs.iter().enumerate() {
            let start = first + rel_offset;
            if start > data.len() {
                continue;
            }
            let end = if i + 1 < header_pairs.len() {
                (first + header_pairs[i + 1].1).min(data.len())
            } else {
                data.len()
            };
            if start > end {
                continue;
            }
            let body_span = LocatedSpan::new_extra(&data[start..end], "objstm-body");
            if let Some(value) = parser::direct_object(body_span) {
                objects.insert((*obj_num, 0), value);
            }
        }

        Ok(ObjectStream { objects })
    }
}

/// Controls how [`ObjectStreamBuilder`] packs objects during a full rewrite.
#[derive(Debug, Clone)]
pub struct ObjectStreamConfig {
    /// Maximum number of objects packed into a single object stream.
    pub max_objects_per_stream: usize,
}

impl Default for ObjectStreamConfig {
    fn default() -> Self {
        ObjectStreamConfig { max_objects_per_stream: 200 }
    }
}

/// Packs plain (non-stream, non-encrypted-exempt) indirect objects into one
/// or more `/ObjStm` containers. Streams themselves, and anything the
/// security handler must leave untouched (the `/Encrypt` dict, xref streams),
/// are never eligible and must be filtered out by the caller before building.
pub struct ObjectStreamBuilder {
    config: ObjectStreamConfig,
}

/// One built object stream plus the xref-entry metadata its contained
/// objects need (container id is assigned by the caller once it knows the
/// next free object number).
pub struct BuiltObjectStream {
    pub dict: Dictionary,
    pub content: Vec<u8>,
    pub member_order: Vec<ObjectId>,
}

impl ObjectStreamBuilder {
    pub fn new(config: ObjectStreamConfig) -> Self {
        ObjectStreamBuilder { config }
    }

    /// Splits `objects` into one or more object streams, in ascending object
    /// number order within each chunk (deterministic output).
    pub fn build_object_streams(&self, objects: &BTreeMap<ObjectId, Object>) -> Vec<BuiltObjectStream> {
        let eligible: Vec<(ObjectId, &Object)> = objects
            .iter()
            .filter(|(_, obj)| !matches!(obj, Object::Stream(_)))
            .map(|(id, obj)| (*id, obj))
            .collect();

        eligible
            .chunks(self.config.max_objects_per_stream.max(1))
            .map(|chunk| self.build_one(chunk))
            .collect()
    }

    fn build_one(&self, chunk: &[(ObjectId, &Object)]) -> BuiltObjectStream {
        let mut header = Vec::new();
        let mut body = Vec::new();
        let mut member_order = Vec::new();

        for (id, obj) in chunk {
            let rel_offset = body.len();
            obj.write(&mut body);
            body.push(b'\n');
            header.extend_from_slice(format!("{} {} ", id.0, rel_offset).as_bytes());
            member_order.push(*id);
        }

        let first = header.len();
        let mut content = header;
        content.extend_from_slice(&body);

        let mut dict = Dictionary::new();
        dict.set("Type", Object::Name(b"ObjStm".to_vec()));
        dict.set("N", chunk.len() as i64);
        dict.set("First", first as i64);

        BuiltObjectStream {
            dict,
            content,
            member_order,
        }
    }
}
