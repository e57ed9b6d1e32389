//! A PDF document-processing core: parsing (classic xref tables, xref
//! streams, and brute-force recovery), an in-memory object graph with lazy
//! indirect-reference resolution, a writer supporting both full rewrites and
//! signature-preserving incremental updates, and a password-based Standard
//! Security Handler covering encryption revisions 2 through 6.

pub mod bytes;
pub mod destinations;
pub mod document;
pub mod encoding;
pub mod encryption;
pub mod error;
pub mod object;
pub mod object_stream;
pub mod pages;
pub(crate) mod parser;
pub mod reader;
pub mod writer;
pub mod xref;

pub use destinations::Destination;
pub use document::{Document, IncrementalDocument, Warning, WarningKind};
pub use encryption::{EncryptionState, Permissions};
pub use error::{Error, EncryptionError, ParseError, RangeError, Result, XrefError};
pub use object::{Dictionary, Object, ObjectId, Stream, StringFormat};
pub use reader::PdfMetadata;
pub use writer::{
    calculate_byte_range, create_byte_range_placeholder, create_contents_placeholder, extract_signed_bytes,
    find_placeholders, patch_byte_range, patch_contents, Credentials, LoadOptions, LoadOptionsBuilder,
    PlaceholderLocations, SaveOptions, SaveOptionsBuilder, DEFAULT_ESTIMATED_SIGNATURE_SIZE,
};
pub use xref::{Xref, XrefEntry, XrefType};
