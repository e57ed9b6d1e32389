//! Document serialization: full rewrites, incremental updates, and the
//! signing-assistance placeholder helpers built on top of both.

mod full;
mod incremental;
mod options;
mod placeholder;
mod xref_writer;

pub use options::{Credentials, LoadOptions, LoadOptionsBuilder, SaveOptions, SaveOptionsBuilder};
pub use placeholder::{
    calculate_byte_range, create_byte_range_placeholder, create_contents_placeholder, extract_signed_bytes,
    find_placeholders, patch_byte_range, patch_contents, PlaceholderLocations, DEFAULT_ESTIMATED_SIGNATURE_SIZE,
};
