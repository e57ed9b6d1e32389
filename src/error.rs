use thiserror::Error;

use crate::object::ObjectId;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum XrefError {
    #[error("could not locate startxref")]
    Start,
    #[error("could not locate a /Prev xref section")]
    PrevStart,
    #[error("could not locate a hybrid-reference /XRefStm section")]
    StreamStart,
    #[error("xref table or stream is structurally invalid")]
    Invalid,
}

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("missing or unparseable %PDF- header")]
    InvalidFileHeader,
    #[error("xref section is malformed")]
    InvalidXref,
    #[error("trailer dictionary is malformed")]
    InvalidTrailer,
    #[error("object stream is malformed")]
    InvalidObjectStream,
    #[error("unexpected end of input")]
    EndOfInput,
    #[error("content nesting too deep")]
    TooDeeplyNested,
}

#[derive(Debug, Error)]
pub enum EncryptionError {
    #[error("/Filter is not /Standard")]
    UnsupportedFilter,
    #[error("unsupported /V {v} / /R {r} combination")]
    UnsupportedVersion { v: i64, r: i64 },
    #[error("/Encrypt dictionary is structurally invalid: {0}")]
    DictInvalid(&'static str),
    #[error("no credentials supplied for an encrypted document")]
    NeedCredentials,
    #[error("supplied password did not authenticate")]
    InvalidCredentials,
    #[error("decryption failed for object {0:?} (padding or integrity check failed)")]
    DecryptionFailed(ObjectId),
    #[error("/Perms verification failed")]
    PermsInvalid,
}

#[derive(Debug, Error)]
pub enum RangeError {
    #[error("page index {index} out of range (0..{len})")]
    PageIndex { index: usize, len: usize },
    #[error("object index out of range")]
    ObjectIndex,
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Xref(#[from] XrefError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Encryption(#[from] EncryptionError),

    #[error(transparent)]
    Range(#[from] RangeError),

    #[error("expected {expected}, found {found}")]
    ObjectType {
        expected: &'static str,
        found: &'static str,
    },

    #[error("dictionary has no such key")]
    DictKey,

    #[error("no /Root entry in any trailer")]
    MissingCatalog,

    #[error("no xref entry for the requested object")]
    MissingXrefEntry,

    #[error("invalid byte offset {0}")]
    InvalidOffset(usize),

    #[error("reference cycle detected while resolving {0:?}")]
    ReferenceCycle(ObjectId),

    #[error("malformed indirect object at offset {offset}")]
    IndirectObject { offset: usize },

    #[error("object id in stream does not match expected id")]
    ObjectIdMismatch,

    #[error("invalid stream: {0}")]
    InvalidStream(String),

    #[error("numeric conversion failed: {0}")]
    NumericCast(String),

    #[error("unsupported stream filter {0}")]
    UnsupportedFilter(String),

    #[error("incremental save refused: document is linearized")]
    LinearizedIncrementalRefused,

    #[error("incremental save refused: document was recovered via brute-force scan")]
    RecoveredIncrementalRefused,

    #[error("incremental save refused: encryption configuration changed")]
    EncryptionChangedIncrementalRefused,

    #[error("placeholder search failed: {0}")]
    PlaceholderNotFound(&'static str),

    #[error("multiple unmatched signature placeholders found; ambiguous")]
    AmbiguousPlaceholder,

    #[error("feature not implemented: {0}")]
    Unimplemented(&'static str),
}
