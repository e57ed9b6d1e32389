//! Load/save configuration surface (spec §6): plain builder structs mirroring
//! the teacher's `SaveOptions::builder()...build()` shape.

/// Password credentials supplied to a load call. `None` (on the loader
/// methods that take it directly) or an absent `LoadOptions::credentials`
/// means "try the empty password".
#[derive(Debug, Clone)]
pub enum Credentials {
    PasswordBytes(Vec<u8>),
}

impl Credentials {
    pub fn password(s: impl Into<String>) -> Self {
        Credentials::PasswordBytes(s.into().into_bytes())
    }

    pub(crate) fn as_password_string(&self) -> String {
        match self {
            Credentials::PasswordBytes(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub credentials: Option<Credentials>,
    pub lenient: bool,
}

impl LoadOptions {
    pub fn builder() -> LoadOptionsBuilder {
        LoadOptionsBuilder::default()
    }
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions::builder().build()
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptionsBuilder {
    credentials: Option<Credentials>,
    lenient: Option<bool>,
}

impl LoadOptionsBuilder {
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn lenient(mut self, lenient: bool) -> Self {
        self.lenient = Some(lenient);
        self
    }

    pub fn build(self) -> LoadOptions {
        LoadOptions { credentials: self.credentials, lenient: self.lenient.unwrap_or(true) }
    }
}

/// How a save should be performed. `use_xref_stream: None` means "match the
/// loaded document's format for incremental saves, classic table for full
/// rewrites", per spec §6.
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    pub incremental: bool,
    pub use_xref_stream: Option<bool>,
}

impl SaveOptions {
    pub fn builder() -> SaveOptionsBuilder {
        SaveOptionsBuilder::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SaveOptionsBuilder {
    incremental: bool,
    use_xref_stream: Option<bool>,
}

impl SaveOptionsBuilder {
    pub fn incremental(mut self, incremental: bool) -> Self {
        self.incremental = incremental;
        self
    }

    pub fn use_xref_streams(mut self, use_xref_stream: bool) -> Self {
        self.use_xref_stream = Some(use_xref_stream);
        self
    }

    pub fn build(self) -> SaveOptions {
        SaveOptions { incremental: self.incremental, use_xref_stream: self.use_xref_stream }
    }
}
