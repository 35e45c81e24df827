//! Minimal SCIP encoder.
//!
//! Produces the same protobuf wire format [`super::decode`] reads. Used to
//! build fixtures and small synthetic indexes; it only knows the fields the
//! decoder consumes.

use super::SymbolRoles;

fn put_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            buf.push(byte);
            return;
        }
        buf.push(byte | 0x80);
    }
}

fn put_key(buf: &mut Vec<u8>, field: u32, wire_type: u8) {
    put_varint(buf, (u64::from(field) << 3) | u64::from(wire_type));
}

fn put_bytes(buf: &mut Vec<u8>, field: u32, bytes: &[u8]) {
    put_key(buf, field, 2);
    put_varint(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

fn put_str(buf: &mut Vec<u8>, field: u32, value: &str) {
    if !value.is_empty() {
        put_bytes(buf, field, value.as_bytes());
    }
}

fn put_int32(buf: &mut Vec<u8>, field: u32, value: i32) {
    if value != 0 {
        put_key(buf, field, 0);
        // int32 is sign-extended on the wire.
        put_varint(buf, value as i64 as u64);
    }
}

fn put_bool(buf: &mut Vec<u8>, field: u32, value: bool) {
    if value {
        put_key(buf, field, 0);
        put_varint(buf, 1);
    }
}

fn put_packed(buf: &mut Vec<u8>, field: u32, values: &[i32]) {
    if values.is_empty() {
        return;
    }
    let mut packed = Vec::new();
    for value in values {
        put_varint(&mut packed, *value as i64 as u64);
    }
    put_bytes(buf, field, &packed);
}

/// Builder for a complete `Index` message.
#[derive(Debug, Default)]
pub struct IndexWriter {
    buf: Vec<u8>,
}

impl IndexWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `Metadata` with tool information and the project root URI.
    pub fn metadata(mut self, tool_name: &str, tool_version: &str, project_root: &str) -> Self {
        let mut tool = Vec::new();
        put_str(&mut tool, 1, tool_name);
        put_str(&mut tool, 2, tool_version);

        let mut metadata = Vec::new();
        put_bytes(&mut metadata, 2, &tool);
        put_str(&mut metadata, 3, project_root);
        // UTF-8 text encoding.
        put_int32(&mut metadata, 4, 1);
        put_bytes(&mut self.buf, 1, &metadata);
        self
    }

    pub fn document(mut self, document: DocumentBuilder) -> Self {
        put_bytes(&mut self.buf, 2, &document.encode());
        self
    }

    pub fn external_symbol(mut self, symbol: SymbolBuilder) -> Self {
        put_bytes(&mut self.buf, 3, &symbol.encode());
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}

/// Builder for one `Document`.
#[derive(Debug, Default)]
pub struct DocumentBuilder {
    relative_path: String,
    language: Option<String>,
    symbols: Vec<SymbolBuilder>,
    occurrences: Vec<OccurrenceBuilder>,
}

impl DocumentBuilder {
    pub fn new(relative_path: impl Into<String>) -> Self {
        Self {
            relative_path: relative_path.into(),
            ..Self::default()
        }
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn symbol(mut self, symbol: SymbolBuilder) -> Self {
        self.symbols.push(symbol);
        self
    }

    pub fn occurrence(mut self, occurrence: OccurrenceBuilder) -> Self {
        self.occurrences.push(occurrence);
        self
    }

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        put_str(&mut buf, 1, &self.relative_path);
        for occurrence in &self.occurrences {
            put_bytes(&mut buf, 2, &occurrence.encode());
        }
        for symbol in &self.symbols {
            put_bytes(&mut buf, 3, &symbol.encode());
        }
        if let Some(language) = &self.language {
            put_str(&mut buf, 4, language);
        }
        buf
    }
}

#[derive(Debug, Clone, Default)]
struct Relationship {
    symbol: String,
    is_reference: bool,
    is_implementation: bool,
    is_type_definition: bool,
    is_definition: bool,
}

impl Relationship {
    fn to(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Self::default()
        }
    }
}

/// Builder for one `SymbolInformation`.
#[derive(Debug, Clone, Default)]
pub struct SymbolBuilder {
    symbol: String,
    documentation: Vec<String>,
    relationships: Vec<Relationship>,
    display_name: Option<String>,
    signature: Option<String>,
    enclosing_symbol: Option<String>,
}

impl SymbolBuilder {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            ..Self::default()
        }
    }

    pub fn documentation(mut self, text: impl Into<String>) -> Self {
        self.documentation.push(text.into());
        self
    }

    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Signature text, stored as `signature_documentation.text`.
    pub fn signature(mut self, text: impl Into<String>) -> Self {
        self.signature = Some(text.into());
        self
    }

    pub fn enclosing(mut self, symbol: impl Into<String>) -> Self {
        self.enclosing_symbol = Some(symbol.into());
        self
    }

    /// `is_implementation` relationship: this symbol extends, implements or overrides `parent`.
    pub fn implementation(self, parent: impl Into<String>) -> Self {
        self.relationship(Relationship {
            is_implementation: true,
            ..Relationship::to(parent)
        })
    }

    pub fn reference(self, target: impl Into<String>) -> Self {
        self.relationship(Relationship {
            is_reference: true,
            ..Relationship::to(target)
        })
    }

    pub fn type_definition(self, target: impl Into<String>) -> Self {
        self.relationship(Relationship {
            is_type_definition: true,
            ..Relationship::to(target)
        })
    }

    /// `is_definition` relationship: this symbol's definition also defines `target`.
    pub fn defines(self, target: impl Into<String>) -> Self {
        self.relationship(Relationship {
            is_definition: true,
            ..Relationship::to(target)
        })
    }

    fn relationship(mut self, relationship: Relationship) -> Self {
        self.relationships.push(relationship);
        self
    }

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        put_str(&mut buf, 1, &self.symbol);
        for text in &self.documentation {
            put_str(&mut buf, 3, text);
        }
        for rel in &self.relationships {
            let mut encoded = Vec::new();
            put_str(&mut encoded, 1, &rel.symbol);
            put_bool(&mut encoded, 2, rel.is_reference);
            put_bool(&mut encoded, 3, rel.is_implementation);
            put_bool(&mut encoded, 4, rel.is_type_definition);
            put_bool(&mut encoded, 5, rel.is_definition);
            put_bytes(&mut buf, 4, &encoded);
        }
        if let Some(name) = &self.display_name {
            put_str(&mut buf, 6, name);
        }
        if let Some(signature) = &self.signature {
            let mut doc = Vec::new();
            put_str(&mut doc, 5, signature);
            put_bytes(&mut buf, 7, &doc);
        }
        if let Some(enclosing) = &self.enclosing_symbol {
            put_str(&mut buf, 8, enclosing);
        }
        buf
    }
}

/// Builder for one `Occurrence`. Ranges use SCIP's zero-based encoding.
#[derive(Debug, Clone)]
pub struct OccurrenceBuilder {
    symbol: String,
    range: Vec<i32>,
    roles: u32,
    enclosing_range: Vec<i32>,
}

impl OccurrenceBuilder {
    pub fn definition(symbol: impl Into<String>, range: impl AsRef<[i32]>) -> Self {
        Self::with_raw_range(symbol, range.as_ref().to_vec(), SymbolRoles::DEFINITION)
    }

    pub fn reference(symbol: impl Into<String>, range: impl AsRef<[i32]>) -> Self {
        Self::with_raw_range(symbol, range.as_ref().to_vec(), 0)
    }

    /// Occurrence with arbitrary range values, including invalid ones.
    pub fn with_raw_range(symbol: impl Into<String>, range: Vec<i32>, roles: u32) -> Self {
        Self {
            symbol: symbol.into(),
            range,
            roles,
            enclosing_range: Vec::new(),
        }
    }

    /// Add role bits, e.g. [`SymbolRoles::WRITE_ACCESS`].
    pub fn roles(mut self, roles: u32) -> Self {
        self.roles |= roles;
        self
    }

    pub fn enclosing(mut self, range: impl AsRef<[i32]>) -> Self {
        self.enclosing_range = range.as_ref().to_vec();
        self
    }

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        put_packed(&mut buf, 1, &self.range);
        put_str(&mut buf, 2, &self.symbol);
        put_int32(&mut buf, 3, self.roles as i32);
        put_packed(&mut buf, 7, &self.enclosing_range);
        buf
    }
}
