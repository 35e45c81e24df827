//! Decoder for SCIP (`index.scip`) structural-facts streams.
//!
//! A SCIP index is a protobuf `Index` message: optional metadata, a list of
//! documents (each carrying symbol information and occurrences) and a list of
//! external symbols. [`decode`] walks the top-level fields lazily and yields
//! one [`FactRecord`] at a time; a document is decoded as a unit and its
//! records are then handed out in order (document header, symbols each
//! followed by their relationships, occurrences).
//!
//! # Example
//!
//! ```
//! use fathom_index::scip::{self, FactRecord};
//!
//! # fn example(bytes: &[u8]) -> Result<(), fathom_index::scip::MalformedStreamError> {
//! for record in scip::decode(bytes) {
//!     if let FactRecord::Document(doc) = record? {
//!         println!("{}", doc.relative_path);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod encode;
mod wire;

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use wire::{WireReader, WireType};

/// A stream that does not conform to the SCIP schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed SCIP stream at byte {offset}: {kind}")]
pub struct MalformedStreamError {
    /// Absolute byte offset where the problem was detected.
    pub offset: usize,
    pub kind: MalformedKind,
}

impl MalformedStreamError {
    pub fn new(offset: usize, kind: MalformedKind) -> Self {
        Self { offset, kind }
    }
}

/// What exactly was wrong with a malformed stream.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedKind {
    #[error("truncated varint")]
    TruncatedVarint,

    #[error("varint exceeds 64 bits")]
    VarintOverflow,

    #[error("length prefix of {declared} bytes exceeds the {remaining} bytes left in the frame")]
    LengthOverrun { declared: u64, remaining: usize },

    #[error("fixed-width value truncated")]
    TruncatedFixed,

    #[error("invalid wire type {0}")]
    InvalidWireType(u8),

    #[error("unexpected wire type {0} for field")]
    UnexpectedWireType(u8),

    #[error("field number 0 is reserved")]
    ZeroFieldNumber,

    #[error("field number out of range")]
    FieldNumberOverflow,

    #[error("missing required field {message}.{field}")]
    MissingField {
        message: &'static str,
        field: &'static str,
    },

    #[error("invalid {name} value {value}")]
    InvalidEnum { name: &'static str, value: i32 },

    #[error("range must have 3 or 4 elements, found {0}")]
    InvalidRange(usize),

    #[error("negative position {0} in range")]
    NegativePosition(i32),

    #[error("string is not valid UTF-8")]
    InvalidUtf8,
}

/// SCIP `SymbolRole` bitmask carried by an occurrence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SymbolRoles(pub u32);

impl SymbolRoles {
    pub const DEFINITION: u32 = 0x1;
    pub const IMPORT: u32 = 0x2;
    pub const WRITE_ACCESS: u32 = 0x4;
    pub const READ_ACCESS: u32 = 0x8;
    pub const GENERATED: u32 = 0x10;
    pub const TEST: u32 = 0x20;
    pub const FORWARD_DEFINITION: u32 = 0x40;

    pub fn contains(self, role: u32) -> bool {
        self.0 & role != 0
    }

    pub fn is_definition(self) -> bool {
        self.contains(Self::DEFINITION)
    }

    /// Same roles with the definition bit cleared.
    pub fn without_definition(self) -> Self {
        Self(self.0 & !Self::DEFINITION)
    }
}

/// Zero-based source range as stored in SCIP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceRange {
    pub start_line: u32,
    pub start_character: u32,
    pub end_line: u32,
    pub end_character: u32,
}

impl SourceRange {
    /// Build from the SCIP encoding: `[line, start, end]` or
    /// `[start_line, start, end_line, end]`.
    fn from_scip(values: &[i32], offset: usize) -> Result<Self, MalformedStreamError> {
        if let Some(&negative) = values.iter().find(|v| **v < 0) {
            return Err(MalformedStreamError::new(
                offset,
                MalformedKind::NegativePosition(negative),
            ));
        }
        let v: Vec<u32> = values.iter().map(|v| *v as u32).collect();
        match v.as_slice() {
            [line, start, end] => Ok(Self {
                start_line: *line,
                start_character: *start,
                end_line: *line,
                end_character: *end,
            }),
            [start_line, start, end_line, end] => Ok(Self {
                start_line: *start_line,
                start_character: *start,
                end_line: *end_line,
                end_character: *end,
            }),
            other => Err(MalformedStreamError::new(
                offset,
                MalformedKind::InvalidRange(other.len()),
            )),
        }
    }

    pub fn start(&self) -> (u32, u32) {
        (self.start_line, self.start_character)
    }

    pub fn end(&self) -> (u32, u32) {
        (self.end_line, self.end_character)
    }

    /// Whether `other` starts inside this range (end inclusive).
    pub fn contains_start_of(&self, other: &SourceRange) -> bool {
        self.start() <= other.start() && other.start() <= self.end()
    }
}

/// `Metadata.text_document_encoding`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextEncoding {
    #[default]
    Unspecified,
    Utf8,
    Utf16,
}

/// `Document.position_encoding`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionEncoding {
    #[default]
    Unspecified,
    Utf8CodeUnit,
    Utf16CodeUnit,
    Utf32CodeUnit,
}

/// Index-level metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexMetadata {
    pub tool_name: Option<String>,
    pub tool_version: Option<String>,
    pub tool_arguments: Vec<String>,
    pub project_root: Option<String>,
    pub text_encoding: TextEncoding,
}

/// Header of one source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentRecord {
    pub relative_path: String,
    pub language: Option<String>,
    pub position_encoding: PositionEncoding,
}

/// `SymbolInformation`, without its relationships (emitted separately).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolRecord {
    /// Owning document, `None` for external symbols.
    pub document: Option<String>,
    pub symbol: String,
    pub documentation: Vec<String>,
    pub display_name: Option<String>,
    /// Text of the signature documentation, when the indexer emits one.
    pub signature: Option<String>,
    pub enclosing_symbol: Option<String>,
}

/// One `Relationship` entry of a `SymbolInformation`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationshipRecord {
    pub document: Option<String>,
    /// The symbol whose information carries the relationship.
    pub from: String,
    /// The related symbol.
    pub to: String,
    pub is_reference: bool,
    pub is_implementation: bool,
    pub is_type_definition: bool,
    pub is_definition: bool,
}

/// A located mention of a symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccurrenceRecord {
    pub document: String,
    pub symbol: String,
    pub range: SourceRange,
    pub roles: SymbolRoles,
    pub enclosing_range: Option<SourceRange>,
    pub override_documentation: Vec<String>,
}

/// One typed record decoded from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactRecord {
    Metadata(IndexMetadata),
    Document(DocumentRecord),
    Symbol(SymbolRecord),
    Relationship(RelationshipRecord),
    Occurrence(OccurrenceRecord),
}

/// Lazy record sequence over a SCIP byte blob.
///
/// Finite and not restartable. After the first error it yields nothing more.
pub struct FactStream<'a> {
    reader: WireReader<'a>,
    pending: VecDeque<FactRecord>,
    failed: bool,
}

/// Start decoding `bytes` as a SCIP `Index`.
pub fn decode(bytes: &[u8]) -> FactStream<'_> {
    FactStream {
        reader: WireReader::new(bytes),
        pending: VecDeque::new(),
        failed: false,
    }
}

/// Decode a whole stream eagerly.
pub fn decode_all(bytes: &[u8]) -> Result<Vec<FactRecord>, MalformedStreamError> {
    decode(bytes).collect()
}

impl Iterator for FactStream<'_> {
    type Item = Result<FactRecord, MalformedStreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(record) = self.pending.pop_front() {
                return Some(Ok(record));
            }
            if self.failed || self.reader.is_empty() {
                return None;
            }
            if let Err(err) = self.advance() {
                self.failed = true;
                self.pending.clear();
                return Some(Err(err));
            }
        }
    }
}

impl FactStream<'_> {
    /// Decode the next top-level `Index` field into `pending`.
    fn advance(&mut self) -> Result<(), MalformedStreamError> {
        let (field, wire_type) = self.reader.read_tag()?;
        match field {
            1 => {
                self.reader.expect(wire_type, WireType::Len)?;
                let mut msg = self.reader.read_message()?;
                let metadata = decode_metadata(&mut msg)?;
                self.pending.push_back(FactRecord::Metadata(metadata));
            }
            2 => {
                self.reader.expect(wire_type, WireType::Len)?;
                let mut msg = self.reader.read_message()?;
                decode_document(&mut msg, &mut self.pending)?;
            }
            3 => {
                self.reader.expect(wire_type, WireType::Len)?;
                let mut msg = self.reader.read_message()?;
                let (symbol, relationships) = decode_symbol_information(&mut msg)?;
                self.pending.push_back(FactRecord::Symbol(symbol));
                self.pending
                    .extend(relationships.into_iter().map(FactRecord::Relationship));
            }
            _ => self.reader.skip(wire_type)?,
        }
        Ok(())
    }
}

fn closed_enum(
    reader: &WireReader<'_>,
    name: &'static str,
    value: i32,
    max: i32,
) -> Result<i32, MalformedStreamError> {
    if (0..=max).contains(&value) {
        Ok(value)
    } else {
        Err(reader.error(MalformedKind::InvalidEnum { name, value }))
    }
}

fn decode_metadata(msg: &mut WireReader<'_>) -> Result<IndexMetadata, MalformedStreamError> {
    let mut metadata = IndexMetadata::default();
    while !msg.is_empty() {
        let (field, wire_type) = msg.read_tag()?;
        match field {
            1 => {
                msg.expect(wire_type, WireType::Varint)?;
                let version = msg.read_int32()?;
                // `UnspecifiedProtocolVersion` is the only version SCIP defines.
                closed_enum(msg, "ProtocolVersion", version, 0)?;
            }
            2 => {
                msg.expect(wire_type, WireType::Len)?;
                let mut tool = msg.read_message()?;
                while !tool.is_empty() {
                    let (field, wire_type) = tool.read_tag()?;
                    match field {
                        1 => {
                            tool.expect(wire_type, WireType::Len)?;
                            metadata.tool_name = Some(tool.read_string()?);
                        }
                        2 => {
                            tool.expect(wire_type, WireType::Len)?;
                            metadata.tool_version = Some(tool.read_string()?);
                        }
                        3 => {
                            tool.expect(wire_type, WireType::Len)?;
                            metadata.tool_arguments.push(tool.read_string()?);
                        }
                        _ => tool.skip(wire_type)?,
                    }
                }
            }
            3 => {
                msg.expect(wire_type, WireType::Len)?;
                metadata.project_root = Some(msg.read_string()?);
            }
            4 => {
                msg.expect(wire_type, WireType::Varint)?;
                let value = msg.read_int32()?;
                metadata.text_encoding = match closed_enum(msg, "TextEncoding", value, 2)? {
                    1 => TextEncoding::Utf8,
                    2 => TextEncoding::Utf16,
                    _ => TextEncoding::Unspecified,
                };
            }
            _ => msg.skip(wire_type)?,
        }
    }
    Ok(metadata)
}

fn decode_document(
    msg: &mut WireReader<'_>,
    out: &mut VecDeque<FactRecord>,
) -> Result<(), MalformedStreamError> {
    let start = msg.offset();
    let mut relative_path = String::new();
    let mut language = None;
    let mut position_encoding = PositionEncoding::Unspecified;
    let mut symbols = Vec::new();
    let mut occurrences = Vec::new();

    while !msg.is_empty() {
        let (field, wire_type) = msg.read_tag()?;
        match field {
            1 => {
                msg.expect(wire_type, WireType::Len)?;
                relative_path = msg.read_string()?;
            }
            2 => {
                msg.expect(wire_type, WireType::Len)?;
                let mut occ = msg.read_message()?;
                occurrences.push(decode_occurrence(&mut occ)?);
            }
            3 => {
                msg.expect(wire_type, WireType::Len)?;
                let mut info = msg.read_message()?;
                symbols.push(decode_symbol_information(&mut info)?);
            }
            4 => {
                msg.expect(wire_type, WireType::Len)?;
                language = Some(msg.read_string()?);
            }
            6 => {
                msg.expect(wire_type, WireType::Varint)?;
                let value = msg.read_int32()?;
                position_encoding = match closed_enum(msg, "PositionEncoding", value, 3)? {
                    1 => PositionEncoding::Utf8CodeUnit,
                    2 => PositionEncoding::Utf16CodeUnit,
                    3 => PositionEncoding::Utf32CodeUnit,
                    _ => PositionEncoding::Unspecified,
                };
            }
            _ => msg.skip(wire_type)?,
        }
    }

    if relative_path.is_empty() {
        return Err(MalformedStreamError::new(
            start,
            MalformedKind::MissingField {
                message: "Document",
                field: "relative_path",
            },
        ));
    }

    out.push_back(FactRecord::Document(DocumentRecord {
        relative_path: relative_path.clone(),
        language,
        position_encoding,
    }));
    for (mut symbol, relationships) in symbols {
        symbol.document = Some(relative_path.clone());
        out.push_back(FactRecord::Symbol(symbol));
        for mut relationship in relationships {
            relationship.document = Some(relative_path.clone());
            out.push_back(FactRecord::Relationship(relationship));
        }
    }
    for (occurrence_symbol, range, roles, enclosing_range, override_documentation) in occurrences {
        out.push_back(FactRecord::Occurrence(OccurrenceRecord {
            document: relative_path.clone(),
            symbol: occurrence_symbol,
            range,
            roles,
            enclosing_range,
            override_documentation,
        }));
    }
    Ok(())
}

type DecodedOccurrence = (String, SourceRange, SymbolRoles, Option<SourceRange>, Vec<String>);

fn decode_occurrence(msg: &mut WireReader<'_>) -> Result<DecodedOccurrence, MalformedStreamError> {
    let start = msg.offset();
    let mut range = Vec::new();
    let mut enclosing = Vec::new();
    let mut symbol = String::new();
    let mut roles = SymbolRoles::default();
    let mut override_documentation = Vec::new();

    while !msg.is_empty() {
        let (field, wire_type) = msg.read_tag()?;
        match field {
            1 => msg.read_repeated_int32(wire_type, &mut range)?,
            2 => {
                msg.expect(wire_type, WireType::Len)?;
                symbol = msg.read_string()?;
            }
            3 => {
                msg.expect(wire_type, WireType::Varint)?;
                roles = SymbolRoles(msg.read_int32()? as u32);
            }
            4 => {
                msg.expect(wire_type, WireType::Len)?;
                override_documentation.push(msg.read_string()?);
            }
            7 => msg.read_repeated_int32(wire_type, &mut enclosing)?,
            _ => msg.skip(wire_type)?,
        }
    }

    if symbol.is_empty() {
        return Err(MalformedStreamError::new(
            start,
            MalformedKind::MissingField {
                message: "Occurrence",
                field: "symbol",
            },
        ));
    }
    let range = SourceRange::from_scip(&range, start)?;
    let enclosing_range = if enclosing.is_empty() {
        None
    } else {
        Some(SourceRange::from_scip(&enclosing, start)?)
    };
    Ok((symbol, range, roles, enclosing_range, override_documentation))
}

fn decode_symbol_information(
    msg: &mut WireReader<'_>,
) -> Result<(SymbolRecord, Vec<RelationshipRecord>), MalformedStreamError> {
    let start = msg.offset();
    let mut record = SymbolRecord {
        document: None,
        symbol: String::new(),
        documentation: Vec::new(),
        display_name: None,
        signature: None,
        enclosing_symbol: None,
    };
    let mut relationships = Vec::new();

    while !msg.is_empty() {
        let (field, wire_type) = msg.read_tag()?;
        match field {
            1 => {
                msg.expect(wire_type, WireType::Len)?;
                record.symbol = msg.read_string()?;
            }
            3 => {
                msg.expect(wire_type, WireType::Len)?;
                record.documentation.push(msg.read_string()?);
            }
            4 => {
                msg.expect(wire_type, WireType::Len)?;
                let mut rel = msg.read_message()?;
                relationships.push(decode_relationship(&mut rel)?);
            }
            6 => {
                msg.expect(wire_type, WireType::Len)?;
                record.display_name = Some(msg.read_string()?);
            }
            7 => {
                msg.expect(wire_type, WireType::Len)?;
                let mut doc = msg.read_message()?;
                record.signature = decode_signature_text(&mut doc)?;
            }
            8 => {
                msg.expect(wire_type, WireType::Len)?;
                record.enclosing_symbol = Some(msg.read_string()?);
            }
            _ => msg.skip(wire_type)?,
        }
    }

    if record.symbol.is_empty() {
        return Err(MalformedStreamError::new(
            start,
            MalformedKind::MissingField {
                message: "SymbolInformation",
                field: "symbol",
            },
        ));
    }
    for relationship in &mut relationships {
        relationship.from = record.symbol.clone();
    }
    Ok((record, relationships))
}

/// Pull `Document.text` out of a `signature_documentation` message.
fn decode_signature_text(msg: &mut WireReader<'_>) -> Result<Option<String>, MalformedStreamError> {
    let mut text = None;
    while !msg.is_empty() {
        let (field, wire_type) = msg.read_tag()?;
        if field == 5 {
            msg.expect(wire_type, WireType::Len)?;
            text = Some(msg.read_string()?).filter(|t| !t.is_empty());
        } else {
            msg.skip(wire_type)?;
        }
    }
    Ok(text)
}

fn decode_relationship(
    msg: &mut WireReader<'_>,
) -> Result<RelationshipRecord, MalformedStreamError> {
    let start = msg.offset();
    let mut record = RelationshipRecord {
        document: None,
        from: String::new(),
        to: String::new(),
        is_reference: false,
        is_implementation: false,
        is_type_definition: false,
        is_definition: false,
    };
    while !msg.is_empty() {
        let (field, wire_type) = msg.read_tag()?;
        match field {
            1 => {
                msg.expect(wire_type, WireType::Len)?;
                record.to = msg.read_string()?;
            }
            2..=5 => {
                msg.expect(wire_type, WireType::Varint)?;
                let flag = msg.read_bool()?;
                match field {
                    2 => record.is_reference = flag,
                    3 => record.is_implementation = flag,
                    4 => record.is_type_definition = flag,
                    _ => record.is_definition = flag,
                }
            }
            _ => msg.skip(wire_type)?,
        }
    }
    if record.to.is_empty() {
        return Err(MalformedStreamError::new(
            start,
            MalformedKind::MissingField {
                message: "Relationship",
                field: "symbol",
            },
        ));
    }
    Ok(record)
}
