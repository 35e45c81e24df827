//! Symbol graph for one ingested project.
//!
//! A [`ProjectGraph`] is an immutable snapshot built by
//! [`GraphBuilder`](crate::graph_builder::GraphBuilder) from one SCIP stream:
//!
//! - **Symbols**: every symbol with a definition occurrence, keyed by its
//!   canonical SCIP symbol string
//! - **Occurrences**: located mentions tagged with SCIP roles
//! - **Edges**: call, inheritance and reference relations between symbols
//!
//! The graph is indexed by exact id, by reversed descriptor segments (for
//! suffix lookup) and by edge endpoint in both directions. It is never
//! mutated after construction; re-ingest produces a new graph that replaces
//! the old one wholesale.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::descriptor::{self, DescriptorKind, ParsedSymbol};
use crate::scip::{IndexMetadata, MalformedStreamError, PositionEncoding, SymbolRoles};
use crate::suffix_index::{SegmentPattern, SuffixIndex};

/// Canonical symbol identifier (the SCIP symbol string; locals are scoped
/// to their document as `local <id>@<path>`).
pub type SymbolId = String;

/// Identifier of an ingested project.
pub type ProjectId = String;

/// Snapshot format written by [`ProjectGraph::to_snapshot`].
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Type of code symbol, derived from the final descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Namespace,
    Type,
    Method,
    Field,
    Parameter,
    TypeParameter,
    Meta,
    Macro,
    Local,
    Other,
}

impl SymbolKind {
    /// Display label for symbol kind.
    pub fn label(&self) -> &'static str {
        match self {
            SymbolKind::Namespace => "namespace",
            SymbolKind::Type => "type",
            SymbolKind::Method => "method",
            SymbolKind::Field => "field",
            SymbolKind::Parameter => "param",
            SymbolKind::TypeParameter => "type-param",
            SymbolKind::Meta => "meta",
            SymbolKind::Macro => "macro",
            SymbolKind::Local => "local",
            SymbolKind::Other => "symbol",
        }
    }

    /// Kind named by a final descriptor segment.
    pub fn from_descriptor(kind: DescriptorKind) -> Self {
        match kind {
            DescriptorKind::Namespace => SymbolKind::Namespace,
            DescriptorKind::Type => SymbolKind::Type,
            DescriptorKind::Term => SymbolKind::Field,
            DescriptorKind::Method => SymbolKind::Method,
            DescriptorKind::TypeParameter => SymbolKind::TypeParameter,
            DescriptorKind::Parameter => SymbolKind::Parameter,
            DescriptorKind::Meta => SymbolKind::Meta,
            DescriptorKind::Macro => SymbolKind::Macro,
        }
    }

    /// Kind of a raw SCIP symbol string.
    pub fn of_symbol(symbol: &str) -> Self {
        match descriptor::parse_symbol(symbol) {
            Ok(ParsedSymbol::Local { .. }) => SymbolKind::Local,
            Ok(parsed) => parsed
                .last()
                .map(|d| SymbolKind::from_descriptor(d.kind))
                .unwrap_or(SymbolKind::Other),
            Err(_) if descriptor::is_local(symbol) => SymbolKind::Local,
            Err(_) => SymbolKind::Other,
        }
    }

    /// Methods and macros; the only valid call targets.
    pub fn is_callable(&self) -> bool {
        matches!(self, SymbolKind::Method | SymbolKind::Macro)
    }
}

/// Relation kinds between symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EdgeKind {
    /// Caller invokes callee (caller -> callee)
    Call,
    /// Child extends, implements or overrides parent (child -> parent)
    Inheritance,
    /// General usage (user -> used)
    Reference,
}

impl EdgeKind {
    /// Lowercase name used in CLI flags and output.
    pub fn label(&self) -> &'static str {
        match self {
            EdgeKind::Call => "call",
            EdgeKind::Inheritance => "inheritance",
            EdgeKind::Reference => "reference",
        }
    }
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for EdgeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "call" | "calls" => Ok(EdgeKind::Call),
            "inheritance" | "inherits" => Ok(EdgeKind::Inheritance),
            "reference" | "references" => Ok(EdgeKind::Reference),
            other => Err(format!("unknown edge kind '{other}'")),
        }
    }
}

/// Which end of an edge a query starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Follow `source -> target` (callees, supertypes)
    Outgoing,
    /// Follow `target -> source` (callers, subtypes and overriders)
    Incoming,
}

impl FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "outgoing" | "out" => Ok(Direction::Outgoing),
            "incoming" | "in" => Ok(Direction::Incoming),
            other => Err(format!("unknown direction '{other}'")),
        }
    }
}

/// Source span. Lines and columns are 1-indexed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    /// Document path relative to the project root.
    pub path: String,
    /// First line (1-indexed).
    pub start_line: usize,
    /// Last line (1-indexed, inclusive).
    pub end_line: usize,
    /// First column (1-indexed).
    pub start_column: usize,
    /// Column after the last character (1-indexed).
    pub end_column: usize,
}

impl Location {
    /// Convert a zero-based SCIP range.
    pub fn from_range(path: impl Into<String>, range: &crate::scip::SourceRange) -> Self {
        Self {
            path: path.into(),
            start_line: range.start_line as usize + 1,
            end_line: range.end_line as usize + 1,
            start_column: range.start_character as usize + 1,
            end_column: range.end_character as usize + 1,
        }
    }

    /// Ordering used everywhere results must be deterministic.
    pub fn sort_key(&self) -> (&str, usize, usize) {
        (&self.path, self.start_line, self.start_column)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.path, self.start_line, self.start_column)
    }
}

/// A symbol defined in the project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    /// Full SCIP symbol string.
    pub id: SymbolId,
    /// Last descriptor name, or the indexer's display name when given
    pub name: String,
    /// Kind derived from the final descriptor.
    pub kind: SymbolKind,
    /// Location of the (first) definition occurrence
    pub location: Location,
    /// Documentation blocks, joined with blank lines.
    pub documentation: Option<String>,
    /// Signature text from `signature_documentation`.
    pub signature: Option<String>,
    /// Parameter count for callables, when the index lets us know it
    pub arity: Option<usize>,
    /// Owning symbol, when the indexer reports one.
    pub enclosing_symbol: Option<SymbolId>,
}

impl Symbol {
    /// Create a new symbol, deriving kind and name from the id.
    pub fn new(id: impl Into<SymbolId>, location: Location) -> Self {
        let id = id.into();
        let (kind, name) = match descriptor::parse_symbol(&id) {
            Ok(ParsedSymbol::Local { id: local }) => {
                // Scoped locals carry `@<path>` after the raw id.
                let local = local.split('@').next().unwrap_or(&local).to_string();
                (SymbolKind::Local, local)
            }
            Ok(parsed) => match parsed.last() {
                Some(last) => (SymbolKind::from_descriptor(last.kind), last.name.clone()),
                None => (SymbolKind::Other, id.clone()),
            },
            Err(_) => (SymbolKind::Other, id.clone()),
        };
        Self {
            id,
            name,
            kind,
            location,
            documentation: None,
            signature: None,
            arity: None,
            enclosing_symbol: None,
        }
    }

    /// Set the documentation text.
    pub fn with_documentation(mut self, doc: impl Into<String>) -> Self {
        self.documentation = Some(doc.into());
        self
    }

    /// Set the signature text.
    pub fn with_signature(mut self, sig: impl Into<String>) -> Self {
        self.signature = Some(sig.into());
        self
    }

    /// Override the derived name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the parameter count.
    pub fn with_arity(mut self, arity: usize) -> Self {
        self.arity = Some(arity);
        self
    }

    /// Set the owning symbol.
    pub fn with_enclosing(mut self, enclosing: SymbolId) -> Self {
        self.enclosing_symbol = Some(enclosing);
        self
    }
}

/// Primary role of an occurrence, in precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OccurrenceRole {
    Definition,
    Import,
    WriteAccess,
    ReadAccess,
    Reference,
}

/// A located mention of a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Occurrence {
    /// Symbol mentioned.
    pub symbol: SymbolId,
    /// Where it is mentioned.
    pub location: Location,
    /// Raw SCIP role bits.
    pub roles: SymbolRoles,
}

impl Occurrence {
    pub fn role(&self) -> OccurrenceRole {
        if self.roles.is_definition() {
            OccurrenceRole::Definition
        } else if self.roles.contains(SymbolRoles::IMPORT) {
            OccurrenceRole::Import
        } else if self.roles.contains(SymbolRoles::WRITE_ACCESS) {
            OccurrenceRole::WriteAccess
        } else if self.roles.contains(SymbolRoles::READ_ACCESS) {
            OccurrenceRole::ReadAccess
        } else {
            OccurrenceRole::Reference
        }
    }

    /// Whether the definition bit is set.
    pub fn is_definition(&self) -> bool {
        self.roles.is_definition()
    }
}

/// A directed relation between two symbols.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// Caller, child or user.
    pub source: SymbolId,
    /// Callee, parent or used symbol.
    pub target: SymbolId,
    /// Relation kind.
    pub kind: EdgeKind,
    /// Where the relation was observed (call site, or the child's definition)
    pub site: Location,
}

impl Edge {
    /// Create an edge found at `site`.
    pub fn new(
        source: impl Into<SymbolId>,
        target: impl Into<SymbolId>,
        kind: EdgeKind,
        site: Location,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            kind,
            site,
        }
    }

    /// The endpoint reached when walking this edge in `direction`.
    pub fn far_end(&self, direction: Direction) -> &SymbolId {
        match direction {
            Direction::Outgoing => &self.target,
            Direction::Incoming => &self.source,
        }
    }
}

/// A source document of the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentInfo {
    /// Path relative to the project root.
    pub path: String,
    /// Language reported by the indexer.
    pub language: Option<String>,
    /// Encoding the indexer used for column offsets.
    pub position_encoding: PositionEncoding,
    /// Occurrences recorded in this document.
    pub occurrence_count: usize,
}

/// An edge dropped because one endpoint is not a symbol of the project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DanglingEdge {
    /// Source symbol of the dropped edge.
    pub source: SymbolId,
    /// Target symbol of the dropped edge.
    pub target: SymbolId,
    /// Relation kind.
    pub kind: EdgeKind,
    /// The endpoint with no definition in the index.
    pub missing: SymbolId,
    /// Where the edge was found.
    pub site: Location,
}

/// Counts and data-quality findings from one ingest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Documents in the index.
    pub documents: usize,
    /// Symbols with a definition occurrence.
    pub symbols: usize,
    /// Occurrences of any symbol, external ones included.
    pub occurrences: usize,
    /// Call edges kept.
    pub call_edges: usize,
    /// Inheritance edges kept.
    pub inheritance_edges: usize,
    /// Reference edges kept.
    pub reference_edges: usize,
    /// Edges dropped for pointing outside the index.
    pub dangling_edges: Vec<DanglingEdge>,
    /// Extra definition occurrences demoted to references
    pub duplicate_definitions: usize,
    /// Symbol strings that do not follow the descriptor grammar
    pub unparsed_symbols: usize,
}

impl IngestReport {
    /// Edges kept across all kinds.
    pub fn edge_count(&self) -> usize {
        self.call_edges + self.inheritance_edges + self.reference_edges
    }
}

/// Everything needed to assemble a [`ProjectGraph`].
#[derive(Debug, Clone)]
pub(crate) struct GraphParts {
    pub project: ProjectId,
    pub generation: Uuid,
    pub source_digest: Option<String>,
    pub metadata: Option<IndexMetadata>,
    pub documents: Vec<DocumentInfo>,
    pub symbols: Vec<Symbol>,
    pub occurrences: Vec<Occurrence>,
    pub edges: Vec<Edge>,
    pub report: IngestReport,
}

/// Serializable form of a [`ProjectGraph`]; indexes are rebuilt on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSnapshot {
    /// Snapshot layout version; only the current one loads.
    pub format_version: u32,
    /// Project the graph belongs to.
    pub project: ProjectId,
    /// Ingest generation being persisted.
    pub generation: Uuid,
    /// SHA-256 of the source index, when known.
    pub source_digest: Option<String>,
    /// Index metadata from the SCIP header.
    pub metadata: Option<IndexMetadata>,
    /// Documents of the index.
    pub documents: Vec<DocumentInfo>,
    /// Symbols sorted by id.
    pub symbols: Vec<Symbol>,
    /// Occurrences sorted by location.
    pub occurrences: Vec<Occurrence>,
    /// Edges in build order.
    pub edges: Vec<Edge>,
    /// Report of the ingest that built the graph.
    pub report: IngestReport,
}

/// Read-only symbol graph of one project version.
#[derive(Debug)]
pub struct ProjectGraph {
    project: ProjectId,
    generation: Uuid,
    source_digest: Option<String>,
    metadata: Option<IndexMetadata>,
    documents: Vec<DocumentInfo>,
    symbols: HashMap<SymbolId, Symbol>,
    /// symbol -> occurrences, ordered by location
    occurrences: HashMap<SymbolId, Vec<Occurrence>>,
    /// All edges, ordered by site then endpoints
    edges: Vec<Edge>,
    /// source -> edge indices
    outgoing: HashMap<SymbolId, Vec<usize>>,
    /// target -> edge indices
    incoming: HashMap<SymbolId, Vec<usize>>,
    suffix_index: SuffixIndex,
    report: IngestReport,
}

impl ProjectGraph {
    pub(crate) fn from_parts(parts: GraphParts) -> Self {
        let mut suffix_index = SuffixIndex::new();
        let mut symbols = HashMap::with_capacity(parts.symbols.len());
        for symbol in parts.symbols {
            if symbol.kind != SymbolKind::Local {
                if let Ok(parsed) = descriptor::parse_symbol(&symbol.id) {
                    suffix_index.insert(parsed.descriptors(), &symbol.id);
                }
            }
            symbols.insert(symbol.id.clone(), symbol);
        }

        let mut occurrences: HashMap<SymbolId, Vec<Occurrence>> = HashMap::new();
        for occurrence in parts.occurrences {
            occurrences
                .entry(occurrence.symbol.clone())
                .or_default()
                .push(occurrence);
        }
        for list in occurrences.values_mut() {
            list.sort_by(|a, b| a.location.sort_key().cmp(&b.location.sort_key()));
        }

        let mut edges = parts.edges;
        edges.sort_by(|a, b| {
            a.site
                .sort_key()
                .cmp(&b.site.sort_key())
                .then_with(|| a.source.cmp(&b.source))
                .then_with(|| a.target.cmp(&b.target))
                .then_with(|| a.kind.cmp(&b.kind))
        });
        let mut outgoing: HashMap<SymbolId, Vec<usize>> = HashMap::new();
        let mut incoming: HashMap<SymbolId, Vec<usize>> = HashMap::new();
        for (idx, edge) in edges.iter().enumerate() {
            outgoing.entry(edge.source.clone()).or_default().push(idx);
            incoming.entry(edge.target.clone()).or_default().push(idx);
        }

        Self {
            project: parts.project,
            generation: parts.generation,
            source_digest: parts.source_digest,
            metadata: parts.metadata,
            documents: parts.documents,
            symbols,
            occurrences,
            edges,
            outgoing,
            incoming,
            suffix_index,
            report: parts.report,
        }
    }

    /// Rebuild a graph from a persisted snapshot.
    pub fn from_snapshot(snapshot: GraphSnapshot) -> Result<Self, GraphError> {
        if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
            return Err(GraphError::UnsupportedSnapshot(snapshot.format_version));
        }
        Ok(Self::from_parts(GraphParts {
            project: snapshot.project,
            generation: snapshot.generation,
            source_digest: snapshot.source_digest,
            metadata: snapshot.metadata,
            documents: snapshot.documents,
            symbols: snapshot.symbols,
            occurrences: snapshot.occurrences,
            edges: snapshot.edges,
            report: snapshot.report,
        }))
    }

    /// Serializable copy with deterministic ordering.
    pub fn to_snapshot(&self) -> GraphSnapshot {
        let mut symbols: Vec<Symbol> = self.symbols.values().cloned().collect();
        symbols.sort_by(|a, b| a.id.cmp(&b.id));
        let mut occurrences: Vec<Occurrence> =
            self.occurrences.values().flatten().cloned().collect();
        occurrences.sort_by(|a, b| {
            a.location
                .sort_key()
                .cmp(&b.location.sort_key())
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        GraphSnapshot {
            format_version: SNAPSHOT_FORMAT_VERSION,
            project: self.project.clone(),
            generation: self.generation,
            source_digest: self.source_digest.clone(),
            metadata: self.metadata.clone(),
            documents: self.documents.clone(),
            symbols,
            occurrences,
            edges: self.edges.clone(),
            report: self.report.clone(),
        }
    }

    /// Project id.
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Unique id of this build; changes on every ingest.
    pub fn generation(&self) -> Uuid {
        self.generation
    }

    /// SHA-256 of the ingested bytes, when ingested from bytes.
    pub fn source_digest(&self) -> Option<&str> {
        self.source_digest.as_deref()
    }

    /// Index metadata, when the stream carried one.
    pub fn metadata(&self) -> Option<&IndexMetadata> {
        self.metadata.as_ref()
    }

    /// Documents in index order.
    pub fn documents(&self) -> &[DocumentInfo] {
        &self.documents
    }

    /// Counts and warnings recorded by the ingest.
    pub fn report(&self) -> &IngestReport {
        &self.report
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Symbol by exact id.
    pub fn symbol(&self, id: &str) -> Option<&Symbol> {
        self.symbols.get(id)
    }

    /// Whether a symbol with this exact id exists.
    pub fn contains(&self, id: &str) -> bool {
        self.symbols.contains_key(id)
    }

    /// All symbols, in no particular order.
    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values()
    }

    /// Occurrences of a symbol ordered by (path, line, column).
    pub fn occurrences(&self, id: &str) -> &[Occurrence] {
        self.occurrences.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether any occurrence of `id` is a definition.
    pub fn has_definition(&self, id: &str) -> bool {
        self.occurrences(id).iter().any(Occurrence::is_definition)
    }

    /// Symbols whose descriptors end with `pattern`, sorted by id.
    pub fn symbols_with_suffix(&self, pattern: &[SegmentPattern]) -> Vec<&Symbol> {
        self.suffix_index
            .lookup(pattern)
            .iter()
            .filter_map(|id| self.symbols.get(id))
            .collect()
    }

    /// Edges of `kind` touching `id` on the given side, ordered by site
    /// (path, line, column) then by the far endpoint.
    pub fn edges_from(&self, id: &str, kind: EdgeKind, direction: Direction) -> Vec<&Edge> {
        let index = match direction {
            Direction::Outgoing => &self.outgoing,
            Direction::Incoming => &self.incoming,
        };
        index
            .get(id)
            .map(|indices| {
                indices
                    .iter()
                    .map(|idx| &self.edges[*idx])
                    .filter(|edge| edge.kind == kind)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All edges in build order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }
}

/// Store, query and traversal errors.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Project not indexed: {0}")]
    ProjectNotIndexed(ProjectId),

    #[error("Ingest already in progress for project: {0}")]
    IngestInProgress(ProjectId),

    #[error("Requested depth {requested} exceeds the configured ceiling of {ceiling}")]
    DepthLimitExceeded { requested: usize, ceiling: usize },

    #[error("Traversal exceeded its timeout of {limit_ms}ms")]
    TraversalTimedOut { limit_ms: u64 },

    #[error("Traversal exceeded its budget of {limit} nodes")]
    TraversalBudgetExceeded { limit: usize },

    #[error(transparent)]
    Malformed(#[from] MalformedStreamError),

    #[error("Unsupported graph snapshot format version: {0}")]
    UnsupportedSnapshot(u32),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}
