//! Graph builder for constructing a [`ProjectGraph`] from decoded SCIP records.
//!
//! This module bridges the decoder output with the symbol graph: it
//! canonicalizes local symbols, enforces one definition per symbol and
//! document, derives call and reference edges from occurrence positions, and
//! drops edges whose endpoints are not defined in the project.

use std::collections::{BTreeMap, HashMap, HashSet};

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::descriptor::{self, ParsedSymbol};
use crate::graph::{
    DanglingEdge, DocumentInfo, Edge, EdgeKind, GraphParts, IngestReport, Location, Occurrence,
    ProjectGraph, ProjectId, Symbol, SymbolId, SymbolKind,
};
use crate::scip::{
    self, DocumentRecord, FactRecord, IndexMetadata, MalformedStreamError, OccurrenceRecord,
    RelationshipRecord, SourceRange, SymbolRecord,
};

/// Canonical id of a symbol as it appears in `document`.
///
/// Locals are only unique inside their document, so they are scoped as
/// `local <id>@<path>`. Returns `None` for a local without a document.
pub fn canonical_symbol(symbol: &str, document: Option<&str>) -> Option<SymbolId> {
    if descriptor::is_local(symbol) {
        document.map(|path| format!("{symbol}@{path}"))
    } else {
        Some(symbol.to_string())
    }
}

/// Hex SHA-256 of a source blob.
pub fn digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Accumulates records for one project and assembles the graph.
pub struct GraphBuilder {
    project: ProjectId,
    source_digest: Option<String>,
    metadata: Option<IndexMetadata>,
    documents: Vec<DocumentRecord>,
    infos: HashMap<SymbolId, SymbolRecord>,
    relationships: Vec<RelationshipRecord>,
    occurrences: Vec<OccurrenceRecord>,
    unparsed_symbols: usize,
}

impl GraphBuilder {
    pub fn new(project: impl Into<ProjectId>) -> Self {
        Self {
            project: project.into(),
            source_digest: None,
            metadata: None,
            documents: Vec::new(),
            infos: HashMap::new(),
            relationships: Vec::new(),
            occurrences: Vec::new(),
            unparsed_symbols: 0,
        }
    }

    pub fn with_source_digest(mut self, digest: impl Into<String>) -> Self {
        self.source_digest = Some(digest.into());
        self
    }

    /// Consume a record sequence; the first decode error aborts the build.
    pub fn build<I>(mut self, records: I) -> Result<ProjectGraph, MalformedStreamError>
    where
        I: IntoIterator<Item = Result<FactRecord, MalformedStreamError>>,
    {
        for record in records {
            self.push(record?);
        }
        Ok(self.finish())
    }

    /// Decode and build from raw SCIP bytes, recording their digest.
    pub fn build_from_bytes(self, bytes: &[u8]) -> Result<ProjectGraph, MalformedStreamError> {
        self.with_source_digest(digest(bytes)).build(scip::decode(bytes))
    }

    pub fn push(&mut self, record: FactRecord) {
        match record {
            FactRecord::Metadata(metadata) => self.metadata = Some(metadata),
            FactRecord::Document(document) => self.documents.push(document),
            FactRecord::Symbol(mut info) => {
                let Some(id) = canonical_symbol(&info.symbol, info.document.as_deref()) else {
                    return;
                };
                if !descriptor::is_local(&info.symbol) && descriptor::parse_symbol(&id).is_err() {
                    self.unparsed_symbols += 1;
                    debug!("Symbol does not follow the descriptor grammar: {}", id);
                }
                info.enclosing_symbol = info
                    .enclosing_symbol
                    .as_deref()
                    .and_then(|s| canonical_symbol(s, info.document.as_deref()));
                info.symbol = id.clone();
                // First information record wins; later ones only fill gaps.
                let entry = self.infos.entry(id).or_insert_with(|| info.clone());
                if entry.documentation.is_empty() {
                    entry.documentation = info.documentation;
                }
                if entry.signature.is_none() {
                    entry.signature = info.signature;
                }
            }
            FactRecord::Relationship(mut relationship) => {
                let document = relationship.document.as_deref();
                let (Some(from), Some(to)) = (
                    canonical_symbol(&relationship.from, document),
                    canonical_symbol(&relationship.to, document),
                ) else {
                    return;
                };
                relationship.from = from;
                relationship.to = to;
                self.relationships.push(relationship);
            }
            FactRecord::Occurrence(mut occurrence) => {
                if let Some(id) = canonical_symbol(&occurrence.symbol, Some(&occurrence.document)) {
                    occurrence.symbol = id;
                    self.occurrences.push(occurrence);
                }
            }
        }
    }

    pub fn finish(self) -> ProjectGraph {
        let mut report = IngestReport {
            documents: self.documents.len(),
            unparsed_symbols: self.unparsed_symbols,
            ..IngestReport::default()
        };

        // Group occurrences per document, ordered by position.
        let mut by_document: BTreeMap<String, Vec<OccurrenceRecord>> = BTreeMap::new();
        for occurrence in self.occurrences {
            by_document
                .entry(occurrence.document.clone())
                .or_default()
                .push(occurrence);
        }
        for occurrences in by_document.values_mut() {
            occurrences.sort_by(|a, b| {
                a.range
                    .start()
                    .cmp(&b.range.start())
                    .then_with(|| a.symbol.cmp(&b.symbol))
            });
            report.duplicate_definitions += demote_duplicate_definitions(occurrences);
        }

        // Definition sites decide which symbols exist.
        let mut definitions: HashMap<SymbolId, Location> = HashMap::new();
        for (path, occurrences) in &by_document {
            for occurrence in occurrences.iter().filter(|o| o.roles.is_definition()) {
                let location = Location::from_range(path.as_str(), &occurrence.range);
                definitions
                    .entry(occurrence.symbol.clone())
                    .and_modify(|current| {
                        if location.sort_key() < current.sort_key() {
                            *current = location.clone();
                        }
                    })
                    .or_insert(location);
            }
        }

        let mut symbols: HashMap<SymbolId, Symbol> = definitions
            .into_iter()
            .map(|(id, location)| {
                let symbol = Symbol::new(id.clone(), location);
                let symbol = match self.infos.get(&id) {
                    Some(info) => apply_info(symbol, info),
                    None => symbol,
                };
                (id, symbol)
            })
            .collect();
        assign_arity(&mut symbols);

        let mut edges = Vec::new();
        let mut dangling = Vec::new();
        let mut push_edge = |edge: Edge, symbols: &HashMap<SymbolId, Symbol>| {
            let missing = if !symbols.contains_key(&edge.source) {
                Some(edge.source.clone())
            } else if !symbols.contains_key(&edge.target) {
                Some(edge.target.clone())
            } else {
                None
            };
            match missing {
                Some(missing) => dangling.push(DanglingEdge {
                    source: edge.source,
                    target: edge.target,
                    kind: edge.kind,
                    missing,
                    site: edge.site,
                }),
                None => edges.push(edge),
            }
        };

        for relationship in &self.relationships {
            let kind = if relationship.is_implementation {
                EdgeKind::Inheritance
            } else if relationship.is_reference || relationship.is_type_definition {
                EdgeKind::Reference
            } else {
                continue;
            };
            let site = match symbols.get(&relationship.from) {
                Some(symbol) => symbol.location.clone(),
                None => Location {
                    path: relationship.document.clone().unwrap_or_default(),
                    start_line: 0,
                    end_line: 0,
                    start_column: 0,
                    end_column: 0,
                },
            };
            push_edge(
                Edge::new(&relationship.from, &relationship.to, kind, site),
                &symbols,
            );
        }

        for (path, occurrences) in &by_document {
            for edge in derive_usage_edges(path, occurrences, &symbols) {
                push_edge(edge, &symbols);
            }
        }

        for edge in &edges {
            match edge.kind {
                EdgeKind::Call => report.call_edges += 1,
                EdgeKind::Inheritance => report.inheritance_edges += 1,
                EdgeKind::Reference => report.reference_edges += 1,
            }
        }
        for edge in &dangling {
            debug!(
                source = %edge.source,
                target = %edge.target,
                kind = %edge.kind,
                "Dropped edge to unknown symbol {}",
                edge.missing
            );
        }
        if !dangling.is_empty() {
            warn!(
                project = %self.project,
                "Dropped {} edges referencing symbols outside the project",
                dangling.len()
            );
        }
        if report.duplicate_definitions > 0 {
            warn!(
                project = %self.project,
                "Demoted {} duplicate definition occurrences",
                report.duplicate_definitions
            );
        }
        report.dangling_edges = dangling;

        // Documents in stream order, with their occurrence counts.
        let documents = self
            .documents
            .iter()
            .map(|doc| DocumentInfo {
                path: doc.relative_path.clone(),
                language: doc.language.clone(),
                position_encoding: doc.position_encoding,
                occurrence_count: by_document
                    .get(&doc.relative_path)
                    .map(Vec::len)
                    .unwrap_or(0),
            })
            .collect();

        let occurrences: Vec<Occurrence> = by_document
            .iter()
            .flat_map(|(path, occurrences)| {
                occurrences.iter().map(move |o| Occurrence {
                    symbol: o.symbol.clone(),
                    location: Location::from_range(path.as_str(), &o.range),
                    roles: o.roles,
                })
            })
            .collect();

        report.symbols = symbols.len();
        report.occurrences = occurrences.len();

        info!(
            "Built graph for {}: {} symbols, {} occurrences, {} edges ({} dropped)",
            self.project,
            report.symbols,
            report.occurrences,
            edges.len(),
            report.dangling_edges.len()
        );

        ProjectGraph::from_parts(GraphParts {
            project: self.project,
            generation: Uuid::new_v4(),
            source_digest: self.source_digest,
            metadata: self.metadata,
            documents,
            symbols: symbols.into_values().collect(),
            occurrences,
            edges,
            report,
        })
    }
}

/// Keep the first definition of each symbol in a document; demote the rest.
fn demote_duplicate_definitions(occurrences: &mut [OccurrenceRecord]) -> usize {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut duplicates = Vec::new();
    for (idx, occurrence) in occurrences.iter().enumerate() {
        if occurrence.roles.is_definition() && !seen.insert(occurrence.symbol.as_str()) {
            duplicates.push(idx);
        }
    }
    for idx in &duplicates {
        let occurrence = &mut occurrences[*idx];
        warn!(
            "Duplicate definition of {} in {} at line {}",
            occurrence.symbol,
            occurrence.document,
            occurrence.range.start_line + 1
        );
        occurrence.roles = occurrence.roles.without_definition();
    }
    duplicates.len()
}

fn apply_info(mut symbol: Symbol, info: &SymbolRecord) -> Symbol {
    if !info.documentation.is_empty() {
        symbol = symbol.with_documentation(info.documentation.join("\n\n"));
    }
    if let Some(signature) = &info.signature {
        symbol = symbol.with_signature(signature.clone());
    }
    if let Some(name) = info.display_name.as_deref().filter(|n| !n.is_empty()) {
        symbol = symbol.with_name(name);
    }
    if let Some(enclosing) = &info.enclosing_symbol {
        symbol = symbol.with_enclosing(enclosing.clone());
    }
    symbol
}

/// Fill in `arity` for callables: owned parameter symbols first, then the
/// parameter list of the signature text.
fn assign_arity(symbols: &mut HashMap<SymbolId, Symbol>) {
    let mut parameter_counts: HashMap<SymbolId, usize> = HashMap::new();
    for symbol in symbols.values().filter(|s| s.kind == SymbolKind::Parameter) {
        if let Ok(ParsedSymbol::Global { descriptors, .. }) = descriptor::parse_symbol(&symbol.id) {
            if let Some(last) = descriptors.last() {
                let owner = &symbol.id[..last.offset];
                *parameter_counts.entry(owner.to_string()).or_default() += 1;
            }
        }
    }
    for symbol in symbols.values_mut().filter(|s| s.kind.is_callable()) {
        symbol.arity = parameter_counts
            .get(&symbol.id)
            .copied()
            .or_else(|| symbol.signature.as_deref().and_then(signature_arity));
    }
}

/// Count the parameters of the first parenthesized list in a signature.
pub fn signature_arity(signature: &str) -> Option<usize> {
    let open = signature.find('(')?;
    let mut depth = 0usize;
    let mut commas = 0usize;
    let mut saw_content = false;
    for c in signature[open + 1..].chars() {
        match c {
            '(' | '<' | '[' | '{' => {
                depth += 1;
                saw_content = true;
            }
            ')' if depth == 0 => return Some(if saw_content { commas + 1 } else { 0 }),
            ')' | '>' | ']' | '}' => {
                depth = depth.saturating_sub(1);
            }
            ',' if depth == 0 => commas += 1,
            c if !c.is_whitespace() => saw_content = true,
            _ => {}
        }
    }
    None
}

/// Call and reference edges from occurrences inside callable bodies.
fn derive_usage_edges(
    path: &str,
    occurrences: &[OccurrenceRecord],
    symbols: &HashMap<SymbolId, Symbol>,
) -> Vec<Edge> {
    let callables: Vec<(&str, SourceRange, Option<SourceRange>)> = occurrences
        .iter()
        .filter(|o| o.roles.is_definition())
        .filter(|o| symbols.get(&o.symbol).is_some_and(|s| s.kind.is_callable()))
        .map(|o| (o.symbol.as_str(), o.range, o.enclosing_range))
        .collect();
    let has_enclosing = callables.iter().any(|(_, _, enclosing)| enclosing.is_some());

    let mut edges = Vec::new();
    for occurrence in occurrences.iter().filter(|o| !o.roles.is_definition()) {
        let target_kind = symbols
            .get(&occurrence.symbol)
            .map(|s| s.kind)
            .unwrap_or_else(|| SymbolKind::of_symbol(&occurrence.symbol));
        if matches!(
            target_kind,
            SymbolKind::Local | SymbolKind::Parameter | SymbolKind::TypeParameter
        ) {
            continue;
        }

        let enclosing = if has_enclosing {
            callables
                .iter()
                .filter_map(|(id, _, enclosing)| enclosing.map(|range| (*id, range)))
                .filter(|(_, range)| range.contains_start_of(&occurrence.range))
                .max_by(|(_, a), (_, b)| a.start().cmp(&b.start()).then(b.end().cmp(&a.end())))
                .map(|(id, _)| id)
        } else {
            callables
                .iter()
                .filter(|(_, range, _)| range.start() <= occurrence.range.start())
                .last()
                .map(|(id, _, _)| *id)
        };
        let Some(caller) = enclosing else {
            continue;
        };

        let kind = if target_kind.is_callable() {
            EdgeKind::Call
        } else {
            EdgeKind::Reference
        };
        edges.push(Edge::new(
            caller,
            &occurrence.symbol,
            kind,
            Location::from_range(path, &occurrence.range),
        ));
    }
    edges
}
