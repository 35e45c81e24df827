//! Turns loose user queries into ranked symbols.
//!
//! A query is either a descriptor suffix (`Main#greet().`) matched as is, or
//! a dotted name (`com.example.Main.greet`, `Main.greet(String)`) that is
//! mapped onto descriptor segments. For dotted names the kind of the last
//! segment is unknown, so several interpretations are tried in a fixed order:
//!
//! | Final segment              | Interpretations, in order |
//! |----------------------------|---------------------------|
//! | `name(...)`                | method                    |
//! | starts with an uppercase   | type, method, field       |
//! | anything else              | method, field, type       |
//!
//! The first interpretation with at least one match wins.
//!
//! A dotted name ending in a method descriptor (`Main.greet().`,
//! `Util.foo(+1).`) first reads its dots as containers and then falls back to
//! the strict form, where `Main.` is a term.

use tracing::debug;

use crate::descriptor::{self, DescriptorKind};
use crate::graph::{ProjectGraph, Symbol};
use crate::graph_builder::signature_arity;
use crate::suffix_index::SegmentPattern;

/// Default cap on returned matches.
pub const DEFAULT_MAX_RESULTS: usize = 50;

#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Matches kept after ranking.
    pub max_results: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_results: DEFAULT_MAX_RESULTS,
        }
    }
}

/// A query mapped onto descriptor segment patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedQuery {
    /// Alternative patterns, tried in order
    pub interpretations: Vec<Vec<SegmentPattern>>,
    /// Parameter count spelled out by the query, if any
    pub arity: Option<usize>,
}

impl NormalizedQuery {
    /// Normalize a user query; `None` when it cannot match anything.
    pub fn parse(query: &str) -> Option<Self> {
        let query = query.trim();
        if query.is_empty() {
            return None;
        }
        if let Some(normalized) = Self::parse_dotted_method(query) {
            return Some(normalized);
        }
        if is_descriptor_syntax(query) {
            return Some(Self {
                interpretations: vec![strict_pattern(query)?],
                arity: None,
            });
        }

        // Split off a trailing parameter list before splitting on dots, so
        // `greet(java.lang.String)` stays one member.
        let (path, arity) = match query.strip_suffix(')') {
            Some(_) => {
                let open = query.find('(')?;
                (&query[..open], Some(signature_arity(&query[open..])?))
            }
            None => (query, None),
        };

        let segments: Vec<&str> = path.split('.').collect();
        if segments
            .iter()
            .any(|s| s.is_empty() || !s.chars().all(descriptor::is_identifier_char))
        {
            return None;
        }
        let (last, containers) = segments.split_last()?;
        let prefix: Vec<SegmentPattern> = containers.iter().map(|s| SegmentPattern::container(*s)).collect();

        let kinds: &[DescriptorKind] = if arity.is_some() {
            &[DescriptorKind::Method]
        } else if last.chars().next().is_some_and(char::is_uppercase) {
            &[DescriptorKind::Type, DescriptorKind::Method, DescriptorKind::Term]
        } else {
            &[DescriptorKind::Method, DescriptorKind::Term, DescriptorKind::Type]
        };
        let interpretations = kinds
            .iter()
            .map(|kind| {
                let mut pattern = prefix.clone();
                pattern.push(SegmentPattern::new(*last, vec![*kind]));
                pattern
            })
            .collect();
        Some(Self {
            interpretations,
            arity,
        })
    }

    /// `a.b.name(disambig).`: dotted containers ahead of a method descriptor.
    fn parse_dotted_method(query: &str) -> Option<Self> {
        if query.contains(&['/', '#', '`', '!', '['][..]) {
            return None;
        }
        let body = query.strip_suffix(").")?;
        let open = body.rfind('(')?;
        let (path, disambiguator) = (&body[..open], &body[open + 1..]);
        if !path.contains('.') || !disambiguator.chars().all(descriptor::is_identifier_char) {
            return None;
        }

        let segments: Vec<&str> = path.split('.').collect();
        if segments
            .iter()
            .any(|s| s.is_empty() || !s.chars().all(descriptor::is_identifier_char))
        {
            return None;
        }
        let (last, containers) = segments.split_last()?;
        let mut method = SegmentPattern::new(*last, vec![DescriptorKind::Method]);
        if !disambiguator.is_empty() {
            method = method.with_disambiguator(disambiguator);
        }
        let mut dotted: Vec<SegmentPattern> =
            containers.iter().map(|s| SegmentPattern::container(*s)).collect();
        dotted.push(method);

        let mut interpretations = vec![dotted];
        interpretations.extend(strict_pattern(query));
        Some(Self {
            interpretations,
            arity: None,
        })
    }
}

/// Strict descriptor punctuation that never appears in a dotted name.
fn is_descriptor_syntax(query: &str) -> bool {
    query.contains(&['/', '#', '`', '!', '['][..]) || query.ends_with(").")
}

/// Segment-for-segment pattern of a descriptor suffix, overloads included.
fn strict_pattern(query: &str) -> Option<Vec<SegmentPattern>> {
    let descriptors = descriptor::parse_descriptors(query).ok()?;
    Some(descriptors.iter().map(SegmentPattern::exact).collect())
}

/// Descriptor resolver over one project graph.
#[derive(Debug, Clone, Default)]
pub struct DescriptorResolver {
    config: ResolverConfig,
}

impl DescriptorResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: ResolverConfig) -> Self {
        Self { config }
    }

    /// Ranked symbols matching `query`; empty when nothing matches.
    pub fn resolve(&self, graph: &ProjectGraph, query: &str) -> Vec<Symbol> {
        let Some(normalized) = NormalizedQuery::parse(query) else {
            debug!("Query {:?} cannot match any descriptor", query);
            return Vec::new();
        };

        let Some(mut matches) = normalized
            .interpretations
            .iter()
            .map(|pattern| graph.symbols_with_suffix(pattern))
            .find(|matches| !matches.is_empty())
        else {
            return Vec::new();
        };

        // Arity match first, then file path order. Every indexed symbol owns a
        // definition occurrence, so definitions already outrank bare mentions.
        matches.sort_by_cached_key(|symbol| {
            (
                normalized.arity.is_some() && symbol.arity != normalized.arity,
                symbol.location.path.clone(),
                symbol.location.start_line,
                symbol.id.clone(),
            )
        });
        matches.truncate(self.config.max_results);
        debug!(
            project = graph.project(),
            "Resolved {:?} to {} symbols",
            query,
            matches.len()
        );
        matches.into_iter().cloned().collect()
    }
}
