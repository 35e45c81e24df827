//! Reversed-segment trie over symbol descriptors.
//!
//! Each symbol is inserted under its descriptor segments read right to left,
//! so every prefix of a trie path is a structural suffix of some symbol. A
//! lookup walks the (reversed) query segments and then collects the whole
//! subtree below the reached nodes. Cost grows with query length and result
//! size, not with the number of indexed symbols.

use std::collections::HashMap;

use crate::descriptor::{Descriptor, DescriptorKind};
use crate::graph::SymbolId;

/// One query segment: a name plus the descriptor kinds it may match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentPattern {
    /// Unescaped segment name.
    pub name: String,
    /// Any of these kinds matches.
    pub kinds: Vec<DescriptorKind>,
    /// Required method disambiguator; `None` matches every overload.
    pub disambiguator: Option<String>,
}

impl SegmentPattern {
    pub fn new(name: impl Into<String>, kinds: Vec<DescriptorKind>) -> Self {
        Self {
            name: name.into(),
            kinds,
            disambiguator: None,
        }
    }

    /// Restrict the pattern to one overload, e.g. `+1` for `foo(+1).`.
    pub fn with_disambiguator(mut self, disambiguator: impl Into<String>) -> Self {
        self.disambiguator = Some(disambiguator.into());
        self
    }

    /// Pattern matching exactly this descriptor's name, kind and overload.
    pub fn exact(descriptor: &Descriptor) -> Self {
        Self {
            name: descriptor.name.clone(),
            kinds: vec![descriptor.kind],
            disambiguator: descriptor.disambiguator.clone(),
        }
    }

    fn matches(&self, slot: &Slot) -> bool {
        self.kinds.contains(&slot.kind)
            && (self.disambiguator.is_none() || self.disambiguator == slot.disambiguator)
    }

    /// An outer segment from a dotted query: a package or an enclosing type.
    pub fn container(name: impl Into<String>) -> Self {
        Self::new(name, vec![DescriptorKind::Namespace, DescriptorKind::Type])
    }
}

/// Edge out of a trie node for one (kind, disambiguator) under a name.
#[derive(Debug)]
struct Slot {
    kind: DescriptorKind,
    disambiguator: Option<String>,
    child: usize,
}

#[derive(Debug, Default)]
struct TrieNode {
    /// Children keyed by segment name.
    children: HashMap<String, Vec<Slot>>,
    /// Symbols whose full descriptor path ends at this node.
    terminals: Vec<SymbolId>,
}

/// Suffix index for one project graph.
#[derive(Debug)]
pub struct SuffixIndex {
    nodes: Vec<TrieNode>,
    len: usize,
}

impl Default for SuffixIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl SuffixIndex {
    pub fn new() -> Self {
        Self {
            nodes: vec![TrieNode::default()],
            len: 0,
        }
    }

    /// Number of indexed symbols.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn insert(&mut self, descriptors: &[Descriptor], id: &SymbolId) {
        if descriptors.is_empty() {
            return;
        }
        let mut node = 0;
        for descriptor in descriptors.iter().rev() {
            let existing = self.nodes[node]
                .children
                .get(&descriptor.name)
                .and_then(|slots| {
                    slots.iter().find(|slot| {
                        slot.kind == descriptor.kind && slot.disambiguator == descriptor.disambiguator
                    })
                })
                .map(|slot| slot.child);
            node = match existing {
                Some(child) => child,
                None => {
                    let child = self.nodes.len();
                    self.nodes.push(TrieNode::default());
                    self.nodes[node]
                        .children
                        .entry(descriptor.name.clone())
                        .or_default()
                        .push(Slot {
                            kind: descriptor.kind,
                            disambiguator: descriptor.disambiguator.clone(),
                            child,
                        });
                    child
                }
            };
        }
        self.nodes[node].terminals.push(id.clone());
        self.len += 1;
    }

    /// Ids of every symbol whose descriptors end with `pattern`, segment for
    /// segment. Sorted and deduplicated.
    pub fn lookup(&self, pattern: &[SegmentPattern]) -> Vec<SymbolId> {
        if pattern.is_empty() {
            return Vec::new();
        }

        let mut frontier = vec![0usize];
        for segment in pattern.iter().rev() {
            let mut next = Vec::new();
            for node in frontier {
                if let Some(slots) = self.nodes[node].children.get(&segment.name) {
                    next.extend(
                        slots
                            .iter()
                            .filter(|slot| segment.matches(slot))
                            .map(|slot| slot.child),
                    );
                }
            }
            if next.is_empty() {
                return Vec::new();
            }
            frontier = next;
        }

        let mut out = Vec::new();
        let mut stack = frontier;
        while let Some(node) = stack.pop() {
            let node = &self.nodes[node];
            out.extend(node.terminals.iter().cloned());
            stack.extend(node.children.values().flatten().map(|slot| slot.child));
        }
        out.sort();
        out.dedup();
        out
    }
}
