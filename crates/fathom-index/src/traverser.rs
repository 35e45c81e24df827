//! Bounded graph traversal.
//!
//! Breadth-first expansion from one symbol along a single edge kind and
//! direction. Each symbol appears at most once in the resulting tree; edges
//! that lead back to an ancestor are reported as cycles instead of being
//! followed.

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, warn};

use crate::graph::{Direction, EdgeKind, GraphError, Location, ProjectGraph, Symbol, SymbolId, SymbolKind};

/// Default upper bound for a requested traversal depth.
pub const DEFAULT_DEPTH_CEILING: usize = 10;

/// Limits applied to every traversal.
#[derive(Debug, Clone)]
pub struct TraversalConfig {
    /// Largest `max_depth` a caller may request
    pub depth_ceiling: usize,
    /// Wall-clock limit for one traversal
    pub timeout: Option<Duration>,
    /// Largest number of nodes one tree may hold
    pub max_nodes: Option<usize>,
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            depth_ceiling: DEFAULT_DEPTH_CEILING,
            timeout: None,
            max_nodes: None,
        }
    }
}

impl TraversalConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_depth_ceiling(mut self, ceiling: usize) -> Self {
        self.depth_ceiling = ceiling;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_nodes(mut self, max_nodes: usize) -> Self {
        self.max_nodes = Some(max_nodes);
        self
    }
}

/// One node of a traversal tree.
#[derive(Debug, Clone, Serialize)]
pub struct TraversalNode {
    pub symbol: Symbol,
    pub depth: usize,
    /// Index of the parent node; `None` for the root
    pub parent: Option<usize>,
    /// Child node indices in edge order
    pub children: Vec<usize>,
    /// Site of the edge that reached this node
    pub site: Option<Location>,
}

/// An edge that leads back to an ancestor of its source node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cycle {
    pub from: SymbolId,
    pub to: SymbolId,
    pub site: Location,
}

/// Result of [`GraphTraverser::traverse`]. Node 0 is the start symbol and
/// nodes are stored in BFS order.
#[derive(Debug, Clone, Serialize)]
pub struct TraversalTree {
    pub edge_kind: EdgeKind,
    pub direction: Direction,
    pub max_depth: usize,
    pub nodes: Vec<TraversalNode>,
    pub cycles: Vec<Cycle>,
}

/// Recursive, serializable view of a [`TraversalTree`].
#[derive(Debug, Clone, Serialize)]
pub struct NestedNode {
    pub symbol: SymbolId,
    pub name: String,
    pub kind: SymbolKind,
    pub location: Location,
    pub depth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site: Option<Location>,
    pub children: Vec<NestedNode>,
}

impl TraversalTree {
    pub fn root(&self) -> &TraversalNode {
        &self.nodes[0]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.iter().any(|n| n.symbol.id == id)
    }

    /// Node ids from the root, excluding the root.
    pub fn reached(&self) -> Vec<&str> {
        self.nodes.iter().skip(1).map(|n| n.symbol.id.as_str()).collect()
    }

    /// Root-to-node id paths for every non-root node, shallowest first and
    /// in BFS order within one depth.
    pub fn paths(&self) -> Vec<Vec<&str>> {
        self.nodes
            .iter()
            .enumerate()
            .skip(1)
            .map(|(idx, _)| {
                let mut path = Vec::new();
                let mut current = Some(idx);
                while let Some(i) = current {
                    path.push(self.nodes[i].symbol.id.as_str());
                    current = self.nodes[i].parent;
                }
                path.reverse();
                path
            })
            .collect()
    }

    pub fn to_nested(&self) -> NestedNode {
        self.nest(0)
    }

    fn nest(&self, idx: usize) -> NestedNode {
        let node = &self.nodes[idx];
        NestedNode {
            symbol: node.symbol.id.clone(),
            name: node.symbol.name.clone(),
            kind: node.symbol.kind,
            location: node.symbol.location.clone(),
            depth: node.depth,
            site: node.site.clone(),
            children: node.children.iter().map(|child| self.nest(*child)).collect(),
        }
    }
}

/// Stateless traversal engine; all per-call state lives on the stack.
#[derive(Debug, Clone, Default)]
pub struct GraphTraverser {
    config: TraversalConfig,
}

impl GraphTraverser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: TraversalConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TraversalConfig {
        &self.config
    }

    /// Expand from `start` up to `max_depth` edges away.
    ///
    /// Returns `Ok(None)` when `start` is not a symbol of the graph. Fails
    /// before doing any work when `max_depth` exceeds the ceiling, and
    /// without a partial tree when a time or node budget runs out.
    pub fn traverse(
        &self,
        graph: &ProjectGraph,
        start: &str,
        edge_kind: EdgeKind,
        direction: Direction,
        max_depth: usize,
    ) -> Result<Option<TraversalTree>, GraphError> {
        if max_depth > self.config.depth_ceiling {
            return Err(GraphError::DepthLimitExceeded {
                requested: max_depth,
                ceiling: self.config.depth_ceiling,
            });
        }
        let Some(root) = graph.symbol(start) else {
            return Ok(None);
        };

        let started = Instant::now();
        let mut tree = TraversalTree {
            edge_kind,
            direction,
            max_depth,
            nodes: vec![TraversalNode {
                symbol: root.clone(),
                depth: 0,
                parent: None,
                children: Vec::new(),
                site: None,
            }],
            cycles: Vec::new(),
        };
        let mut index_of: HashMap<&str, usize> = HashMap::new();
        index_of.insert(root.id.as_str(), 0);
        let mut queue = VecDeque::from([0usize]);

        while let Some(current) = queue.pop_front() {
            if let Some(timeout) = self.config.timeout {
                if started.elapsed() >= timeout {
                    return Err(GraphError::TraversalTimedOut {
                        limit_ms: timeout.as_millis() as u64,
                    });
                }
            }
            let depth = tree.nodes[current].depth;
            if depth >= max_depth {
                continue;
            }

            let current_id = tree.nodes[current].symbol.id.clone();
            let mut seen_neighbours: HashSet<&str> = HashSet::new();
            for edge in graph.edges_from(&current_id, edge_kind, direction) {
                let neighbour = edge.far_end(direction).as_str();
                if !seen_neighbours.insert(neighbour) {
                    continue;
                }

                if let Some(&existing) = index_of.get(neighbour) {
                    if is_ancestor(&tree, existing, current) {
                        if edge_kind == EdgeKind::Inheritance {
                            warn!(
                                project = graph.project(),
                                "Inheritance cycle between {} and {}",
                                current_id,
                                neighbour
                            );
                        }
                        tree.cycles.push(Cycle {
                            from: current_id.clone(),
                            to: neighbour.to_string(),
                            site: edge.site.clone(),
                        });
                    }
                    continue;
                }

                let Some(symbol) = graph.symbol(neighbour) else {
                    continue;
                };
                if let Some(limit) = self.config.max_nodes {
                    if tree.nodes.len() >= limit {
                        return Err(GraphError::TraversalBudgetExceeded { limit });
                    }
                }
                let idx = tree.nodes.len();
                tree.nodes.push(TraversalNode {
                    symbol: symbol.clone(),
                    depth: depth + 1,
                    parent: Some(current),
                    children: Vec::new(),
                    site: Some(edge.site.clone()),
                });
                tree.nodes[current].children.push(idx);
                index_of.insert(symbol.id.as_str(), idx);
                queue.push_back(idx);
            }
        }

        debug!(
            start,
            edge_kind = %edge_kind,
            "Traversal reached {} nodes ({} cycles)",
            tree.nodes.len(),
            tree.cycles.len()
        );
        Ok(Some(tree))
    }
}

/// Whether `candidate` is `node` or one of its ancestors.
fn is_ancestor(tree: &TraversalTree, candidate: usize, node: usize) -> bool {
    let mut current = Some(node);
    while let Some(idx) = current {
        if idx == candidate {
            return true;
        }
        current = tree.nodes[idx].parent;
    }
    false
}
