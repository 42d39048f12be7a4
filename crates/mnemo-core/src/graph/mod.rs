//! Association graph (C4).
//!
//! In-process graph of memory-to-memory links. Similarity edges are stored canonically
//! (undirected, `min(a, b)` first); manual edges are reserved as directed for future use
//! but not yet exposed by any public operation. Persistence is a periodic snapshot plus
//! an append-only journal, replayed on restart — grounded in the journal-plus-snapshot
//! pattern used for operational state in the broader example pack, generalised to this
//! crate's own edge/node shape.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::{Association, AssociationKind};

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum GraphError {
    #[error("self-edges are not permitted ({0})")]
    SelfEdge(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialisation error: {0}")]
    Serde(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
enum JournalOp {
    AddNode(String),
    RemoveNode(String),
    AddEdge {
        a: String,
        b: String,
        weight: f32,
        kind: AssociationKind,
    },
    RemoveEdge {
        a: String,
        b: String,
        kind: AssociationKind,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct Snapshot {
    nodes: Vec<String>,
    edges: Vec<Association>,
}

/// In-memory directed/undirected weighted graph of memory ids (C4).
pub struct AssociationGraph {
    nodes: HashSet<String>,
    // Keyed by (canonical_source, canonical_target, kind) -> edge.
    edges: BTreeMap<(String, String, AssociationKind), Association>,
    // Adjacency for fast neighbour lookups.
    adjacency: HashMap<String, HashSet<String>>,
    snapshot_path: Option<PathBuf>,
    journal_path: Option<PathBuf>,
    journal: Option<File>,
}

impl AssociationGraph {
    /// A purely in-memory graph, no persistence. Used by tests and in-memory engines.
    pub fn new_in_memory() -> Self {
        AssociationGraph {
            nodes: HashSet::new(),
            edges: BTreeMap::new(),
            adjacency: HashMap::new(),
            snapshot_path: None,
            journal_path: None,
            journal: None,
        }
    }

    /// Open a graph persisted under `dir`, replaying the snapshot and any journal
    /// entries written after it.
    pub fn open(dir: &Path) -> Result<Self, GraphError> {
        std::fs::create_dir_all(dir)?;
        let snapshot_path = dir.join("snapshot.json");
        let journal_path = dir.join("journal.log");

        let mut graph = AssociationGraph::new_in_memory();
        graph.snapshot_path = Some(snapshot_path.clone());
        graph.journal_path = Some(journal_path.clone());

        if snapshot_path.exists() {
            let raw = std::fs::read(&snapshot_path)?;
            let snapshot: Snapshot = serde_json::from_slice(&raw)?;
            for node in snapshot.nodes {
                graph.nodes.insert(node);
            }
            for edge in snapshot.edges {
                graph.index_edge(edge);
            }
        }

        if journal_path.exists() {
            let file = File::open(&journal_path)?;
            for line in BufReader::new(file).lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let op: JournalOp = serde_json::from_str(&line)?;
                graph.apply_op(op);
            }
        }

        graph.journal = Some(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&journal_path)?,
        );

        Ok(graph)
    }

    fn append_journal(&mut self, op: &JournalOp) -> Result<(), GraphError> {
        if let Some(file) = &mut self.journal {
            let line = serde_json::to_string(op)?;
            writeln!(file, "{line}")?;
            file.flush()?;
        }
        Ok(())
    }

    fn apply_op(&mut self, op: JournalOp) {
        match op {
            JournalOp::AddNode(id) => {
                self.nodes.insert(id);
            }
            JournalOp::RemoveNode(id) => {
                self.remove_node_in_memory(&id);
            }
            JournalOp::AddEdge { a, b, weight, kind } => {
                let (source, target) = Association::canonical_pair(&a, &b);
                self.index_edge(Association {
                    source_id: source,
                    target_id: target,
                    weight,
                    kind,
                    created_at: chrono::Utc::now(),
                });
            }
            JournalOp::RemoveEdge { a, b, kind } => {
                self.remove_edge_in_memory(&a, &b, kind);
            }
        }
    }

    fn index_edge(&mut self, edge: Association) {
        self.nodes.insert(edge.source_id.clone());
        self.nodes.insert(edge.target_id.clone());
        self.adjacency
            .entry(edge.source_id.clone())
            .or_default()
            .insert(edge.target_id.clone());
        self.adjacency
            .entry(edge.target_id.clone())
            .or_default()
            .insert(edge.source_id.clone());
        self.edges
            .insert((edge.source_id.clone(), edge.target_id.clone(), edge.kind), edge);
    }

    fn remove_node_in_memory(&mut self, id: &str) {
        self.nodes.remove(id);
        if let Some(neighbours) = self.adjacency.remove(id) {
            for neighbour in neighbours {
                if let Some(set) = self.adjacency.get_mut(&neighbour) {
                    set.remove(id);
                }
            }
        }
        self.edges
            .retain(|(a, b, _), _| a != id && b != id);
    }

    fn remove_edge_in_memory(&mut self, a: &str, b: &str, kind: AssociationKind) {
        let (source, target) = Association::canonical_pair(a, b);
        self.edges.remove(&(source.clone(), target.clone(), kind));
        if let Some(set) = self.adjacency.get_mut(&source) {
            set.remove(&target);
        }
        if let Some(set) = self.adjacency.get_mut(&target) {
            set.remove(&source);
        }
    }

    pub fn add_node(&mut self, id: &str) -> Result<(), GraphError> {
        self.nodes.insert(id.to_string());
        self.append_journal(&JournalOp::AddNode(id.to_string()))
    }

    /// Removes the node and all incident edges.
    pub fn remove_node(&mut self, id: &str) -> Result<(), GraphError> {
        self.remove_node_in_memory(id);
        self.append_journal(&JournalOp::RemoveNode(id.to_string()))
    }

    pub fn add_edge(
        &mut self,
        a: &str,
        b: &str,
        weight: f32,
        kind: AssociationKind,
    ) -> Result<(), GraphError> {
        if a == b {
            return Err(GraphError::SelfEdge(a.to_string()));
        }
        let (source, target) = Association::canonical_pair(a, b);
        self.index_edge(Association {
            source_id: source,
            target_id: target,
            weight,
            kind,
            created_at: chrono::Utc::now(),
        });
        self.append_journal(&JournalOp::AddEdge {
            a: a.to_string(),
            b: b.to_string(),
            weight,
            kind,
        })
    }

    pub fn remove_edge(&mut self, a: &str, b: &str, kind: AssociationKind) -> Result<(), GraphError> {
        self.remove_edge_in_memory(a, b, kind);
        self.append_journal(&JournalOp::RemoveEdge {
            a: a.to_string(),
            b: b.to_string(),
            kind,
        })
    }

    /// Neighbours of `id` with weight `>= min_weight`, strongest first, capped at `k`.
    pub fn neighbours(&self, id: &str, k: usize, min_weight: f32) -> Vec<(String, f32)> {
        let Some(neighbour_ids) = self.adjacency.get(id) else {
            return Vec::new();
        };

        let mut results: Vec<(String, f32)> = neighbour_ids
            .iter()
            .filter_map(|n| {
                let (a, b) = Association::canonical_pair(id, n);
                self.edges
                    .iter()
                    .find(|((sa, sb, _), _)| sa == &a && sb == &b)
                    .map(|(_, edge)| (n.clone(), edge.weight))
            })
            .filter(|(_, w)| *w >= min_weight)
            .collect();

        results.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal).then(a.0.cmp(&b.0)));
        results.truncate(k);
        results
    }

    pub fn degree(&self, id: &str) -> usize {
        self.adjacency.get(id).map(|s| s.len()).unwrap_or(0)
    }

    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains(id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edges_among(&self, ids: &HashSet<String>) -> Vec<Association> {
        self.edges
            .values()
            .filter(|e| ids.contains(&e.source_id) && ids.contains(&e.target_id))
            .cloned()
            .collect()
    }

    pub fn all_edges(&self) -> Vec<Association> {
        self.edges.values().cloned().collect()
    }

    /// Write a fresh snapshot and truncate the journal, as a periodic compaction step.
    pub fn compact(&mut self) -> Result<(), GraphError> {
        let Some(snapshot_path) = self.snapshot_path.clone() else {
            return Ok(());
        };
        let snapshot = Snapshot {
            nodes: self.nodes.iter().cloned().collect(),
            edges: self.edges.values().cloned().collect(),
        };
        let tmp_path = snapshot_path.with_extension("json.tmp");
        std::fs::write(&tmp_path, serde_json::to_vec(&snapshot)?)?;
        std::fs::rename(&tmp_path, &snapshot_path)?;

        if let Some(journal_path) = &self.journal_path {
            self.journal = Some(
                OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(journal_path)?,
            );
        }
        Ok(())
    }
}
