//! Node/edge graph model handed to the rendering surface.

use serde::{Deserialize, Serialize};

pub const SOURCE_HANDLE_PREFIX: &str = "source-";
pub const TARGET_HANDLE_PREFIX: &str = "target-";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Qualified table name, `schema.table`.
    pub id: String,
    pub position: Position,
    pub table_name: String,
    pub columns: Vec<ColumnView>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnView {
    pub name: String,
    #[serde(rename = "type")]
    pub typ: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<KeyRole>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Column role shown on the table card. Precedence is PK > FK > UNIQUE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum KeyRole {
    Pk,
    Fk,
    Unique,
}

impl KeyRole {
    pub fn derive(pk: bool, fk: bool, unique: bool) -> Option<Self> {
        if pk {
            Some(Self::Pk)
        } else if fk {
            Some(Self::Fk)
        } else if unique {
            Some(Self::Unique)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub source_handle: String,
    pub target_handle: String,
    pub label: String,
}

impl Edge {
    /// Edge anchored on `source_field` of `source` and `target_field` of `target`.
    pub fn between(
        id: String,
        source: &str,
        source_field: &str,
        target: &str,
        target_field: &str,
    ) -> Self {
        Self {
            id,
            source: source.to_string(),
            target: target.to_string(),
            source_handle: format!("{SOURCE_HANDLE_PREFIX}{source_field}"),
            target_handle: format!("{TARGET_HANDLE_PREFIX}{target_field}"),
            label: format!("{source_field} → {target_field}"),
        }
    }

    pub fn touches(&self, node_id: &str) -> bool {
        self.source == node_id || self.target == node_id
    }
}

/// Field name behind a `source-<field>` / `target-<field>` handle.
pub fn handle_field<'a>(handle: &'a str, prefix: &str) -> &'a str {
    handle.strip_prefix(prefix).unwrap_or(handle)
}

impl Node {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }
}

impl Graph {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    pub fn edge(&self, id: &str) -> Option<&Edge> {
        self.edges.iter().find(|e| e.id == id)
    }

    /// Drop edges whose source or target node is missing.
    pub fn prune_dangling_edges(&mut self) -> usize {
        let before = self.edges.len();
        let nodes = &self.nodes;
        self.edges.retain(|e| {
            nodes.iter().any(|n| n.id == e.source) && nodes.iter().any(|n| n.id == e.target)
        });
        before - self.edges.len()
    }
}
