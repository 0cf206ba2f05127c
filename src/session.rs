//! Editor session: the current text, its compiled graph, and user edits.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::compile::{CompileOptions, CompileWarning, compile};
use crate::complete::{Completion, complete_from_index, prefix_at};
use crate::dialect::Dialect;
use crate::extract::SchemaIndex;
use crate::graph::{
    Edge, Graph, Position, SOURCE_HANDLE_PREFIX, TARGET_HANDLE_PREFIX, handle_field,
};
use crate::insight::{
    DocumentInsight, HeuristicInsight, compile_error_diagnostic, parse_error_diagnostic,
    warning_diagnostic,
};
use crate::lint::{Diagnostic, lint};
use crate::parser::parse;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    pub dialect: Dialect,
    pub compile: CompileOptions,
    /// Carry moved positions and drawn edges across recompiles.
    pub retain_user_edits: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum GraphState {
    #[default]
    Empty,
    Compiled { graph: Graph },
    Failed { message: String },
}

impl GraphState {
    pub fn graph(&self) -> Option<&Graph> {
        match self {
            Self::Compiled { graph } => Some(graph),
            _ => None,
        }
    }
}

/// A user-drawn connection between two column ports.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub source: String,
    pub source_handle: String,
    pub target: String,
    pub target_handle: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EditError {
    #[error("no compiled graph to edit")]
    NotCompiled,
    #[error("unknown node {0}")]
    UnknownNode(String),
    #[error("unknown edge {0}")]
    UnknownEdge(String),
    #[error("node {node} has no port {handle}")]
    UnknownPort { node: String, handle: String },
}

#[derive(Debug, Default)]
pub struct Session {
    text: String,
    config: SessionConfig,
    state: GraphState,
    index: SchemaIndex,
    diagnostics: Vec<Diagnostic>,
    warnings: Vec<CompileWarning>,
    user_positions: HashMap<String, Position>,
    user_edges: Vec<Edge>,
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> &GraphState {
        &self.state
    }

    pub fn graph(&self) -> Option<&Graph> {
        self.state.graph()
    }

    pub fn index(&self) -> &SchemaIndex {
        &self.index
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn warnings(&self) -> &[CompileWarning] {
        &self.warnings
    }

    /// Replace the text and recompute everything derived from it. The text
    /// is parsed and compiled once; diagnostics and graph state share it.
    pub fn update(&mut self, text: &str) -> &GraphState {
        self.text = text.to_string();
        self.index = HeuristicInsight.quick_index(text);
        self.diagnostics = lint(text);
        self.warnings.clear();

        if !self.config.retain_user_edits {
            self.user_positions.clear();
            self.user_edges.clear();
        }

        if text.trim().is_empty() {
            self.state = GraphState::Empty;
            return &self.state;
        }

        let compiled = match parse(text, self.config.dialect) {
            Ok(doc) => compile(&doc, &self.config.compile).map_err(|err| {
                self.diagnostics.push(compile_error_diagnostic(text, &err));
                err.to_string()
            }),
            Err(err) => {
                self.diagnostics.push(parse_error_diagnostic(text, &err));
                Err(err.to_string())
            }
        };

        self.state = match compiled {
            Ok(compiled) => {
                let mut graph = compiled.graph;
                self.warnings = compiled.warnings;
                self.diagnostics
                    .extend(self.warnings.iter().map(|w| warning_diagnostic(text, w)));
                if self.config.retain_user_edits {
                    self.reapply_user_edits(&mut graph);
                }
                debug!(
                    nodes = graph.nodes.len(),
                    edges = graph.edges.len(),
                    warnings = self.warnings.len(),
                    "document compiled"
                );
                GraphState::Compiled { graph }
            }
            Err(message) => {
                warn!(%message, "document failed to compile");
                GraphState::Failed { message }
            }
        };
        &self.state
    }

    fn reapply_user_edits(&self, graph: &mut Graph) {
        for node in &mut graph.nodes {
            if let Some(position) = self.user_positions.get(&node.id) {
                node.position = *position;
            }
        }
        for edge in &self.user_edges {
            if graph.edge(&edge.id).is_some() {
                continue;
            }
            if ports_exist(graph, edge) {
                graph.edges.push(edge.clone());
            } else {
                debug!(edge = %edge.id, "user edge no longer matches the document");
            }
        }
    }

    fn graph_mut(&mut self) -> Result<&mut Graph, EditError> {
        match &mut self.state {
            GraphState::Compiled { graph } => Ok(graph),
            _ => Err(EditError::NotCompiled),
        }
    }

    pub fn move_node(&mut self, id: &str, position: Position) -> Result<(), EditError> {
        self.graph_mut()?
            .node_mut(id)
            .ok_or_else(|| EditError::UnknownNode(id.to_string()))?
            .position = position;
        self.user_positions.insert(id.to_string(), position);
        Ok(())
    }

    /// Draw an edge between two column ports. Returns the new edge id.
    pub fn connect(&mut self, connection: &Connection) -> Result<String, EditError> {
        self.connect_at(connection, now_millis())
    }

    pub fn connect_at(&mut self, connection: &Connection, millis: u64) -> Result<String, EditError> {
        let graph = self.graph_mut()?;

        let source_field = handle_field(&connection.source_handle, SOURCE_HANDLE_PREFIX);
        let target_field = handle_field(&connection.target_handle, TARGET_HANDLE_PREFIX);
        check_port(graph, &connection.source, &connection.source_handle, source_field)?;
        check_port(graph, &connection.target, &connection.target_handle, target_field)?;

        let base = format!("e-{}-{}-{}", connection.source, connection.target, millis);
        let mut id = base.clone();
        let mut n = 1;
        while graph.edge(&id).is_some() {
            id = format!("{base}-{n}");
            n += 1;
        }

        let edge = Edge::between(
            id.clone(),
            &connection.source,
            source_field,
            &connection.target,
            target_field,
        );
        graph.edges.push(edge.clone());
        self.user_edges.push(edge);
        debug!(edge = %id, "connected");
        Ok(id)
    }

    /// Remove a node and every edge attached to it.
    pub fn delete_node(&mut self, id: &str) -> Result<(), EditError> {
        let graph = self.graph_mut()?;
        let before = graph.nodes.len();
        graph.nodes.retain(|n| n.id != id);
        if graph.nodes.len() == before {
            return Err(EditError::UnknownNode(id.to_string()));
        }
        let dropped = graph.prune_dangling_edges();
        debug!(node = id, dropped, "node deleted");
        self.user_positions.remove(id);
        self.user_edges.retain(|e| !e.touches(id));
        Ok(())
    }

    pub fn delete_edge(&mut self, id: &str) -> Result<(), EditError> {
        let graph = self.graph_mut()?;
        let before = graph.edges.len();
        graph.edges.retain(|e| e.id != id);
        if graph.edges.len() == before {
            return Err(EditError::UnknownEdge(id.to_string()));
        }
        self.user_edges.retain(|e| e.id != id);
        Ok(())
    }

    pub fn complete(&self, prefix: &str, explicit: bool) -> Vec<Completion> {
        complete_from_index(&self.index, prefix, explicit)
    }

    /// Completions for the identifier ending at byte `offset` of the text.
    pub fn complete_at(&self, offset: usize, explicit: bool) -> Vec<Completion> {
        self.complete(prefix_at(&self.text, offset), explicit)
    }
}

fn check_port(graph: &Graph, node: &str, handle: &str, field: &str) -> Result<(), EditError> {
    let node_ref = graph
        .node(node)
        .ok_or_else(|| EditError::UnknownNode(node.to_string()))?;
    if node_ref.has_column(field) {
        Ok(())
    } else {
        Err(EditError::UnknownPort {
            node: node.to_string(),
            handle: handle.to_string(),
        })
    }
}

fn ports_exist(graph: &Graph, edge: &Edge) -> bool {
    let source_field = handle_field(&edge.source_handle, SOURCE_HANDLE_PREFIX);
    let target_field = handle_field(&edge.target_handle, TARGET_HANDLE_PREFIX);
    check_port(graph, &edge.source, &edge.source_handle, source_field).is_ok()
        && check_port(graph, &edge.target, &edge.target_handle, target_field).is_ok()
}

#[cfg(target_arch = "wasm32")]
fn now_millis() -> u64 {
    js_sys::Date::now() as u64
}

#[cfg(not(target_arch = "wasm32"))]
fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
