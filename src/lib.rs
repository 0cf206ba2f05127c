pub mod ast;
pub mod compile;
pub mod complete;
pub mod dialect;
pub mod extract;
pub mod graph;
pub mod insight;
pub mod lexer;
pub mod lint;
pub mod parser;
pub mod session;

use serde::Serialize;
use serde::de::DeserializeOwned;
use wasm_bindgen::prelude::*;

use compile::CompileOptions;
use dialect::Dialect;
use graph::{Graph, Position};
use session::{Connection, Session, SessionConfig};

/// Initialize panic hook for better error messages in WASM
#[wasm_bindgen(start)]
pub fn init() {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();
}

/// Options accepted by `compileDbml`.
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct CompileRequest {
    dialect: Dialect,
    #[serde(flatten)]
    options: CompileOptions,
}

#[derive(Debug, Serialize)]
struct CompileResponse {
    #[serde(flatten)]
    graph: Graph,
    warnings: Vec<String>,
}

fn from_js_or_default<T>(value: JsValue) -> Result<T, String>
where
    T: DeserializeOwned + Default,
{
    if value.is_undefined() || value.is_null() {
        return Ok(T::default());
    }
    serde_wasm_bindgen::from_value(value).map_err(|e| format!("invalid options: {e}"))
}

fn to_js<T: Serialize>(value: &T) -> Result<JsValue, String> {
    serde_wasm_bindgen::to_value(value).map_err(|e| format!("failed to serialize response: {e}"))
}

/// Compile DBML source to `{ nodes, edges, warnings }`
#[wasm_bindgen(js_name = "compileDbml")]
pub fn compile_dbml(source: &str, options: JsValue) -> Result<JsValue, String> {
    let request: CompileRequest = from_js_or_default(options)?;
    let doc = parser::parse(source, request.dialect).map_err(|e| e.to_string())?;
    let compiled = compile::compile(&doc, &request.options).map_err(|e| e.to_string())?;

    to_js(&CompileResponse {
        graph: compiled.graph,
        warnings: compiled.warnings.iter().map(ToString::to_string).collect(),
    })
}

/// Bracket-balance diagnostics for DBML source
#[wasm_bindgen(js_name = "lintDbml")]
pub fn lint_dbml(source: &str) -> Result<JsValue, String> {
    to_js(&lint::lint(source))
}

/// Keyword, table and column completions for `prefix`
#[wasm_bindgen(js_name = "completeDbml")]
pub fn complete_dbml(prefix: &str, explicit: bool, source: &str) -> Result<JsValue, String> {
    to_js(&complete::complete(prefix, explicit, source))
}

/// Editor-side session holding the text, graph state and user edits.
#[wasm_bindgen(js_name = "EditorSession")]
pub struct EditorSession {
    inner: Session,
}

#[wasm_bindgen(js_class = "EditorSession")]
impl EditorSession {
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<EditorSession, String> {
        let config: SessionConfig = from_js_or_default(config)?;
        Ok(Self {
            inner: Session::new(config),
        })
    }

    /// Replace the text; returns the new graph state.
    pub fn update(&mut self, text: &str) -> Result<JsValue, String> {
        to_js(self.inner.update(text))
    }

    pub fn state(&self) -> Result<JsValue, String> {
        to_js(self.inner.state())
    }

    pub fn diagnostics(&self) -> Result<JsValue, String> {
        to_js(&self.inner.diagnostics())
    }

    #[wasm_bindgen(js_name = "moveNode")]
    pub fn move_node(&mut self, id: &str, x: f64, y: f64) -> Result<(), String> {
        self.inner
            .move_node(id, Position::new(x, y))
            .map_err(|e| e.to_string())
    }

    /// Draw an edge from a `{ source, sourceHandle, target, targetHandle }` object.
    pub fn connect(&mut self, connection: JsValue) -> Result<String, String> {
        let connection: Connection = serde_wasm_bindgen::from_value(connection)
            .map_err(|e| format!("invalid connection: {e}"))?;
        self.inner.connect(&connection).map_err(|e| e.to_string())
    }

    #[wasm_bindgen(js_name = "deleteNode")]
    pub fn delete_node(&mut self, id: &str) -> Result<(), String> {
        self.inner.delete_node(id).map_err(|e| e.to_string())
    }

    #[wasm_bindgen(js_name = "deleteEdge")]
    pub fn delete_edge(&mut self, id: &str) -> Result<(), String> {
        self.inner.delete_edge(id).map_err(|e| e.to_string())
    }

    pub fn complete(&self, prefix: &str, explicit: bool) -> Result<JsValue, String> {
        to_js(&self.inner.complete(prefix, explicit))
    }

    /// Completions for the word ending at byte `offset` of the current text.
    #[wasm_bindgen(js_name = "completeAt")]
    pub fn complete_at(&self, offset: usize, explicit: bool) -> Result<JsValue, String> {
        to_js(&self.inner.complete_at(offset, explicit))
    }
}
