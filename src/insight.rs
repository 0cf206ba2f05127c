//! One interface over the cheap heuristics and the full parser.
//!
//! Editors ask for a quick table/column index and a list of diagnostics.
//! [`HeuristicInsight`] answers from the line scanners alone and never fails;
//! [`ParserInsight`] answers from the parser and compiler when the text
//! parses, and falls back to the heuristics when it does not.

use crate::compile::{CompileError, CompileOptions, CompileWarning, compile, qualify};
use crate::dialect::Dialect;
use crate::extract::{SchemaIndex, extract};
use crate::lint::{Diagnostic, Severity, lint};
use crate::parser::{ParseError, parse};

pub trait DocumentInsight {
    fn quick_index(&self, text: &str) -> SchemaIndex;
    fn diagnostics(&self, text: &str) -> Vec<Diagnostic>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicInsight;

impl DocumentInsight for HeuristicInsight {
    fn quick_index(&self, text: &str) -> SchemaIndex {
        extract(text)
    }

    fn diagnostics(&self, text: &str) -> Vec<Diagnostic> {
        lint(text)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParserInsight {
    pub dialect: Dialect,
    pub options: CompileOptions,
}

impl ParserInsight {
    pub fn new(dialect: Dialect, options: CompileOptions) -> Self {
        Self { dialect, options }
    }
}

impl DocumentInsight for ParserInsight {
    fn quick_index(&self, text: &str) -> SchemaIndex {
        let Ok(doc) = parse(text, self.dialect) else {
            return extract(text);
        };
        let Ok(compiled) = compile(&doc, &self.options) else {
            return extract(text);
        };

        let mut index = SchemaIndex::default();
        for node in &compiled.graph.nodes {
            let columns = node.columns.iter().map(|c| c.name.clone()).collect();
            index.insert_table(node.id.clone(), columns);
        }
        for table in &doc.tables {
            if let Some(alias) = &table.alias {
                let target = qualify(table.schema.as_deref(), &table.name);
                index.add_alias(alias.clone(), target);
            }
        }
        index.resolve_aliases();
        index
    }

    fn diagnostics(&self, text: &str) -> Vec<Diagnostic> {
        let mut diagnostics = lint(text);

        let doc = match parse(text, self.dialect) {
            Ok(doc) => doc,
            Err(err) => {
                diagnostics.push(parse_error_diagnostic(text, &err));
                return diagnostics;
            }
        };

        match compile(&doc, &self.options) {
            Ok(compiled) => diagnostics.extend(
                compiled
                    .warnings
                    .iter()
                    .map(|w| warning_diagnostic(text, w)),
            ),
            Err(err) => diagnostics.push(compile_error_diagnostic(text, &err)),
        }

        diagnostics
    }
}

pub fn parse_error_diagnostic(text: &str, err: &ParseError) -> Diagnostic {
    match err.line() {
        Some(line) => Diagnostic::on_line(text, line, Severity::Error, err.to_string()),
        None => Diagnostic::at_start(Severity::Error, err.to_string()),
    }
}

pub fn compile_error_diagnostic(text: &str, err: &CompileError) -> Diagnostic {
    match err {
        CompileError::CompositeArity { line, .. } | CompileError::AliasConflict { line, .. } => {
            Diagnostic::on_line(text, *line, Severity::Error, err.to_string())
        }
        CompileError::UnknownPartial { .. } | CompileError::DuplicateTable(_) => {
            Diagnostic::at_start(Severity::Error, err.to_string())
        }
    }
}

pub fn warning_diagnostic(text: &str, warning: &CompileWarning) -> Diagnostic {
    let line = match warning {
        CompileWarning::IncompleteRef { line }
        | CompileWarning::DanglingRef { line, .. }
        | CompileWarning::UnknownPartial { line, .. } => *line,
    };
    Diagnostic::on_line(text, line, Severity::Warning, warning.to_string())
}
