//! Document tree to node/edge graph.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::ast::{
    Column, ColumnSetting, Document, Index, Ref, RefEndpoint, Relation, Table, TableItem,
    TablePartial,
};
use crate::graph::{ColumnView, Edge, Graph, KeyRole, Node, Position};

pub const DEFAULT_SCHEMA: &str = "public";
pub const UNKNOWN_TYPE: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompileOptions {
    /// Fail on `~partial` markers that name no declared `TablePartial`.
    pub strict_group_resolution: bool,
    pub grid_columns: usize,
    pub spacing_x: f64,
    pub spacing_y: f64,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            strict_group_resolution: false,
            grid_columns: 4,
            spacing_x: 300.0,
            spacing_y: 250.0,
        }
    }
}

impl CompileOptions {
    /// Grid slot for the `index`-th declared table.
    pub fn grid_position(&self, index: usize) -> Position {
        let columns = self.grid_columns.max(1);
        let col = index % columns;
        let row = index / columns;
        Position::new(col as f64 * self.spacing_x, row as f64 * self.spacing_y)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error("table {table} references unknown partial ~{partial}")]
    UnknownPartial { table: String, partial: String },
    #[error("table {0} is declared more than once")]
    DuplicateTable(String),
    #[error("ref on line {line} pairs {left} field(s) with {right} field(s)")]
    CompositeArity {
        line: usize,
        left: usize,
        right: usize,
    },
    #[error("alias {alias} of table {table} on line {line} collides with {other}")]
    AliasConflict {
        alias: String,
        table: String,
        other: String,
        line: usize,
    },
}

/// Non-fatal problems; the affected piece is left out of the graph.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileWarning {
    #[error("ref on line {line} is missing an endpoint and was skipped")]
    IncompleteRef { line: usize },
    #[error("table {table} references unknown partial ~{partial}; expanded to nothing")]
    UnknownPartial {
        table: String,
        partial: String,
        line: usize,
    },
    #[error("ref on line {line} points at unknown table {table} and was dropped")]
    DanglingRef { line: usize, table: String },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledGraph {
    pub graph: Graph,
    pub warnings: Vec<CompileWarning>,
}

/// Qualified id for a table: `schema.name`, schema defaulting to `public`.
pub fn qualify(schema: Option<&str>, name: &str) -> String {
    format!("{}.{}", schema.unwrap_or(DEFAULT_SCHEMA), name)
}

/// Alias to qualified table. An alias may not repeat, nor name a different
/// table by its bare or qualified name, since unqualified endpoints look up
/// aliases first.
fn collect_aliases(doc: &Document) -> Result<HashMap<&str, String>, CompileError> {
    let mut aliases: HashMap<&str, String> = HashMap::new();

    for table in &doc.tables {
        let Some(alias) = table.alias.as_deref() else {
            continue;
        };
        let id = qualify(table.schema.as_deref(), &table.name);
        let conflict = |other: String| CompileError::AliasConflict {
            alias: alias.to_string(),
            table: id.clone(),
            other,
            line: table.line,
        };

        if let Some(previous) = aliases.get(alias) {
            return Err(conflict(format!("the alias of {previous}")));
        }
        if let Some(other) = doc.tables.iter().find(|t| {
            !std::ptr::eq(*t, table)
                && (t.name == alias || qualify(t.schema.as_deref(), &t.name) == alias)
        }) {
            return Err(conflict(format!(
                "table {}",
                qualify(other.schema.as_deref(), &other.name)
            )));
        }

        aliases.insert(alias, id);
    }

    Ok(aliases)
}

/// A table with its partial markers spliced out.
struct ExpandedTable<'a> {
    id: String,
    table: &'a Table,
    fields: Vec<&'a Column>,
    indexes: Vec<&'a Index>,
}

/// A relationship from either a `Ref` declaration or a column `ref:` setting.
struct RefSource<'a> {
    line: usize,
    left: Option<Endpoint<'a>>,
    relation: Relation,
    right: Option<Endpoint<'a>>,
}

struct Endpoint<'a> {
    table: String,
    fields: Vec<&'a str>,
}

struct Compiler<'a> {
    doc: &'a Document,
    options: &'a CompileOptions,
    partials: HashMap<&'a str, &'a TablePartial>,
    aliases: HashMap<&'a str, String>,
    warnings: Vec<CompileWarning>,
}

/// Compile a parsed document into a graph. Output depends only on the inputs.
pub fn compile(doc: &Document, options: &CompileOptions) -> Result<CompiledGraph, CompileError> {
    Compiler::new(doc, options)?.run()
}

impl<'a> Compiler<'a> {
    fn new(doc: &'a Document, options: &'a CompileOptions) -> Result<Self, CompileError> {
        let partials = doc.partials.iter().map(|p| (p.name.as_str(), p)).collect();

        Ok(Self {
            doc,
            options,
            partials,
            aliases: collect_aliases(doc)?,
            warnings: Vec::new(),
        })
    }

    fn run(mut self) -> Result<CompiledGraph, CompileError> {
        let tables = self.expand_tables()?;
        let table_ids: HashSet<&str> = tables.iter().map(|t| t.id.as_str()).collect();

        let sources = self.collect_refs(&tables);
        let mut foreign: HashSet<(String, String)> = HashSet::new();
        let mut edges = Vec::new();

        for (ref_index, source) in sources.iter().enumerate() {
            let (left, right) = match (&source.left, &source.right) {
                (Some(l), Some(r)) if !l.fields.is_empty() && !r.fields.is_empty() => (l, r),
                _ => {
                    warn!(line = source.line, "skipping ref with a missing endpoint");
                    self.warnings
                        .push(CompileWarning::IncompleteRef { line: source.line });
                    continue;
                }
            };

            if left.fields.len() != right.fields.len() {
                return Err(CompileError::CompositeArity {
                    line: source.line,
                    left: left.fields.len(),
                    right: right.fields.len(),
                });
            }

            if let Some(missing) = [&left.table, &right.table]
                .into_iter()
                .find(|t| !table_ids.contains(t.as_str()))
            {
                warn!(line = source.line, table = %missing, "dropping ref to unknown table");
                self.warnings.push(CompileWarning::DanglingRef {
                    line: source.line,
                    table: missing.clone(),
                });
                continue;
            }

            let (left_foreign, right_foreign) = source.relation.foreign_sides();
            for (field_index, (src, tgt)) in left.fields.iter().zip(&right.fields).enumerate() {
                if left_foreign {
                    foreign.insert((left.table.clone(), src.to_string()));
                }
                if right_foreign {
                    foreign.insert((right.table.clone(), tgt.to_string()));
                }
                edges.push(Edge::between(
                    format!("e-{}-{}-{ref_index}-{field_index}", left.table, right.table),
                    &left.table,
                    src,
                    &right.table,
                    tgt,
                ));
            }
        }

        let nodes = tables
            .iter()
            .enumerate()
            .map(|(i, t)| self.build_node(i, t, &foreign))
            .collect::<Vec<_>>();

        debug!(
            nodes = nodes.len(),
            edges = edges.len(),
            warnings = self.warnings.len(),
            "compiled document"
        );

        Ok(CompiledGraph {
            graph: Graph { nodes, edges },
            warnings: self.warnings,
        })
    }

    fn expand_tables(&mut self) -> Result<Vec<ExpandedTable<'a>>, CompileError> {
        let doc = self.doc;
        let mut seen = HashSet::new();
        let mut expanded = Vec::with_capacity(doc.tables.len());

        for table in &doc.tables {
            let id = qualify(table.schema.as_deref(), &table.name);
            if !seen.insert(id.clone()) {
                return Err(CompileError::DuplicateTable(id));
            }
            let (fields, indexes) = self.expand_fields(&id, table)?;
            expanded.push(ExpandedTable {
                id,
                table,
                fields,
                indexes,
            });
        }

        Ok(expanded)
    }

    /// Splice partial fields at their markers. Columns declared on the table
    /// win over injected ones; a later partial replaces an earlier partial's
    /// field in place.
    fn expand_fields(
        &mut self,
        id: &str,
        table: &'a Table,
    ) -> Result<(Vec<&'a Column>, Vec<&'a Index>), CompileError> {
        let direct: HashSet<&str> = table
            .items
            .iter()
            .filter_map(|item| match item {
                TableItem::Column(c) => Some(c.name.as_str()),
                TableItem::Partial { .. } => None,
            })
            .collect();

        let mut fields: Vec<&'a Column> = Vec::new();
        let mut injected_at: HashMap<&str, usize> = HashMap::new();
        let mut indexes: Vec<&'a Index> = table.indexes.iter().collect();

        for item in &table.items {
            match item {
                TableItem::Column(c) => fields.push(c),
                TableItem::Partial { name, line } => {
                    let Some(partial) = self.partials.get(name.as_str()).copied() else {
                        if self.options.strict_group_resolution {
                            return Err(CompileError::UnknownPartial {
                                table: id.to_string(),
                                partial: name.clone(),
                            });
                        }
                        debug!(table = id, partial = %name, "unknown partial expands to nothing");
                        self.warnings.push(CompileWarning::UnknownPartial {
                            table: id.to_string(),
                            partial: name.clone(),
                            line: *line,
                        });
                        continue;
                    };

                    for column in &partial.columns {
                        if direct.contains(column.name.as_str()) {
                            continue;
                        }
                        match injected_at.get(column.name.as_str()) {
                            Some(&at) => fields[at] = column,
                            None => {
                                injected_at.insert(column.name.as_str(), fields.len());
                                fields.push(column);
                            }
                        }
                    }
                    indexes.extend(partial.indexes.iter());
                }
            }
        }

        Ok((fields, indexes))
    }

    fn resolve_table(&self, endpoint: &RefEndpoint) -> String {
        match (&endpoint.schema, self.aliases.get(endpoint.table.as_str())) {
            (None, Some(target)) => target.clone(),
            (schema, _) => qualify(schema.as_deref(), &endpoint.table),
        }
    }

    fn endpoint(&self, endpoint: &'a RefEndpoint) -> Endpoint<'a> {
        Endpoint {
            table: self.resolve_table(endpoint),
            fields: endpoint.fields.iter().map(String::as_str).collect(),
        }
    }

    /// Declared refs first, then column-level refs in table/field order.
    fn collect_refs(&self, tables: &[ExpandedTable<'a>]) -> Vec<RefSource<'a>> {
        let declared = self.doc.refs.iter().map(|r: &'a Ref| RefSource {
            line: r.line,
            left: r.left.as_ref().map(|e| self.endpoint(e)),
            relation: r.relation,
            right: r.right.as_ref().map(|e| self.endpoint(e)),
        });

        let inline = tables.iter().flat_map(|t| {
            t.fields.iter().flat_map(move |column| {
                column.inline_refs().map(move |inline| RefSource {
                    line: column.line,
                    left: Some(Endpoint {
                        table: t.id.clone(),
                        fields: vec![column.name.as_str()],
                    }),
                    relation: inline.relation,
                    right: Some(self.endpoint(&inline.target)),
                })
            })
        });

        declared.chain(inline).collect()
    }

    fn build_node(
        &self,
        index: usize,
        table: &ExpandedTable<'a>,
        foreign: &HashSet<(String, String)>,
    ) -> Node {
        let index_pk: HashSet<&str> = table
            .indexes
            .iter()
            .filter(|i| i.pk)
            .flat_map(|i| i.columns.iter().map(String::as_str))
            .collect();
        let index_unique: HashSet<&str> = table
            .indexes
            .iter()
            .filter(|i| i.unique && i.columns.len() == 1)
            .map(|i| i.columns[0].as_str())
            .collect();

        let columns = table
            .fields
            .iter()
            .map(|c| {
                let name = c.name.as_str();
                let pk = c.has(&ColumnSetting::Pk) || index_pk.contains(name);
                let fk = foreign.contains(&(table.id.clone(), c.name.clone()));
                let unique =
                    c.has(&ColumnSetting::Unique) || index_unique.contains(name);
                ColumnView {
                    name: c.name.clone(),
                    typ: c.typ.clone().unwrap_or_else(|| UNKNOWN_TYPE.to_string()),
                    key: KeyRole::derive(pk, fk, unique),
                    note: c.note().map(str::to_string),
                }
            })
            .collect();

        let table_name = match table.table.schema.as_deref() {
            None | Some(DEFAULT_SCHEMA) => table.table.name.clone(),
            Some(_) => table.id.clone(),
        };

        Node {
            id: table.id.clone(),
            position: self.options.grid_position(index),
            table_name,
            columns,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::parser::parse;

    fn compile_str(input: &str) -> CompiledGraph {
        let doc = parse(input, Dialect::DbmlV2).unwrap();
        compile(&doc, &CompileOptions::default()).unwrap()
    }

    fn column_names(node: &Node) -> Vec<&str> {
        node.columns.iter().map(|c| c.name.as_str()).collect()
    }

    #[test]
    fn test_empty_document() {
        let out = compile_str("   \n\t ");
        assert!(out.graph.is_empty());
        assert!(out.warnings.is_empty());
    }

    #[test]
    fn test_pk_column_order() {
        let out = compile_str("Table users {\n  id integer [pk]\n  username varchar\n}");
        let node = &out.graph.nodes[0];
        assert_eq!(node.id, "public.users");
        assert_eq!(node.table_name, "users");
        assert_eq!(column_names(node), vec!["id", "username"]);
        assert_eq!(node.columns[0].key, Some(KeyRole::Pk));
        assert_eq!(node.columns[1].key, None);
    }

    #[test]
    fn test_missing_type_falls_back() {
        let out = compile_str("Table t {\n  mystery\n}");
        assert_eq!(out.graph.nodes[0].columns[0].typ, UNKNOWN_TYPE);
    }

    #[test]
    fn test_composite_ref_pairs_positionally() {
        let out = compile_str(
            r#"
            Table a { x int
              y int }
            Table b { c int
              d int }
            Ref: a.(x, y) > b.(c, d)
        "#,
        );
        let edges = &out.graph.edges;
        assert_eq!(edges.len(), 2);
        assert_eq!(edges[0].label, "x → c");
        assert_eq!(edges[1].label, "y → d");
        assert_eq!(edges[0].id, "e-public.a-public.b-0-0");
        assert_eq!(edges[1].id, "e-public.a-public.b-0-1");
        assert_eq!(edges[1].source_handle, "source-y");
        assert_eq!(edges[1].target_handle, "target-d");
    }

    #[test]
    fn test_incomplete_ref_is_skipped() {
        let out = compile_str(
            r#"
            Table users { id int [pk] }
            Table posts { user_id int }
            Ref: posts > users.id
            Ref: posts.user_id > users.id
        "#,
        );
        assert_eq!(out.graph.edges.len(), 1);
        assert_eq!(out.graph.edges[0].id, "e-public.posts-public.users-1-0");
        assert_eq!(out.warnings, vec![CompileWarning::IncompleteRef { line: 4 }]);
    }

    #[test]
    fn test_composite_arity_mismatch_is_an_error() {
        let doc = parse(
            "Table a { x int }\nTable b { c int }\nRef: a.x > b.(c, d)",
            Dialect::DbmlV2,
        )
        .unwrap();
        let err = compile(&doc, &CompileOptions::default()).unwrap_err();
        assert_eq!(
            err,
            CompileError::CompositeArity {
                line: 3,
                left: 1,
                right: 2
            }
        );
    }

    #[test]
    fn test_partial_expansion_in_place() {
        let out = compile_str(
            r#"
            TablePartial contact_info {
                email varchar
                phone varchar
            }
            Table customers {
                id int [pk]
                ~contact_info
                name varchar
            }
        "#,
        );
        assert_eq!(
            column_names(&out.graph.nodes[0]),
            vec!["id", "email", "phone", "name"]
        );
    }

    #[test]
    fn test_partial_override_rules() {
        let out = compile_str(
            r#"
            TablePartial base { id int
              created_at timestamp }
            TablePartial audit { created_at timestamptz }
            Table t {
                ~base
                ~audit
                id bigint [pk]
            }
        "#,
        );
        let node = &out.graph.nodes[0];
        assert_eq!(column_names(node), vec!["created_at", "id"]);
        assert_eq!(node.columns[0].typ, "timestamptz");
        assert_eq!(node.columns[1].typ, "bigint");
    }

    #[test]
    fn test_unknown_partial_lenient_and_strict() {
        let src = "Table t {\n  id int\n  ~missing\n}";
        let out = compile_str(src);
        assert_eq!(column_names(&out.graph.nodes[0]), vec!["id"]);
        assert_eq!(
            out.warnings,
            vec![CompileWarning::UnknownPartial {
                table: "public.t".into(),
                partial: "missing".into(),
                line: 3,
            }]
        );

        let doc = parse(src, Dialect::DbmlV2).unwrap();
        let strict = CompileOptions {
            strict_group_resolution: true,
            ..CompileOptions::default()
        };
        assert!(matches!(
            compile(&doc, &strict),
            Err(CompileError::UnknownPartial { .. })
        ));
    }

    #[test]
    fn test_grid_layout() {
        let src: String = (0..5).map(|i| format!("Table t{i} {{ id int }}\n")).collect();
        let out = compile_str(&src);
        let options = CompileOptions::default();
        assert_eq!(out.graph.nodes[3].position, Position::new(3.0 * options.spacing_x, 0.0));
        assert_eq!(out.graph.nodes[4].position, Position::new(0.0, options.spacing_y));
    }

    #[test]
    fn test_roles_from_refs_and_indexes() {
        let out = compile_str(
            r#"
            Table users {
                id int [pk]
                email varchar [unique]
            }
            Table posts {
                id int
                user_id int [ref: > users.id, unique]
                slug varchar
                indexes {
                    id [pk]
                    slug [unique]
                }
            }
        "#,
        );
        let posts = out.graph.node("public.posts").unwrap();
        let roles: Vec<Option<KeyRole>> = posts.columns.iter().map(|c| c.key).collect();
        assert_eq!(
            roles,
            vec![Some(KeyRole::Pk), Some(KeyRole::Fk), Some(KeyRole::Unique)]
        );
        let users = out.graph.node("public.users").unwrap();
        assert_eq!(users.columns[1].key, Some(KeyRole::Unique));
        assert_eq!(out.graph.edges[0].label, "user_id → id");
    }

    #[test]
    fn test_schema_and_alias_resolution() {
        let out = compile_str(
            r#"
            Table sales.orders as o { id int [pk]
              customer_id int }
            Table customers { id int [pk] }
            Ref: o.customer_id > customers.id
            Ref: sales.orders.id < public.customers.id
        "#,
        );
        assert_eq!(out.graph.nodes[0].id, "sales.orders");
        assert_eq!(out.graph.nodes[0].table_name, "sales.orders");
        assert_eq!(out.graph.edges.len(), 2);
        assert_eq!(out.graph.edges[0].source, "sales.orders");
        assert_eq!(out.graph.edges[0].target, "public.customers");
        // `<` puts the foreign key on the right side
        let customers = out.graph.node("public.customers").unwrap();
        assert_eq!(customers.columns[0].key, Some(KeyRole::Pk));
    }

    #[test]
    fn test_dangling_ref_dropped() {
        let out = compile_str("Table a { id int }\nRef: a.id > ghost.id");
        assert!(out.graph.edges.is_empty());
        assert_eq!(
            out.warnings,
            vec![CompileWarning::DanglingRef {
                line: 2,
                table: "public.ghost".into()
            }]
        );
    }

    #[test]
    fn test_inline_ref_warning_points_at_column() {
        let out = compile_str("Table a {\n  id int\n  x int [ref: > ghost.id]\n}");
        assert_eq!(
            out.warnings,
            vec![CompileWarning::DanglingRef {
                line: 3,
                table: "public.ghost".into()
            }]
        );
    }

    #[test]
    fn test_alias_shadowing_a_table_is_an_error() {
        let doc = parse(
            "Table orders as users { id int }\nTable users { id int }\nTable posts { uid int }\nRef: posts.uid > users.id",
            Dialect::DbmlV2,
        )
        .unwrap();
        assert_eq!(
            compile(&doc, &CompileOptions::default()).unwrap_err(),
            CompileError::AliasConflict {
                alias: "users".into(),
                table: "public.orders".into(),
                other: "table public.users".into(),
                line: 1,
            }
        );

        let doc = parse("Table a as x { id int }\nTable b as x { id int }", Dialect::DbmlV2).unwrap();
        assert!(matches!(
            compile(&doc, &CompileOptions::default()),
            Err(CompileError::AliasConflict { line: 2, .. })
        ));

        // naming a table after itself is harmless
        let out = compile_str("Table users as users { id int }\nRef: users.id - users.id");
        assert_eq!(out.graph.edges.len(), 1);
    }

    #[test]
    fn test_duplicate_table_is_an_error() {
        let doc = parse("Table a { id int }\nTable public.a { id int }", Dialect::DbmlV2).unwrap();
        assert_eq!(
            compile(&doc, &CompileOptions::default()).unwrap_err(),
            CompileError::DuplicateTable("public.a".into())
        );
    }

    #[test]
    fn test_partial_inline_refs_follow_each_table() {
        let out = compile_str(
            r#"
            Table users { id int [pk] }
            TablePartial owned { owner_id int [ref: > users.id] }
            Table docs { id int
              ~owned }
            Table notes { id int
              ~owned }
        "#,
        );
        let sources: Vec<&str> = out.graph.edges.iter().map(|e| e.source.as_str()).collect();
        assert_eq!(sources, vec!["public.docs", "public.notes"]);
        assert_eq!(out.graph.edges[1].id, "e-public.notes-public.users-1-0");
    }

    #[test]
    fn test_compile_is_deterministic() {
        let src = r#"
            Table users { id int [pk] }
            Table posts { id int [pk]
              user_id int [ref: > users.id] }
            Ref: posts.id - users.id
        "#;
        let a = serde_json::to_string(&compile_str(src).graph).unwrap();
        let b = serde_json::to_string(&compile_str(src).graph).unwrap();
        assert_eq!(a, b);
    }
}
