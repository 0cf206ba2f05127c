use dbmlflow::compile::{CompileOptions, compile};
use dbmlflow::dialect::Dialect;
use dbmlflow::extract::extract;
use dbmlflow::graph::{KeyRole, Position};
use dbmlflow::lint::lint;
use dbmlflow::parser::parse;
use dbmlflow::session::{Connection, GraphState, Session, SessionConfig};
use proptest::prelude::*;

const SHOP: &str = r#"
Project shop {
  database_type: 'PostgreSQL'
}

TablePartial audited {
  created_at timestamp [not null]
  updated_at timestamp
}

Table users as U {
  id int [pk, increment]
  email varchar [unique]
  ~audited
}

Table sales.orders {
  id int [pk]
  user_id int [ref: > U.id]
  total decimal(10, 2)
}

Table sales.order_lines {
  order_id int
  line_no int
  indexes {
    (order_id, line_no) [pk]
  }
}

Ref: sales.order_lines.order_id > sales.orders.id
"#;

#[test]
fn shop_compiles_end_to_end() {
    let doc = parse(SHOP, Dialect::DbmlV2).unwrap();
    let compiled = compile(&doc, &CompileOptions::default()).unwrap();
    assert!(compiled.warnings.is_empty());

    let graph = &compiled.graph;
    let ids: Vec<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
    assert_eq!(ids, vec!["public.users", "sales.orders", "sales.order_lines"]);

    let users = graph.node("public.users").unwrap();
    assert_eq!(users.table_name, "users");
    let names: Vec<&str> = users.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["id", "email", "created_at", "updated_at"]);
    assert_eq!(users.columns[0].key, Some(KeyRole::Pk));
    assert_eq!(users.columns[1].key, Some(KeyRole::Unique));

    let orders = graph.node("sales.orders").unwrap();
    assert_eq!(orders.table_name, "sales.orders");
    assert_eq!(orders.position, Position::new(300.0, 0.0));
    assert_eq!(orders.columns[1].key, Some(KeyRole::Fk));

    let lines = graph.node("sales.order_lines").unwrap();
    assert_eq!(lines.columns[0].key, Some(KeyRole::Pk));
    assert_eq!(lines.columns[1].key, Some(KeyRole::Pk));

    assert_eq!(graph.edges.len(), 2);
    assert_eq!(graph.edges[0].source, "sales.order_lines");
    assert_eq!(graph.edges[0].target, "sales.orders");
    assert_eq!(graph.edges[1].source, "sales.orders");
    assert_eq!(graph.edges[1].target, "public.users");
    assert_eq!(graph.edges[1].source_handle, "source-user_id");
    assert_eq!(graph.edges[1].target_handle, "target-id");
}

#[test]
fn graph_json_uses_camel_case() {
    let doc = parse(SHOP, Dialect::DbmlV2).unwrap();
    let compiled = compile(&doc, &CompileOptions::default()).unwrap();
    let json = serde_json::to_value(&compiled.graph).unwrap();

    let node = &json["nodes"][0];
    assert_eq!(node["tableName"], "users");
    assert_eq!(node["columns"][0]["type"], "int");
    assert_eq!(node["columns"][0]["key"], "PK");
    assert!(node["columns"][2].get("key").is_none());

    let edge = &json["edges"][0];
    assert!(edge.get("sourceHandle").is_some());
    assert!(edge.get("targetHandle").is_some());
}

#[test]
fn heuristics_agree_on_table_keys() {
    let index = extract(SHOP);
    let keys: Vec<&String> = index.tables.keys().collect();
    assert_eq!(
        keys,
        vec!["public.users", "sales.orders", "sales.order_lines", "U"]
    );
    assert!(lint(SHOP).is_empty());
}

#[test]
fn legacy_dialect_rejects_partials() {
    assert!(parse(SHOP, Dialect::Dbml).is_err());

    let mut session = Session::new(SessionConfig {
        dialect: Dialect::Dbml,
        ..SessionConfig::default()
    });
    session.update(SHOP);
    assert!(matches!(session.state(), GraphState::Failed { .. }));
}

#[test]
fn session_edit_cycle() {
    let mut session = Session::default();
    session.update(SHOP);

    session
        .move_node("sales.orders", Position::new(40.0, 80.0))
        .unwrap();
    let id = session
        .connect(&Connection {
            source: "public.users".to_string(),
            source_handle: "source-email".to_string(),
            target: "sales.orders".to_string(),
            target_handle: "target-total".to_string(),
        })
        .unwrap();
    assert!(id.starts_with("e-public.users-sales.orders-"));
    assert_eq!(session.graph().unwrap().edges.len(), 3);

    session.delete_node("public.users").unwrap();
    let graph = session.graph().unwrap();
    assert_eq!(graph.nodes.len(), 2);
    assert_eq!(graph.edges.len(), 1);

    // a broken edit fails, the next good one recovers the full graph
    session.update("Table users {");
    assert!(session.graph().is_none());
    session.update(SHOP);
    assert_eq!(session.graph().unwrap().nodes.len(), 3);
}

fn table_doc() -> impl Strategy<Value = String> {
    let table = ("[a-z]{1,6}", prop::collection::vec("[a-z]{1,6}", 0..4)).prop_map(
        |(name, columns)| {
            let body: String = columns.iter().map(|c| format!("  {c} int\n")).collect();
            format!("Table {name} {{\n{body}}}\n")
        },
    );
    prop::collection::vec(table, 0..5).prop_map(|tables| tables.concat())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_extract_is_total(input in ".{0,256}") {
        let index = extract(&input);
        for (alias, target) in &index.aliases {
            if alias.contains('.') {
                continue;
            }
            if let Some(columns) = index.tables.get(target) {
                prop_assert_eq!(index.tables.get(alias), Some(columns));
            }
        }
        let _ = lint(&input);
    }

    #[test]
    fn prop_compile_is_deterministic(text in table_doc()) {
        let Ok(doc) = parse(&text, Dialect::DbmlV2) else {
            return Ok(());
        };
        let first = compile(&doc, &CompileOptions::default());
        let second = compile(&doc, &CompileOptions::default());
        prop_assert_eq!(first, second);
    }
}
