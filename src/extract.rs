//! Line-oriented table/column index for editor completion.
//!
//! This is a best-effort scan that tolerates half-typed input. It knows
//! nothing about nesting, comments or column settings; the full parser is
//! the authority on structure.

use indexmap::IndexMap;
use serde::Serialize;

use crate::compile::qualify;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SchemaIndex {
    /// Qualified table name (and resolved aliases) to column names.
    pub tables: IndexMap<String, Vec<String>>,
    /// Alias to qualified table name.
    pub aliases: IndexMap<String, String>,
}

impl SchemaIndex {
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn insert_table(&mut self, key: String, columns: Vec<String>) {
        self.tables.insert(key, columns);
    }

    pub fn add_alias(&mut self, alias: String, target: String) {
        self.aliases.insert(alias, target);
    }

    /// Copy each alias target's columns under the alias key.
    pub fn resolve_aliases(&mut self) {
        for (alias, target) in &self.aliases {
            if let Some(columns) = self.tables.get(target).cloned() {
                self.tables.insert(alias.clone(), columns);
            }
        }
    }

    pub fn columns(&self, key: &str) -> Option<&[String]> {
        self.tables.get(key).map(Vec::as_slice)
    }

    /// Find a table by exact key, by `public.<name>`, or by alias.
    pub fn resolve(&self, name: &str) -> Option<(&str, &[String])> {
        let default_key = qualify(None, name);
        [name, default_key.as_str()]
            .into_iter()
            .chain(self.aliases.get(name).map(String::as_str))
            .find_map(|key| self.tables.get_key_value(key))
            .map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

/// Build a [`SchemaIndex`] from raw text. Never fails.
pub fn extract(text: &str) -> SchemaIndex {
    let mut index = SchemaIndex::default();
    let mut current: Option<String> = None;

    for raw in text.lines() {
        let line = raw.trim();

        if let Some(header) = parse_table_header(line) {
            let key = qualify(header.schema, header.name);
            if let Some(alias) = header.alias {
                index.add_alias(alias.to_string(), key.clone());
            }
            index.insert_table(key.clone(), Vec::new());
            current = Some(key);
            continue;
        }

        if line == "}" {
            current = None;
            continue;
        }

        if let Some(table) = &current {
            if let Some((column, _)) = leading_name(line) {
                if let Some(columns) = index.tables.get_mut(table) {
                    columns.push(column.to_string());
                }
            }
        }
    }

    index.resolve_aliases();
    index
}

struct TableHeader<'a> {
    schema: Option<&'a str>,
    name: &'a str,
    alias: Option<&'a str>,
}

/// `Table [schema.]name [as alias] ...`
fn parse_table_header(line: &str) -> Option<TableHeader<'_>> {
    let keyword = line.get(..5)?;
    if !keyword.eq_ignore_ascii_case("table") {
        return None;
    }
    let rest = &line[5..];
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }

    let (first, rest) = leading_name(rest.trim_start())?;
    let (schema, name, rest) = match rest.strip_prefix('.') {
        Some(after_dot) => {
            let (name, rest) = leading_name(after_dot)?;
            (Some(first), name, rest)
        }
        None => (None, first, rest),
    };

    let mut alias = None;
    let rest = rest.trim_start();
    if let Some(after_as) = rest.get(..2).filter(|k| k.eq_ignore_ascii_case("as")) {
        let tail = &rest[after_as.len()..];
        if tail.starts_with(char::is_whitespace) {
            alias = leading_name(tail.trim_start()).map(|(a, _)| a);
        }
    }

    Some(TableHeader {
        schema,
        name,
        alias,
    })
}

/// Leading identifier (`\w+` or `"quoted"`) and the remaining text.
fn leading_name(s: &str) -> Option<(&str, &str)> {
    if let Some(quoted) = s.strip_prefix('"') {
        let end = quoted.find('"')?;
        return Some((&quoted[..end], &quoted[end + 1..]));
    }

    let end = s
        .char_indices()
        .find(|(_, c)| !(c.is_alphanumeric() || *c == '_'))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    if end == 0 {
        None
    } else {
        Some((&s[..end], &s[end..]))
    }
}
