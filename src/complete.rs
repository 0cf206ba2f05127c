//! Keyword, table and column suggestions for the editor.

use serde::Serialize;

use crate::extract::{SchemaIndex, extract};

pub const KEYWORDS: [&str; 4] = ["Table", "Ref", "Project", "Enum"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionKind {
    Keyword,
    Table,
    Field,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Completion {
    pub label: String,
    pub kind: CompletionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<String>,
}

impl Completion {
    fn keyword(label: &str) -> Self {
        Self {
            label: label.to_string(),
            kind: CompletionKind::Keyword,
            info: None,
        }
    }

    fn table(label: &str) -> Self {
        Self {
            label: label.to_string(),
            kind: CompletionKind::Table,
            info: None,
        }
    }

    fn field(label: &str, table: &str) -> Self {
        Self {
            label: label.to_string(),
            kind: CompletionKind::Field,
            info: Some(format!("Column of {table}")),
        }
    }
}

/// Suggestions for `prefix` over the tables found in `text`.
pub fn complete(prefix: &str, explicit: bool, text: &str) -> Vec<Completion> {
    complete_from_index(&extract(text), prefix, explicit)
}

/// Suggestions ranked keywords, tables, then fields, each in document order.
/// A `qualifier.partial` prefix narrows the list to that table's columns.
pub fn complete_from_index(index: &SchemaIndex, prefix: &str, explicit: bool) -> Vec<Completion> {
    if prefix.is_empty() && !explicit {
        return Vec::new();
    }

    if let Some((qualifier, partial)) = prefix.rsplit_once('.') {
        if let Some((key, columns)) = index.resolve(qualifier) {
            return columns
                .iter()
                .filter(|c| starts_with_ignore_case(c, partial))
                .map(|c| Completion::field(c, key))
                .collect();
        }
    }

    let keywords = KEYWORDS
        .iter()
        .filter(|k| starts_with_ignore_case(k, prefix))
        .map(|k| Completion::keyword(k));

    let tables = index
        .tables
        .keys()
        .filter(|key| {
            let bare = key.rsplit_once('.').map_or(key.as_str(), |(_, name)| name);
            starts_with_ignore_case(key, prefix) || starts_with_ignore_case(bare, prefix)
        })
        .map(|key| Completion::table(key));

    let fields = index.tables.iter().flat_map(|(table, columns)| {
        columns
            .iter()
            .filter(|c| starts_with_ignore_case(c, prefix))
            .map(move |c| Completion::field(c, table))
    });

    keywords.chain(tables).chain(fields).collect()
}

/// The identifier being typed immediately before byte `offset`.
pub fn prefix_at(text: &str, offset: usize) -> &str {
    let mut end = offset.min(text.len());
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    let head = &text[..end];
    let start = head
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_alphanumeric() || *c == '_' || *c == '.')
        .last()
        .map_or(end, |(i, _)| i);
    &head[start..]
}

fn starts_with_ignore_case(candidate: &str, prefix: &str) -> bool {
    candidate
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"
Table users {
  id int [pk]
  username varchar
}
Table public.orders as o {
  id int
  user_id int
}
"#;

    fn labels(completions: &[Completion]) -> Vec<&str> {
        completions.iter().map(|c| c.label.as_str()).collect()
    }

    #[test]
    fn test_empty_prefix_requires_explicit() {
        assert!(complete("", false, DOC).is_empty());
        let all = complete("", true, DOC);
        assert_eq!(all[..4].iter().map(|c| c.kind).collect::<Vec<_>>(), vec![CompletionKind::Keyword; 4]);
        assert!(all.iter().any(|c| c.kind == CompletionKind::Table && c.label == "o"));
        assert_eq!(all.iter().filter(|c| c.kind == CompletionKind::Field).count(), 6);
    }

    #[test]
    fn test_ranked_and_filtered() {
        let got = complete("u", false, DOC);
        assert_eq!(labels(&got), vec!["public.users", "username", "user_id", "user_id"]);
        assert_eq!(got[0].kind, CompletionKind::Table);
        assert_eq!(got[1].info.as_deref(), Some("Column of public.users"));

        let got = complete("ta", false, DOC);
        assert_eq!(labels(&got), vec!["Table"]);
        assert_eq!(got[0].kind, CompletionKind::Keyword);
    }

    #[test]
    fn test_alias_scope_matches_target() {
        let via_alias = complete("o.", false, DOC);
        let via_table = complete("orders.", false, DOC);
        assert_eq!(labels(&via_alias), vec!["id", "user_id"]);
        assert_eq!(labels(&via_alias), labels(&via_table));
        assert_eq!(via_alias[0].info.as_deref(), Some("Column of o"));

        let narrowed = complete("o.us", false, DOC);
        assert_eq!(labels(&narrowed), vec!["user_id"]);
    }

    #[test]
    fn test_unresolved_qualifier_falls_back() {
        let got = complete("public.ord", false, DOC);
        assert_eq!(labels(&got), vec!["public.orders"]);
    }

    #[test]
    fn test_no_document() {
        assert_eq!(labels(&complete("R", false, "")), vec!["Ref"]);
    }

    #[test]
    fn test_prefix_at() {
        let text = "Ref: o.us";
        assert_eq!(prefix_at(text, text.len()), "o.us");
        assert_eq!(prefix_at(text, 3), "Ref");
        assert_eq!(prefix_at(text, 4), "");
        assert_eq!(prefix_at("ユーザー", 5), "ユ");
    }
}
