//! Document tree produced by the parser and consumed by the compiler.

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    pub project: Option<Project>,
    /// Tables in declaration order, qualified or not.
    pub tables: Vec<Table>,
    pub partials: Vec<TablePartial>,
    /// Top-level `Ref` declarations in declaration order.
    pub refs: Vec<Ref>,
    pub enums: Vec<Enum>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Project {
    pub name: Option<String>,
    pub database_type: Option<String>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub schema: Option<String>,
    pub name: String,
    pub alias: Option<String>,
    /// Columns and `~partial` markers in body order.
    pub items: Vec<TableItem>,
    pub indexes: Vec<Index>,
    pub note: Option<String>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableItem {
    Column(Column),
    /// `~name` injection point for a `TablePartial`.
    Partial { name: String, line: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TablePartial {
    pub name: String,
    pub columns: Vec<Column>,
    pub indexes: Vec<Index>,
    pub note: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub typ: Option<String>,
    pub settings: Vec<ColumnSetting>,
    pub line: usize,
}

impl Column {
    pub fn has(&self, setting: &ColumnSetting) -> bool {
        self.settings.contains(setting)
    }

    pub fn note(&self) -> Option<&str> {
        self.settings.iter().find_map(|s| match s {
            ColumnSetting::Note(n) => Some(n.as_str()),
            _ => None,
        })
    }

    pub fn inline_refs(&self) -> impl Iterator<Item = &InlineRef> {
        self.settings.iter().filter_map(|s| match s {
            ColumnSetting::Ref(r) => Some(r),
            _ => None,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ColumnSetting {
    Pk,
    NotNull,
    Null,
    Unique,
    Increment,
    Note(String),
    Default(String),
    Ref(InlineRef),
}

/// `ref: > users.id` declared on a column.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineRef {
    pub relation: Relation,
    pub target: RefEndpoint,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    /// Column names or backtick expressions.
    pub columns: Vec<String>,
    pub pk: bool,
    pub unique: bool,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ref {
    pub name: Option<String>,
    pub left: Option<RefEndpoint>,
    pub relation: Relation,
    pub right: Option<RefEndpoint>,
    pub on_delete: Option<String>,
    pub on_update: Option<String>,
    pub line: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefEndpoint {
    pub schema: Option<String>,
    pub table: String,
    /// One entry per column; more than one for composite refs.
    pub fields: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    ManyToOne,  // >
    OneToMany,  // <
    OneToOne,   // -
    ManyToMany, // <>
}

impl Relation {
    /// Whether the left/right endpoint holds the foreign key.
    pub fn foreign_sides(self) -> (bool, bool) {
        match self {
            Relation::ManyToOne => (true, false),
            Relation::OneToMany => (false, true),
            Relation::OneToOne => (true, false),
            Relation::ManyToMany => (true, true),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Enum {
    pub schema: Option<String>,
    pub name: String,
    pub values: Vec<EnumValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumValue {
    pub name: String,
    pub note: Option<String>,
}
