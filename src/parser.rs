use crate::ast::*;
use crate::dialect::Dialect;
use crate::lexer::{LexError, Lexer, Spanned, Token};

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("Lex error: {0}")]
    Lex(#[from] LexError),
    #[error("line {line}: unexpected token {found:?}, expected {expected}")]
    Unexpected {
        found: Token,
        expected: &'static str,
        line: usize,
    },
    #[error("line {line}: {construct} is not supported by the {dialect} dialect")]
    Unsupported {
        construct: &'static str,
        dialect: Dialect,
        line: usize,
    },
}

impl ParseError {
    /// 1-based line of the offending input, when known.
    pub fn line(&self) -> Option<usize> {
        match self {
            ParseError::Lex(
                LexError::UnexpectedChar { line, .. }
                | LexError::UnterminatedString { line }
                | LexError::UnterminatedComment { line },
            ) => Some(*line),
            ParseError::Unexpected { line, .. } | ParseError::Unsupported { line, .. } => {
                Some(*line)
            }
        }
    }
}

/// Parse DBML source into a [`Document`].
pub fn parse(input: &str, dialect: Dialect) -> Result<Document, ParseError> {
    Parser::new(input, dialect)?.parse()
}

static EOF: Spanned = Spanned {
    token: Token::Eof,
    line: 0,
};

pub struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    dialect: Dialect,
}

impl Parser {
    pub fn new(input: &str, dialect: Dialect) -> Result<Self, ParseError> {
        let tokens = Lexer::new(input).tokenize()?;
        Ok(Self {
            tokens,
            pos: 0,
            dialect,
        })
    }

    fn current(&self) -> &Spanned {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .unwrap_or(&EOF)
    }

    fn peek(&self) -> &Token {
        &self.current().token
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens
            .get(self.pos + offset)
            .map(|s| &s.token)
            .unwrap_or(&EOF.token)
    }

    fn line(&self) -> usize {
        self.current().line
    }

    /// Line of the most recently consumed token.
    fn prev_line(&self) -> usize {
        self.pos
            .checked_sub(1)
            .and_then(|i| self.tokens.get(i))
            .map(|s| s.line)
            .unwrap_or(1)
    }

    fn on_same_line(&self) -> bool {
        self.line() == self.prev_line() && *self.peek() != Token::Eof
    }

    fn advance(&mut self) -> Token {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn unexpected(&self, expected: &'static str) -> ParseError {
        ParseError::Unexpected {
            found: self.peek().clone(),
            expected,
            line: self.line(),
        }
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        match self.peek().clone() {
            Token::Ident(s) => {
                self.advance();
                Ok(s)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    fn expect(&mut self, expected: Token, what: &'static str) -> Result<(), ParseError> {
        if *self.peek() == expected {
            self.advance();
            Ok(())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn check_keyword(&self, name: &str) -> bool {
        self.peek().is_keyword(name)
    }

    fn expect_string(&mut self) -> Result<String, ParseError> {
        match self.peek().clone() {
            Token::Str(s) | Token::Ident(s) => {
                self.advance();
                Ok(s)
            }
            _ => Err(self.unexpected("string")),
        }
    }

    pub fn parse(&mut self) -> Result<Document, ParseError> {
        let mut doc = Document::default();

        while *self.peek() != Token::Eof {
            if self.check_keyword("Project") {
                self.advance();
                doc.project = Some(self.parse_project()?);
            } else if self.check_keyword("TablePartial") {
                let line = self.line();
                self.require_partials("TablePartial", line)?;
                self.advance();
                doc.partials.push(self.parse_partial()?);
            } else if self.check_keyword("Table") {
                self.advance();
                doc.tables.push(self.parse_table()?);
            } else if self.check_keyword("Ref") {
                self.advance();
                doc.refs.extend(self.parse_ref_decl()?);
            } else if self.check_keyword("Enum") {
                self.advance();
                doc.enums.push(self.parse_enum()?);
            } else {
                return Err(self.unexpected("Table, TablePartial, Ref, Enum, or Project"));
            }
        }

        Ok(doc)
    }

    fn require_partials(&self, construct: &'static str, line: usize) -> Result<(), ParseError> {
        if self.dialect.supports_partials() {
            Ok(())
        } else {
            Err(ParseError::Unsupported {
                construct,
                dialect: self.dialect,
                line,
            })
        }
    }

    /// `name` or `schema.name`
    fn parse_qualified_name(&mut self) -> Result<(Option<String>, String), ParseError> {
        let first = self.expect_ident()?;
        if *self.peek() == Token::Dot {
            self.advance();
            let name = self.expect_ident()?;
            Ok((Some(first), name))
        } else {
            Ok((None, first))
        }
    }

    fn parse_project(&mut self) -> Result<Project, ParseError> {
        let mut project = Project::default();
        if let Token::Ident(name) = self.peek().clone() {
            self.advance();
            project.name = Some(name);
        }
        self.expect(Token::LBrace, "{")?;

        while *self.peek() != Token::RBrace {
            if self.check_keyword("Note") {
                self.advance();
                project.note = Some(self.parse_note_body()?);
                continue;
            }
            let key = self.expect_ident()?;
            self.expect(Token::Colon, ":")?;
            let value = self.expect_string()?;
            if key.eq_ignore_ascii_case("database_type") {
                project.database_type = Some(value);
            }
        }

        self.expect(Token::RBrace, "}")?;
        Ok(project)
    }

    /// `: 'text'` or `{ 'text' }` following the `Note` keyword.
    fn parse_note_body(&mut self) -> Result<String, ParseError> {
        match self.peek() {
            Token::Colon => {
                self.advance();
                self.expect_string()
            }
            Token::LBrace => {
                self.advance();
                let note = self.expect_string()?;
                self.expect(Token::RBrace, "}")?;
                Ok(note)
            }
            _ => Err(self.unexpected("note")),
        }
    }

    fn parse_table(&mut self) -> Result<Table, ParseError> {
        let line = self.prev_line();
        let (schema, name) = self.parse_qualified_name()?;

        let mut alias = None;
        if self.check_keyword("as") {
            self.advance();
            alias = Some(self.expect_ident()?);
        }

        let mut note = None;
        if *self.peek() == Token::LBracket {
            for (key, value) in self.parse_settings()? {
                if key == "note" {
                    note = value.as_deref().map(unquote);
                }
            }
        }

        self.expect(Token::LBrace, "{")?;
        let body = self.parse_body(true)?;
        self.expect(Token::RBrace, "}")?;

        Ok(Table {
            schema,
            name,
            alias,
            items: body.items,
            indexes: body.indexes,
            note: body.note.or(note),
            line,
        })
    }

    fn parse_partial(&mut self) -> Result<TablePartial, ParseError> {
        let name = self.expect_ident()?;
        if *self.peek() == Token::LBracket {
            self.parse_settings()?;
        }

        self.expect(Token::LBrace, "{")?;
        let body = self.parse_body(false)?;
        self.expect(Token::RBrace, "}")?;

        let columns = body
            .items
            .into_iter()
            .filter_map(|item| match item {
                TableItem::Column(c) => Some(c),
                TableItem::Partial { .. } => None,
            })
            .collect();

        Ok(TablePartial {
            name,
            columns,
            indexes: body.indexes,
            note: body.note,
        })
    }

    /// Shared body of `Table` and `TablePartial`; stops before the closing brace.
    fn parse_body(&mut self, allow_injection: bool) -> Result<Body, ParseError> {
        let mut body = Body::default();

        while *self.peek() != Token::RBrace {
            match self.peek() {
                Token::Eof => return Err(self.unexpected("}")),
                Token::Tilde => {
                    let line = self.line();
                    if !allow_injection {
                        return Err(ParseError::Unexpected {
                            found: Token::Tilde,
                            expected: "column (partials cannot inject partials)",
                            line,
                        });
                    }
                    self.require_partials("partial injection", line)?;
                    self.advance();
                    let name = self.expect_ident()?;
                    body.items.push(TableItem::Partial { name, line });
                }
                _ if self.check_keyword("indexes") && *self.peek_at(1) == Token::LBrace => {
                    self.advance();
                    body.indexes.extend(self.parse_indexes()?);
                }
                _ if self.check_keyword("Note")
                    && matches!(self.peek_at(1), Token::Colon | Token::LBrace) =>
                {
                    self.advance();
                    body.note = Some(self.parse_note_body()?);
                }
                _ => body.items.push(TableItem::Column(self.parse_column()?)),
            }
        }

        Ok(body)
    }

    fn parse_column(&mut self) -> Result<Column, ParseError> {
        let line = self.line();
        let name = self.expect_ident()?;

        let mut typ = None;
        if self.on_same_line() && matches!(self.peek(), Token::Ident(_)) {
            typ = Some(self.parse_type()?);
        }

        let mut settings = Vec::new();
        if self.on_same_line() && *self.peek() == Token::LBracket {
            settings = self.parse_column_settings()?;
        }

        Ok(Column {
            name,
            typ,
            settings,
            line,
        })
    }

    /// `int`, `status.kind`, `varchar(255)`, `decimal(10, 2)`, `int[]`
    fn parse_type(&mut self) -> Result<String, ParseError> {
        let mut typ = self.expect_ident()?;

        if *self.peek() == Token::Dot {
            self.advance();
            typ.push('.');
            typ.push_str(&self.expect_ident()?);
        }

        if *self.peek() == Token::LParen {
            self.advance();
            let mut args = Vec::new();
            loop {
                match self.advance() {
                    Token::RParen => break,
                    Token::Comma => {}
                    Token::Num(n) | Token::Ident(n) | Token::Str(n) => args.push(n),
                    tok => {
                        return Err(ParseError::Unexpected {
                            found: tok,
                            expected: "type argument",
                            line: self.prev_line(),
                        });
                    }
                }
            }
            typ.push_str(&format!("({})", args.join(",")));
        }

        if *self.peek() == Token::LBracket && *self.peek_at(1) == Token::RBracket {
            self.advance();
            self.advance();
            typ.push_str("[]");
        }

        Ok(typ)
    }

    fn parse_column_settings(&mut self) -> Result<Vec<ColumnSetting>, ParseError> {
        self.expect(Token::LBracket, "[")?;
        let mut settings = Vec::new();

        while *self.peek() != Token::RBracket {
            if self.check_keyword("pk") {
                self.advance();
                settings.push(ColumnSetting::Pk);
            } else if self.check_keyword("primary") {
                self.advance();
                if !self.check_keyword("key") {
                    return Err(self.unexpected("key"));
                }
                self.advance();
                settings.push(ColumnSetting::Pk);
            } else if self.check_keyword("not") {
                self.advance();
                if !self.check_keyword("null") {
                    return Err(self.unexpected("null"));
                }
                self.advance();
                settings.push(ColumnSetting::NotNull);
            } else if self.check_keyword("null") {
                self.advance();
                settings.push(ColumnSetting::Null);
            } else if self.check_keyword("unique") {
                self.advance();
                settings.push(ColumnSetting::Unique);
            } else if self.check_keyword("increment") {
                self.advance();
                settings.push(ColumnSetting::Increment);
            } else if self.check_keyword("note") {
                self.advance();
                self.expect(Token::Colon, ":")?;
                settings.push(ColumnSetting::Note(self.expect_string()?));
            } else if self.check_keyword("default") {
                self.advance();
                self.expect(Token::Colon, ":")?;
                settings.push(ColumnSetting::Default(self.parse_setting_value()?));
            } else if self.check_keyword("ref") {
                self.advance();
                self.expect(Token::Colon, ":")?;
                let relation = self.parse_relation()?;
                let target = self.parse_endpoint()?;
                settings.push(ColumnSetting::Ref(InlineRef { relation, target }));
            } else {
                // unknown `key[: value]` settings are tolerated and dropped
                self.expect_ident()?;
                if *self.peek() == Token::Colon {
                    self.advance();
                    self.parse_setting_value()?;
                }
            }

            if *self.peek() == Token::Comma {
                self.advance();
            } else if *self.peek() != Token::RBracket {
                return Err(self.unexpected(", or ]"));
            }
        }

        self.expect(Token::RBracket, "]")?;
        Ok(settings)
    }

    /// Generic `[key: value, flag]` list, lowercased keys.
    fn parse_settings(&mut self) -> Result<Vec<(String, Option<String>)>, ParseError> {
        self.expect(Token::LBracket, "[")?;
        let mut settings = Vec::new();

        while *self.peek() != Token::RBracket {
            let mut key = self.expect_ident()?.to_lowercase();
            // two-word flags such as `primary key`
            while let Token::Ident(next) = self.peek().clone() {
                self.advance();
                key.push(' ');
                key.push_str(&next.to_lowercase());
            }
            let mut value = None;
            if *self.peek() == Token::Colon {
                self.advance();
                value = Some(self.parse_setting_value()?);
            }
            settings.push((key, value));

            if *self.peek() == Token::Comma {
                self.advance();
            } else if *self.peek() != Token::RBracket {
                return Err(self.unexpected(", or ]"));
            }
        }

        self.expect(Token::RBracket, "]")?;
        Ok(settings)
    }

    /// Collect a setting value up to the next `,` or `]`.
    fn parse_setting_value(&mut self) -> Result<String, ParseError> {
        let mut value = String::new();
        loop {
            match self.peek().clone() {
                Token::Comma | Token::RBracket => break,
                Token::Eof => return Err(self.unexpected("setting value")),
                Token::Str(s) => {
                    self.advance();
                    value.push_str(&format!("'{s}'"));
                }
                Token::Expr(e) => {
                    self.advance();
                    value.push_str(&format!("`{e}`"));
                }
                Token::Ident(s) | Token::Num(s) => {
                    self.advance();
                    value.push_str(&s);
                }
                Token::Minus => {
                    self.advance();
                    value.push('-');
                }
                Token::Dot => {
                    self.advance();
                    value.push('.');
                }
                _ => return Err(self.unexpected("setting value")),
            }
        }
        if value.is_empty() {
            return Err(self.unexpected("setting value"));
        }
        Ok(value)
    }

    fn parse_indexes(&mut self) -> Result<Vec<Index>, ParseError> {
        self.expect(Token::LBrace, "{")?;
        let mut indexes = Vec::new();

        while *self.peek() != Token::RBrace {
            let columns = match self.advance() {
                Token::LParen => {
                    let mut cols = Vec::new();
                    loop {
                        match self.advance() {
                            Token::RParen => break,
                            Token::Comma => {}
                            Token::Ident(c) => cols.push(c),
                            Token::Expr(e) => cols.push(format!("`{e}`")),
                            tok => {
                                return Err(ParseError::Unexpected {
                                    found: tok,
                                    expected: "index column",
                                    line: self.prev_line(),
                                });
                            }
                        }
                    }
                    cols
                }
                Token::Ident(c) => vec![c],
                Token::Expr(e) => vec![format!("`{e}`")],
                tok => {
                    return Err(ParseError::Unexpected {
                        found: tok,
                        expected: "index column",
                        line: self.prev_line(),
                    });
                }
            };

            let mut index = Index {
                columns,
                pk: false,
                unique: false,
                name: None,
            };

            if self.on_same_line() && *self.peek() == Token::LBracket {
                for (key, value) in self.parse_settings()? {
                    match key.as_str() {
                        "pk" | "primary key" => index.pk = true,
                        "unique" => index.unique = true,
                        "name" => index.name = value.as_deref().map(unquote),
                        _ => {}
                    }
                }
            }

            indexes.push(index);
        }

        self.expect(Token::RBrace, "}")?;
        Ok(indexes)
    }

    /// `Ref name: a.x > b.y` or `Ref name { ... }`
    fn parse_ref_decl(&mut self) -> Result<Vec<Ref>, ParseError> {
        let mut name = None;
        if let Token::Ident(n) = self.peek().clone() {
            self.advance();
            name = Some(n);
        }

        match self.peek() {
            Token::Colon => {
                self.advance();
                Ok(vec![self.parse_ref_body(name)?])
            }
            Token::LBrace => {
                self.advance();
                let mut refs = Vec::new();
                while *self.peek() != Token::RBrace {
                    if *self.peek() == Token::Eof {
                        return Err(self.unexpected("}"));
                    }
                    refs.push(self.parse_ref_body(name.clone())?);
                }
                self.expect(Token::RBrace, "}")?;
                Ok(refs)
            }
            _ => Err(self.unexpected(": or {")),
        }
    }

    /// One relationship line. Either endpoint may be absent; the compiler
    /// decides what to do with an incomplete ref.
    fn parse_ref_body(&mut self, name: Option<String>) -> Result<Ref, ParseError> {
        let line = self.line();

        let left = if matches!(self.peek(), Token::Ident(_)) {
            Some(self.parse_endpoint()?)
        } else {
            None
        };

        let relation = self.parse_relation()?;

        let right = if self.on_same_line() && matches!(self.peek(), Token::Ident(_)) {
            Some(self.parse_endpoint()?)
        } else {
            None
        };

        let mut on_delete = None;
        let mut on_update = None;
        if self.on_same_line() && *self.peek() == Token::LBracket {
            for (key, value) in self.parse_settings()? {
                match key.as_str() {
                    "delete" => on_delete = value,
                    "update" => on_update = value,
                    _ => {}
                }
            }
        }

        Ok(Ref {
            name,
            left,
            relation,
            right,
            on_delete,
            on_update,
            line,
        })
    }

    fn parse_relation(&mut self) -> Result<Relation, ParseError> {
        let relation = match self.peek() {
            Token::Gt => Relation::ManyToOne,
            Token::Lt => Relation::OneToMany,
            Token::Minus => Relation::OneToOne,
            Token::Diamond => Relation::ManyToMany,
            _ => return Err(self.unexpected("relation (<, >, -, <>)")),
        };
        self.advance();
        Ok(relation)
    }

    /// `table`, `table.field`, `schema.table.field`, `[schema.]table.(f1, f2)`
    fn parse_endpoint(&mut self) -> Result<RefEndpoint, ParseError> {
        let mut segments = vec![self.expect_ident()?];
        let mut composite = None;

        while *self.peek() == Token::Dot {
            self.advance();
            if *self.peek() == Token::LParen {
                self.advance();
                let mut fields = vec![self.expect_ident()?];
                while *self.peek() == Token::Comma {
                    self.advance();
                    fields.push(self.expect_ident()?);
                }
                self.expect(Token::RParen, ")")?;
                composite = Some(fields);
                break;
            }
            segments.push(self.expect_ident()?);
        }

        let (path, fields) = match composite {
            Some(fields) => (segments, fields),
            None if segments.len() == 1 => (segments, Vec::new()),
            None => {
                let field = segments.pop().unwrap_or_default();
                (segments, vec![field])
            }
        };

        let (schema, table) = match path.as_slice() {
            [table] => (None, table.clone()),
            [schema, table] => (Some(schema.clone()), table.clone()),
            _ => {
                return Err(ParseError::Unexpected {
                    found: Token::Dot,
                    expected: "endpoint of the form [schema.]table.field",
                    line: self.prev_line(),
                });
            }
        };

        Ok(RefEndpoint {
            schema,
            table,
            fields,
        })
    }

    fn parse_enum(&mut self) -> Result<Enum, ParseError> {
        let (schema, name) = self.parse_qualified_name()?;
        self.expect(Token::LBrace, "{")?;

        let mut values = Vec::new();
        while *self.peek() != Token::RBrace {
            let value = self.expect_ident()?;
            let mut note = None;
            if self.on_same_line() && *self.peek() == Token::LBracket {
                for (key, v) in self.parse_settings()? {
                    if key == "note" {
                        note = v.as_deref().map(unquote);
                    }
                }
            }
            values.push(EnumValue { name: value, note });
        }

        self.expect(Token::RBrace, "}")?;
        Ok(Enum {
            schema,
            name,
            values,
        })
    }
}

fn unquote(value: &str) -> String {
    value.trim_matches('\'').to_string()
}

#[derive(Default)]
struct Body {
    items: Vec<TableItem>,
    indexes: Vec<Index>,
    note: Option<String>,
}
