use std::iter::Peekable;
use std::str::Chars;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Bare or double-quoted identifier.
    Ident(String),
    /// Single- or triple-quoted string.
    Str(String),
    /// Backtick expression, e.g. `now()`.
    Expr(String),
    Num(String),

    LBrace,   // {
    RBrace,   // }
    LParen,   // (
    RParen,   // )
    LBracket, // [
    RBracket, // ]
    Comma,    // ,
    Colon,    // :
    Dot,      // .
    Tilde,    // ~
    Lt,       // <
    Gt,       // >
    Minus,    // -
    Diamond,  // <>

    Eof,
}

impl Token {
    /// Case-insensitive keyword check against an identifier token.
    pub fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, Token::Ident(s) if s.eq_ignore_ascii_case(keyword))
    }
}

/// A token together with the 1-based line it starts on.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub line: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum LexError {
    #[error("line {line}: unexpected character: {ch}")]
    UnexpectedChar { ch: char, line: usize },
    #[error("line {line}: unterminated string")]
    UnterminatedString { line: usize },
    #[error("line {line}: unterminated comment")]
    UnterminatedComment { line: usize },
}

pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
            line: 1,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    /// Look one character past the current peek.
    fn peek_second(&self) -> Option<char> {
        let mut ahead = self.chars.clone();
        ahead.next();
        ahead.next()
    }

    fn skip_whitespace_and_comments(&mut self) -> Result<(), LexError> {
        loop {
            let next = self.chars.peek().copied();
            match next {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') if self.peek_second() == Some('/') => {
                    while let Some(&c) = self.chars.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                Some('/') if self.peek_second() == Some('*') => {
                    let start = self.line;
                    self.bump();
                    self.bump();
                    loop {
                        match self.bump() {
                            Some('*') if self.chars.peek() == Some(&'/') => {
                                self.bump();
                                break;
                            }
                            Some(_) => {}
                            None => return Err(LexError::UnterminatedComment { line: start }),
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    fn read_ident(&mut self, first: char) -> String {
        let mut s = String::from(first);
        while let Some(&c) = self.chars.peek() {
            if c.is_alphanumeric() || c == '_' {
                s.push(c);
                self.bump();
            } else {
                break;
            }
        }
        s
    }

    fn read_delimited(&mut self, close: char, start: usize) -> Result<String, LexError> {
        let mut s = String::new();
        loop {
            match self.bump() {
                Some(c) if c == close => return Ok(s),
                Some('\\') => {
                    if let Some(c) = self.bump() {
                        match c {
                            'n' => s.push('\n'),
                            't' => s.push('\t'),
                            _ => s.push(c),
                        }
                    }
                }
                Some(c) => s.push(c),
                None => return Err(LexError::UnterminatedString { line: start }),
            }
        }
    }

    fn read_single_quoted(&mut self, start: usize) -> Result<String, LexError> {
        // '''multi-line''' strings
        if self.chars.peek() == Some(&'\'') && self.peek_second() == Some('\'') {
            self.bump();
            self.bump();
            let mut s = String::new();
            loop {
                match self.bump() {
                    Some('\'') if self.chars.peek() == Some(&'\'') && self.peek_second() == Some('\'') => {
                        self.bump();
                        self.bump();
                        return Ok(s.trim().to_string());
                    }
                    Some(c) => s.push(c),
                    None => return Err(LexError::UnterminatedString { line: start }),
                }
            }
        }
        self.read_delimited('\'', start)
    }

    fn read_number(&mut self, first: char) -> String {
        let mut s = String::from(first);
        while let Some(&c) = self.chars.peek() {
            if c.is_ascii_digit() {
                s.push(c);
                self.bump();
            } else if c == '.' && self.peek_second().is_some_and(|d| d.is_ascii_digit()) {
                s.push(c);
                self.bump();
            } else {
                break;
            }
        }
        s
    }

    pub fn next_token(&mut self) -> Result<Spanned, LexError> {
        self.skip_whitespace_and_comments()?;

        let line = self.line;
        let c = match self.bump() {
            Some(c) => c,
            None => {
                return Ok(Spanned {
                    token: Token::Eof,
                    line,
                });
            }
        };

        let token = match c {
            '{' => Token::LBrace,
            '}' => Token::RBrace,
            '(' => Token::LParen,
            ')' => Token::RParen,
            '[' => Token::LBracket,
            ']' => Token::RBracket,
            ',' => Token::Comma,
            ':' => Token::Colon,
            '.' => Token::Dot,
            '~' => Token::Tilde,
            // color literals such as `#3498DB` in table settings
            '#' => match self.chars.peek().copied() {
                Some(n) if n.is_alphanumeric() => {
                    self.bump();
                    Token::Ident(format!("#{}", self.read_ident(n)))
                }
                _ => return Err(LexError::UnexpectedChar { ch: c, line }),
            },
            '>' => Token::Gt,
            '-' => Token::Minus,
            '<' => {
                if self.chars.peek() == Some(&'>') {
                    self.bump();
                    Token::Diamond
                } else {
                    Token::Lt
                }
            }
            '"' => Token::Ident(self.read_delimited('"', line)?),
            '\'' => Token::Str(self.read_single_quoted(line)?),
            '`' => Token::Expr(self.read_delimited('`', line)?),
            c if c.is_ascii_digit() => {
                // identifiers such as `2fa_enabled` start with a digit
                let num = self.read_number(c);
                match self.chars.peek().copied() {
                    Some(n) if n.is_alphabetic() || n == '_' => {
                        self.bump();
                        let rest = self.read_ident(n);
                        Token::Ident(format!("{num}{rest}"))
                    }
                    _ => Token::Num(num),
                }
            }
            c if c.is_alphabetic() || c == '_' => Token::Ident(self.read_ident(c)),
            _ => return Err(LexError::UnexpectedChar { ch: c, line }),
        };

        Ok(Spanned { token, line })
    }

    pub fn tokenize(mut self) -> Result<Vec<Spanned>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let done = tok.token == Token::Eof;
            tokens.push(tok);
            if done {
                break;
            }
        }
        Ok(tokens)
    }
}
