//! Indentation-sensitive lexer.
//!
//! Produces a flat token stream with explicit `Newline`/`Indent`/`Dedent`
//! markers. Blank lines and comment-only lines never touch the indent stack,
//! and newlines inside `()[]{}` or after a trailing backslash are swallowed.
//!
//! `match`/`case` are soft keywords: they come out as plain names and the
//! parser promotes them by position.

use std::{fmt, sync::Arc};

use num_bigint::BigInt;
use num_traits::Num;

/// Hard keywords.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kw {
    And,
    Or,
    Not,
    If,
    Elif,
    Else,
    While,
    For,
    In,
    Is,
    Def,
    Return,
    Break,
    Continue,
    Pass,
    Class,
    Import,
    From,
    As,
    Try,
    Except,
    Finally,
    Raise,
    With,
    Assert,
    Del,
    Global,
    Nonlocal,
    Lambda,
    Yield,
    True,
    False,
    None,
    Async,
    Await,
}

impl Kw {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "and" => Self::And,
            "or" => Self::Or,
            "not" => Self::Not,
            "if" => Self::If,
            "elif" => Self::Elif,
            "else" => Self::Else,
            "while" => Self::While,
            "for" => Self::For,
            "in" => Self::In,
            "is" => Self::Is,
            "def" => Self::Def,
            "return" => Self::Return,
            "break" => Self::Break,
            "continue" => Self::Continue,
            "pass" => Self::Pass,
            "class" => Self::Class,
            "import" => Self::Import,
            "from" => Self::From,
            "as" => Self::As,
            "try" => Self::Try,
            "except" => Self::Except,
            "finally" => Self::Finally,
            "raise" => Self::Raise,
            "with" => Self::With,
            "assert" => Self::Assert,
            "del" => Self::Del,
            "global" => Self::Global,
            "nonlocal" => Self::Nonlocal,
            "lambda" => Self::Lambda,
            "yield" => Self::Yield,
            "True" => Self::True,
            "False" => Self::False,
            "None" => Self::None,
            "async" => Self::Async,
            "await" => Self::Await,
            _ => return None,
        })
    }

    pub(crate) fn text(self) -> &'static str {
        match self {
            Self::And => "and",
            Self::Or => "or",
            Self::Not => "not",
            Self::If => "if",
            Self::Elif => "elif",
            Self::Else => "else",
            Self::While => "while",
            Self::For => "for",
            Self::In => "in",
            Self::Is => "is",
            Self::Def => "def",
            Self::Return => "return",
            Self::Break => "break",
            Self::Continue => "continue",
            Self::Pass => "pass",
            Self::Class => "class",
            Self::Import => "import",
            Self::From => "from",
            Self::As => "as",
            Self::Try => "try",
            Self::Except => "except",
            Self::Finally => "finally",
            Self::Raise => "raise",
            Self::With => "with",
            Self::Assert => "assert",
            Self::Del => "del",
            Self::Global => "global",
            Self::Nonlocal => "nonlocal",
            Self::Lambda => "lambda",
            Self::Yield => "yield",
            Self::True => "True",
            Self::False => "False",
            Self::None => "None",
            Self::Async => "async",
            Self::Await => "await",
        }
    }
}

/// Operators and punctuation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    At,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Shl,
    Shr,
    Lt,
    Gt,
    Le,
    Ge,
    EqEq,
    Ne,
    Assign,
    Walrus,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    DoubleSlashEq,
    PercentEq,
    DoubleStarEq,
    AmpEq,
    PipeEq,
    CaretEq,
    ShlEq,
    ShrEq,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Semi,
    Dot,
    Arrow,
}

impl Op {
    pub(crate) fn text(self) -> &'static str {
        match self {
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::DoubleStar => "**",
            Self::Slash => "/",
            Self::DoubleSlash => "//",
            Self::Percent => "%",
            Self::At => "@",
            Self::Amp => "&",
            Self::Pipe => "|",
            Self::Caret => "^",
            Self::Tilde => "~",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::Lt => "<",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Ge => ">=",
            Self::EqEq => "==",
            Self::Ne => "!=",
            Self::Assign => "=",
            Self::Walrus => ":=",
            Self::PlusEq => "+=",
            Self::MinusEq => "-=",
            Self::StarEq => "*=",
            Self::SlashEq => "/=",
            Self::DoubleSlashEq => "//=",
            Self::PercentEq => "%=",
            Self::DoubleStarEq => "**=",
            Self::AmpEq => "&=",
            Self::PipeEq => "|=",
            Self::CaretEq => "^=",
            Self::ShlEq => "<<=",
            Self::ShrEq => ">>=",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::Comma => ",",
            Self::Colon => ":",
            Self::Semi => ";",
            Self::Dot => ".",
            Self::Arrow => "->",
        }
    }
}

/// A chunk of a lexed f-string.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum FsTok {
    /// Literal text (escape sequences already resolved, `{{`/`}}` collapsed).
    Literal(String),
    /// The raw source between `{` and the matching `}` (conversion and format
    /// spec still attached; the parser splits those off).
    Expr { source: String, line: u32 },
}

/// A single token.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Tok {
    Name(Arc<str>),
    Keyword(Kw),
    Int(BigInt),
    Float(f64),
    Str(String),
    /// A bytes literal; recognised here, rejected by the parser.
    Bytes,
    FString(Vec<FsTok>),
    Op(Op),
    Newline,
    Indent,
    Dedent,
    Eof,
}

impl Tok {
    /// Source-language rendering used in parser error messages. Never leaks
    /// internal token names.
    pub(crate) fn describe(&self) -> String {
        match self {
            Self::Name(n) => format!("'{n}'"),
            Self::Keyword(kw) => format!("'{}'", kw.text()),
            Self::Int(_) | Self::Float(_) => "a number".to_owned(),
            Self::Str(_) | Self::FString(_) => "a string".to_owned(),
            Self::Bytes => "a bytes literal".to_owned(),
            Self::Op(op) => format!("'{}'", op.text()),
            Self::Newline => "end of line".to_owned(),
            Self::Indent => "an indented block".to_owned(),
            Self::Dedent => "end of block".to_owned(),
            Self::Eof => "end of input".to_owned(),
        }
    }
}

/// A token plus the line it started on.
#[derive(Debug, Clone)]
pub(crate) struct Token {
    pub tok: Tok,
    pub line: u32,
}

/// A lexical error with the offending line.
#[derive(Debug, Clone)]
pub(crate) struct LexError {
    pub message: String,
    pub line: u32,
    /// True for indentation-structure errors (surfaced as `IndentationError`).
    pub indentation: bool,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (line {})", self.message, self.line)
    }
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: u32,
    /// Indent column stack; always starts with 0.
    indents: Vec<usize>,
    /// Open `(`/`[`/`{` depth; newlines inside are insignificant.
    bracket_depth: usize,
    tokens: Vec<Token>,
    /// Set once a non-blank token has been emitted for the current logical line.
    line_has_tokens: bool,
}

/// Lexes a full source string.
pub(crate) fn lex(source: &str) -> Result<Vec<Token>, LexError> {
    let mut lexer = Lexer {
        chars: source.chars().collect(),
        pos: 0,
        line: 1,
        indents: vec![0],
        bracket_depth: 0,
        tokens: Vec::new(),
        line_has_tokens: false,
    };
    lexer.run()?;
    Ok(lexer.tokens)
}

impl Lexer {
    fn error(&self, message: impl Into<String>) -> LexError {
        LexError {
            message: message.into(),
            line: self.line,
            indentation: false,
        }
    }

    fn indent_error(&self, message: impl Into<String>) -> LexError {
        LexError {
            message: message.into(),
            line: self.line,
            indentation: true,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    fn push(&mut self, tok: Tok) {
        self.line_has_tokens = true;
        self.tokens.push(Token { tok, line: self.line });
    }

    fn run(&mut self) -> Result<(), LexError> {
        self.handle_line_start()?;
        while self.pos < self.chars.len() {
            let c = match self.peek() {
                Some(c) => c,
                None => break,
            };
            match c {
                ' ' | '\t' => {
                    self.pos += 1;
                }
                '\r' => {
                    self.pos += 1;
                }
                '#' => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                }
                '\n' => {
                    self.bump();
                    if self.bracket_depth == 0 && self.line_has_tokens {
                        self.tokens.push(Token {
                            tok: Tok::Newline,
                            line: self.line.saturating_sub(1),
                        });
                        self.line_has_tokens = false;
                    }
                    if self.bracket_depth == 0 {
                        self.handle_line_start()?;
                    }
                }
                '\\' => {
                    if self.peek_at(1) == Some('\n') || (self.peek_at(1) == Some('\r') && self.peek_at(2) == Some('\n'))
                    {
                        self.bump();
                        while self.peek() == Some('\r') {
                            self.bump();
                        }
                        self.bump();
                    } else {
                        return Err(self.error("unexpected character '\\'"));
                    }
                }
                '"' | '\'' => self.lex_string(StringPrefix::default())?,
                c if c.is_ascii_digit() => self.lex_number()?,
                '.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => self.lex_number()?,
                c if c == '_' || c.is_alphabetic() => self.lex_name_or_prefixed_string()?,
                _ => self.lex_operator()?,
            }
        }
        // close out the final line
        if self.line_has_tokens {
            self.tokens.push(Token {
                tok: Tok::Newline,
                line: self.line,
            });
        }
        if self.bracket_depth > 0 {
            return Err(self.error("unexpected end of input inside brackets"));
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.tokens.push(Token {
                tok: Tok::Dedent,
                line: self.line,
            });
        }
        self.tokens.push(Token {
            tok: Tok::Eof,
            line: self.line,
        });
        Ok(())
    }

    /// Measures indentation at the start of a logical line and emits
    /// INDENT/DEDENT tokens. Blank and comment-only lines are skipped whole.
    fn handle_line_start(&mut self) -> Result<(), LexError> {
        loop {
            let start = self.pos;
            let mut column = 0usize;
            let mut saw_space = false;
            let mut saw_tab_after_space = false;
            while let Some(c) = self.peek() {
                match c {
                    ' ' => {
                        saw_space = true;
                        column += 1;
                        self.pos += 1;
                    }
                    '\t' => {
                        if saw_space {
                            saw_tab_after_space = true;
                        }
                        column += 8 - (column % 8);
                        self.pos += 1;
                    }
                    _ => break,
                }
            }
            match self.peek() {
                // blank line or comment-only line: consume and retry
                Some('\n') => {
                    self.bump();
                    continue;
                }
                Some('\r') => {
                    self.pos += 1;
                    continue;
                }
                Some('#') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.pos += 1;
                    }
                    continue;
                }
                None => return Ok(()),
                Some(_) => {}
            }
            if saw_tab_after_space {
                return Err(self.indent_error("inconsistent use of tabs and spaces in indentation"));
            }
            let current = *self.indents.last().unwrap_or(&0);
            if column > current {
                self.indents.push(column);
                self.tokens.push(Token {
                    tok: Tok::Indent,
                    line: self.line,
                });
            } else if column < current {
                while self.indents.len() > 1 && *self.indents.last().unwrap_or(&0) > column {
                    self.indents.pop();
                    self.tokens.push(Token {
                        tok: Tok::Dedent,
                        line: self.line,
                    });
                }
                if *self.indents.last().unwrap_or(&0) != column {
                    return Err(self.indent_error("unindent does not match any outer indentation level"));
                }
            }
            let _ = start;
            return Ok(());
        }
    }

    fn lex_name_or_prefixed_string(&mut self) -> Result<(), LexError> {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c == '_' || c.is_alphanumeric() {
                self.pos += 1;
            } else {
                break;
            }
        }
        let name: String = self.chars[start..self.pos].iter().collect();
        // string prefixes: any combination of r/b/f (case-insensitive), max 2
        if name.len() <= 2 && matches!(self.peek(), Some('"' | '\'')) {
            let mut prefix = StringPrefix::default();
            let mut valid = true;
            for c in name.chars() {
                match c.to_ascii_lowercase() {
                    'r' => prefix.raw = true,
                    'f' => prefix.fstring = true,
                    'b' => prefix.bytes = true,
                    _ => valid = false,
                }
            }
            if valid {
                return self.lex_string(prefix);
            }
        }
        match Kw::from_name(&name) {
            Some(kw) => self.push(Tok::Keyword(kw)),
            None => self.push(Tok::Name(Arc::from(name.as_str()))),
        }
        Ok(())
    }

    fn lex_number(&mut self) -> Result<(), LexError> {
        let start = self.pos;
        let line = self.line;
        let mut is_float = false;

        if self.peek() == Some('0') && matches!(self.peek_at(1), Some('x' | 'X' | 'o' | 'O' | 'b' | 'B')) {
            let radix_char = self.peek_at(1).unwrap_or('x');
            self.pos += 2;
            let radix = match radix_char.to_ascii_lowercase() {
                'x' => 16,
                'o' => 8,
                _ => 2,
            };
            let digits_start = self.pos;
            while let Some(c) = self.peek() {
                if c == '_' || c.is_ascii_alphanumeric() {
                    self.pos += 1;
                } else {
                    break;
                }
            }
            let digits: String = self.chars[digits_start..self.pos].iter().collect();
            let cleaned = strip_underscores(&digits).ok_or_else(|| self.error("invalid numeric literal"))?;
            if cleaned.is_empty() {
                return Err(self.error("invalid numeric literal"));
            }
            let value = BigInt::from_str_radix(&cleaned, radix).map_err(|_| {
                let base_name = match radix {
                    16 => "hexadecimal",
                    8 => "octal",
                    _ => "binary",
                };
                self.error(format!("invalid digit in {base_name} literal"))
            })?;
            if matches!(self.peek(), Some('j' | 'J')) {
                return Err(self.error("complex numbers are not supported"));
            }
            self.tokens.push(Token {
                tok: Tok::Int(value),
                line,
            });
            self.line_has_tokens = true;
            return Ok(());
        }

        while let Some(c) = self.peek() {
            if c.is_ascii_digit() || c == '_' {
                self.pos += 1;
            } else {
                break;
            }
        }
        if self.peek() == Some('.') && self.peek_at(1) != Some('.') {
            is_float = true;
            self.pos += 1;
            while let Some(c) = self.peek() {
                if c.is_ascii_digit() || c == '_' {
                    self.pos += 1;
                } else {
                    break;
                }
            }
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let mut offset = 1;
            if matches!(self.peek_at(1), Some('+' | '-')) {
                offset = 2;
            }
            if self.peek_at(offset).is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                self.pos += offset;
                while let Some(c) = self.peek() {
                    if c.is_ascii_digit() || c == '_' {
                        self.pos += 1;
                    } else {
                        break;
                    }
                }
            }
        }
        if matches!(self.peek(), Some('j' | 'J')) {
            return Err(self.error("complex numbers are not supported"));
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        let cleaned = strip_underscores(&text).ok_or_else(|| self.error("invalid decimal literal"))?;
        let tok = if is_float {
            let value: f64 = cleaned.parse().map_err(|_| self.error("invalid decimal literal"))?;
            Tok::Float(value)
        } else {
            let value = cleaned
                .parse::<BigInt>()
                .map_err(|_| self.error("invalid decimal literal"))?;
            Tok::Int(value)
        };
        self.tokens.push(Token { tok, line });
        self.line_has_tokens = true;
        Ok(())
    }

    fn lex_string(&mut self, prefix: StringPrefix) -> Result<(), LexError> {
        let line = self.line;
        let quote = self.bump().ok_or_else(|| self.error("unterminated string literal"))?;
        let triple = self.peek() == Some(quote) && self.peek_at(1) == Some(quote);
        if triple {
            self.pos += 2;
        }
        let mut value = String::new();
        loop {
            let Some(c) = self.peek() else {
                let message = if triple {
                    "unterminated triple-quoted string literal"
                } else {
                    "unterminated string literal"
                };
                return Err(LexError {
                    message: message.to_owned(),
                    line,
                    indentation: false,
                });
            };
            if !triple && c == '\n' {
                return Err(LexError {
                    message: "unterminated string literal".to_owned(),
                    line,
                    indentation: false,
                });
            }
            if c == quote {
                if triple {
                    if self.peek_at(1) == Some(quote) && self.peek_at(2) == Some(quote) {
                        self.pos += 3;
                        break;
                    }
                    self.bump();
                    value.push(c);
                    continue;
                }
                self.bump();
                break;
            }
            if c == '\\' && !prefix.raw {
                self.bump();
                let Some(esc) = self.bump() else {
                    return Err(LexError {
                        message: "unterminated string literal".to_owned(),
                        line,
                        indentation: false,
                    });
                };
                match esc {
                    'n' => value.push('\n'),
                    't' => value.push('\t'),
                    'r' => value.push('\r'),
                    '0' => value.push('\0'),
                    '\\' => value.push('\\'),
                    '\'' => value.push('\''),
                    '"' => value.push('"'),
                    '\n' => {} // line continuation inside a string
                    'x' => {
                        let hi = self.bump();
                        let lo = self.bump();
                        let (Some(hi), Some(lo)) = (hi, lo) else {
                            return Err(self.error("invalid \\x escape"));
                        };
                        let code = u32::from_str_radix(&format!("{hi}{lo}"), 16)
                            .map_err(|_| self.error("invalid \\x escape"))?;
                        value.push(char::from_u32(code).unwrap_or('\u{fffd}'));
                    }
                    'u' => {
                        let mut code = String::new();
                        for _ in 0..4 {
                            match self.bump() {
                                Some(c) => code.push(c),
                                None => return Err(self.error("invalid \\u escape")),
                            }
                        }
                        let code = u32::from_str_radix(&code, 16).map_err(|_| self.error("invalid \\u escape"))?;
                        value.push(char::from_u32(code).unwrap_or('\u{fffd}'));
                    }
                    other => {
                        // unknown escapes keep the backslash, matching source semantics
                        value.push('\\');
                        value.push(other);
                    }
                }
                continue;
            }
            if c == '\\' && prefix.raw {
                // raw strings keep the backslash but it still guards a quote
                self.bump();
                value.push('\\');
                if let Some(next) = self.peek() {
                    if next == quote {
                        self.bump();
                        value.push(next);
                    }
                }
                continue;
            }
            self.bump();
            value.push(c);
        }

        if prefix.bytes {
            self.tokens.push(Token { tok: Tok::Bytes, line });
            self.line_has_tokens = true;
            return Ok(());
        }
        if prefix.fstring {
            let parts = self.split_fstring(&value, line)?;
            self.tokens.push(Token {
                tok: Tok::FString(parts),
                line,
            });
            self.line_has_tokens = true;
            return Ok(());
        }
        self.tokens.push(Token {
            tok: Tok::Str(value),
            line,
        });
        self.line_has_tokens = true;
        Ok(())
    }

    /// Splits f-string content into literal chunks and `{...}` interpolations.
    ///
    /// `{{`/`}}` collapse into literal braces; interpolation sources are kept
    /// raw (conversion flag and format spec included) for the parser.
    fn split_fstring(&self, content: &str, line: u32) -> Result<Vec<FsTok>, LexError> {
        let chars: Vec<char> = content.chars().collect();
        let mut parts = Vec::new();
        let mut literal = String::new();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            if c == '{' {
                if chars.get(i + 1) == Some(&'{') {
                    literal.push('{');
                    i += 2;
                    continue;
                }
                if !literal.is_empty() {
                    parts.push(FsTok::Literal(std::mem::take(&mut literal)));
                }
                let mut depth = 1usize;
                let mut quote: Option<char> = None;
                let start = i + 1;
                let mut j = start;
                while j < chars.len() {
                    let cj = chars[j];
                    if let Some(q) = quote {
                        if cj == q {
                            quote = None;
                        }
                    } else {
                        match cj {
                            '\'' | '"' => quote = Some(cj),
                            '{' | '(' | '[' => depth += 1,
                            '}' | ')' | ']' => {
                                depth -= 1;
                                if depth == 0 && cj == '}' {
                                    break;
                                }
                            }
                            _ => {}
                        }
                    }
                    j += 1;
                }
                if j >= chars.len() || depth != 0 {
                    return Err(LexError {
                        message: "expected '}' in f-string expression".to_owned(),
                        line,
                        indentation: false,
                    });
                }
                let source: String = chars[start..j].iter().collect();
                if source.trim().is_empty() {
                    return Err(LexError {
                        message: "empty expression in f-string".to_owned(),
                        line,
                        indentation: false,
                    });
                }
                parts.push(FsTok::Expr { source, line });
                i = j + 1;
                continue;
            }
            if c == '}' {
                if chars.get(i + 1) == Some(&'}') {
                    literal.push('}');
                    i += 2;
                    continue;
                }
                return Err(LexError {
                    message: "single '}' is not allowed in f-string".to_owned(),
                    line,
                    indentation: false,
                });
            }
            literal.push(c);
            i += 1;
        }
        if !literal.is_empty() {
            parts.push(FsTok::Literal(literal));
        }
        Ok(parts)
    }

    fn lex_operator(&mut self) -> Result<(), LexError> {
        let c = self.bump().ok_or_else(|| self.error("unexpected end of input"))?;
        let next = self.peek();
        let next2 = self.peek_at(1);
        let op = match c {
            '+' => self.maybe_eq(Op::Plus, Op::PlusEq),
            '-' => {
                if next == Some('>') {
                    self.pos += 1;
                    Op::Arrow
                } else {
                    self.maybe_eq(Op::Minus, Op::MinusEq)
                }
            }
            '*' => {
                if next == Some('*') {
                    self.pos += 1;
                    self.maybe_eq(Op::DoubleStar, Op::DoubleStarEq)
                } else {
                    self.maybe_eq(Op::Star, Op::StarEq)
                }
            }
            '/' => {
                if next == Some('/') {
                    self.pos += 1;
                    self.maybe_eq(Op::DoubleSlash, Op::DoubleSlashEq)
                } else {
                    self.maybe_eq(Op::Slash, Op::SlashEq)
                }
            }
            '%' => self.maybe_eq(Op::Percent, Op::PercentEq),
            '@' => Op::At,
            '&' => self.maybe_eq(Op::Amp, Op::AmpEq),
            '|' => self.maybe_eq(Op::Pipe, Op::PipeEq),
            '^' => self.maybe_eq(Op::Caret, Op::CaretEq),
            '~' => Op::Tilde,
            '<' => {
                if next == Some('<') {
                    self.pos += 1;
                    self.maybe_eq(Op::Shl, Op::ShlEq)
                } else {
                    self.maybe_eq(Op::Lt, Op::Le)
                }
            }
            '>' => {
                if next == Some('>') {
                    self.pos += 1;
                    self.maybe_eq(Op::Shr, Op::ShrEq)
                } else {
                    self.maybe_eq(Op::Gt, Op::Ge)
                }
            }
            '=' => self.maybe_eq(Op::Assign, Op::EqEq),
            '!' => {
                if next == Some('=') {
                    self.pos += 1;
                    Op::Ne
                } else {
                    return Err(self.error("unexpected character '!'"));
                }
            }
            ':' => {
                if next == Some('=') {
                    self.pos += 1;
                    Op::Walrus
                } else {
                    Op::Colon
                }
            }
            '(' => {
                self.bracket_depth += 1;
                Op::LParen
            }
            ')' => {
                self.close_bracket()?;
                Op::RParen
            }
            '[' => {
                self.bracket_depth += 1;
                Op::LBracket
            }
            ']' => {
                self.close_bracket()?;
                Op::RBracket
            }
            '{' => {
                self.bracket_depth += 1;
                Op::LBrace
            }
            '}' => {
                self.close_bracket()?;
                Op::RBrace
            }
            ',' => Op::Comma,
            ';' => Op::Semi,
            '.' => Op::Dot,
            other => {
                let _ = next2;
                return Err(self.error(format!("unexpected character '{other}'")));
            }
        };
        self.push(Tok::Op(op));
        Ok(())
    }

    fn maybe_eq(&mut self, plain: Op, with_eq: Op) -> Op {
        if self.peek() == Some('=') {
            self.pos += 1;
            with_eq
        } else {
            plain
        }
    }

    fn close_bracket(&mut self) -> Result<(), LexError> {
        if self.bracket_depth == 0 {
            return Err(self.error("unmatched closing bracket"));
        }
        self.bracket_depth -= 1;
        Ok(())
    }
}

/// String literal prefix flags.
#[derive(Debug, Default, Clone, Copy)]
struct StringPrefix {
    raw: bool,
    fstring: bool,
    bytes: bool,
}

/// Removes underscore separators, rejecting doubled/leading/trailing ones.
fn strip_underscores(digits: &str) -> Option<String> {
    if digits.starts_with('_') || digits.ends_with('_') || digits.contains("__") {
        return None;
    }
    Some(digits.replace('_', ""))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Tok> {
        lex(source).unwrap().into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn simple_assignment() {
        let toks = kinds("x = 1\n");
        assert_eq!(
            toks,
            vec![
                Tok::Name(Arc::from("x")),
                Tok::Op(Op::Assign),
                Tok::Int(BigInt::from(1)),
                Tok::Newline,
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn indentation_blocks() {
        let toks = kinds("if x:\n    y = 1\nz = 2\n");
        assert!(toks.contains(&Tok::Indent));
        assert!(toks.contains(&Tok::Dedent));
    }

    #[test]
    fn blank_lines_do_not_dedent() {
        let toks = kinds("if x:\n    a = 1\n\n    # comment\n    b = 2\n");
        let dedents = toks.iter().filter(|t| matches!(t, Tok::Dedent)).count();
        assert_eq!(dedents, 1);
    }

    #[test]
    fn nested_dedents_pop_per_level() {
        let toks = kinds("if a:\n    if b:\n        x = 1\ny = 2\n");
        let dedents = toks.iter().filter(|t| matches!(t, Tok::Dedent)).count();
        assert_eq!(dedents, 2);
    }

    #[test]
    fn numeric_literals() {
        assert_eq!(kinds("0x_ff\n")[0], Tok::Int(BigInt::from(255)));
        assert_eq!(kinds("0b1010\n")[0], Tok::Int(BigInt::from(10)));
        assert_eq!(kinds("0o777\n")[0], Tok::Int(BigInt::from(511)));
        assert_eq!(kinds("1_000_000\n")[0], Tok::Int(BigInt::from(1_000_000)));
        assert_eq!(kinds("1.5e3\n")[0], Tok::Float(1500.0));
    }

    #[test]
    fn complex_literal_rejected() {
        let err = lex("x = 3j\n").unwrap_err();
        assert!(err.message.contains("complex numbers are not supported"));
    }

    #[test]
    fn unterminated_string() {
        let err = lex("x = 'abc\n").unwrap_err();
        assert!(err.message.contains("unterminated string"));
        let err = lex("x = '''abc\n").unwrap_err();
        assert!(err.message.contains("triple"));
    }

    #[test]
    fn fstring_parts() {
        let toks = kinds("f\"a{x}b{{c}}\"\n");
        let Tok::FString(parts) = &toks[0] else {
            panic!("expected f-string, got {:?}", toks[0]);
        };
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], FsTok::Literal("a".to_owned()));
        assert!(matches!(&parts[1], FsTok::Expr { source, .. } if source == "x"));
        assert_eq!(parts[2], FsTok::Literal("b{c}".to_owned()));
    }

    #[test]
    fn implicit_continuation_in_brackets() {
        let toks = kinds("x = [1,\n     2]\n");
        let newlines = toks.iter().filter(|t| matches!(t, Tok::Newline)).count();
        assert_eq!(newlines, 1);
        assert!(!toks.contains(&Tok::Indent));
    }

    #[test]
    fn backslash_continuation() {
        let toks = kinds("x = 1 + \\\n    2\n");
        let newlines = toks.iter().filter(|t| matches!(t, Tok::Newline)).count();
        assert_eq!(newlines, 1);
    }

    #[test]
    fn soft_keywords_stay_names() {
        let toks = kinds("match = 5\n");
        assert_eq!(toks[0], Tok::Name(Arc::from("match")));
    }

    #[test]
    fn raw_strings_keep_backslashes() {
        let toks = kinds("r'a\\nb'\n");
        assert_eq!(toks[0], Tok::Str("a\\nb".to_owned()));
    }

    #[test]
    fn tabs_after_spaces_rejected() {
        let err = lex("if x:\n  \ty = 1\n").unwrap_err();
        assert!(err.indentation);
    }
}
