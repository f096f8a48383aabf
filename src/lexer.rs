//! A module implementing lexical analysis (tokenization) of an input line.
//!
//! The lexer knows only whitespace, the pipe operator and the three
//! redirection operators. Every other character is part of a word; there is
//! no quoting or escaping.

/// The kind of a lexical token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// A run of non-separator, non-operator characters.
    Word,
    /// The pipe operator, `|`.
    Pipe,
    /// Input redirection, `<`.
    RedirectIn,
    /// Output redirection that truncates, `>`.
    RedirectOut,
    /// Output redirection that appends, `>>`.
    RedirectAppend,
}

/// Represents a token resulting from lexical analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
}

impl Token {
    pub fn word(text: impl Into<String>) -> Self {
        Token {
            kind: TokenKind::Word,
            text: text.into(),
        }
    }

    /// Build an operator token with its canonical spelling.
    pub fn operator(kind: TokenKind) -> Self {
        let text = match kind {
            TokenKind::Pipe => "|",
            TokenKind::RedirectIn => "<",
            TokenKind::RedirectOut => ">",
            TokenKind::RedirectAppend => ">>",
            TokenKind::Word => "",
        };
        Token {
            kind,
            text: text.to_string(),
        }
    }
}

struct Lexer {
    input: Vec<char>,
    pos: usize,
    buffer: String,
    out: Vec<Token>,
}

impl Lexer {
    fn new(line: &str) -> Self {
        Lexer {
            input: line.chars().collect(),
            pos: 0,
            buffer: String::new(),
            out: Vec::new(),
        }
    }

    fn make_tokens(mut self) -> Vec<Token> {
        while let Some(ch) = self.read_char() {
            match ch {
                ' ' | '\t' => self.finish_word(),
                '|' => self.push_operator(TokenKind::Pipe),
                '<' => self.push_operator(TokenKind::RedirectIn),
                '>' => {
                    if self.peek_char() == Some('>') {
                        self.read_char();
                        self.push_operator(TokenKind::RedirectAppend);
                    } else {
                        self.push_operator(TokenKind::RedirectOut);
                    }
                }
                c => self.buffer.push(c),
            }
        }
        self.finish_word();
        self.out
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos).copied();
        if ch.is_some() {
            self.pos += 1;
        }
        ch
    }

    fn peek_char(&self) -> Option<char> {
        self.input.get(self.pos).copied()
    }

    /// Emit the accumulated word, if any.
    fn finish_word(&mut self) {
        if !self.buffer.is_empty() {
            self.out.push(Token::word(std::mem::take(&mut self.buffer)));
        }
    }

    fn push_operator(&mut self, kind: TokenKind) {
        self.finish_word();
        self.out.push(Token::operator(kind));
    }
}

/// Split `line` into tokens.
///
/// Never fails: any input, including the empty string, yields a possibly
/// empty token list.
pub fn tokenize(line: &str) -> Vec<Token> {
    let tokens = Lexer::new(line).make_tokens();
    tracing::trace!(?tokens, "tokenized line");
    tokens
}
