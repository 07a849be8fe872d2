//! Tokeniser for the ST dialect.

use shadowforge_core::SourcePos;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("lex error at {pos}: unexpected character {got:?}")]
pub struct LexError {
    pub pos: SourcePos,
    pub got: char,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Ident(String),
    Keyword(Keyword),
    Number(f64),
    /// A time literal, already converted to milliseconds.
    TimeMs(i64),
    Str(String),
    // punctuation / operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eq,
    ColonEq,
    Lt,
    Gt,
    Le,
    Ge,
    Ne,
    NeAlt,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Semi,
    Comma,
    Dot,
    DotDot,
    Colon,
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Program,
    EndProgram,
    Var,
    EndVar,
    If,
    Then,
    Elsif,
    Else,
    EndIf,
    While,
    Do,
    EndWhile,
    For,
    To,
    By,
    EndFor,
    Array,
    Of,
    True,
    False,
    Or,
    And,
    Not,
    Mod,
    Div,
}

const KEYWORDS: &[(&str, Keyword)] = &[
    ("PROGRAM", Keyword::Program),
    ("END_PROGRAM", Keyword::EndProgram),
    ("VAR", Keyword::Var),
    ("END_VAR", Keyword::EndVar),
    ("IF", Keyword::If),
    ("THEN", Keyword::Then),
    ("ELSIF", Keyword::Elsif),
    ("ELSE", Keyword::Else),
    ("END_IF", Keyword::EndIf),
    ("WHILE", Keyword::While),
    ("DO", Keyword::Do),
    ("END_WHILE", Keyword::EndWhile),
    ("FOR", Keyword::For),
    ("TO", Keyword::To),
    ("BY", Keyword::By),
    ("END_FOR", Keyword::EndFor),
    ("ARRAY", Keyword::Array),
    ("OF", Keyword::Of),
    ("TRUE", Keyword::True),
    ("FALSE", Keyword::False),
    ("OR", Keyword::Or),
    ("AND", Keyword::And),
    ("NOT", Keyword::Not),
    ("MOD", Keyword::Mod),
    ("DIV", Keyword::Div),
];

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: SourcePos,
}

/// Tokenise a full ST source into a stream ending in `TokenKind::Eof`.
pub fn tokenize(src: &str) -> Result<Vec<Token>, LexError> {
    Lexer::new(src).run()
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::CharIndices<'a>>,
    src: &'a str,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            chars: src.char_indices().peekable(),
            src,
            line: 1,
            column: 1,
        }
    }

    fn pos(&self) -> SourcePos {
        SourcePos {
            line: self.line,
            column: self.column,
        }
    }

    fn bump(&mut self) -> Option<(usize, char)> {
        let next = self.chars.next();
        if let Some((_, c)) = next {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        next
    }

    fn peek_char(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }

    fn run(mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            self.skip_whitespace_and_comments();
            let pos = self.pos();
            let Some((start, c)) = self.bump() else {
                tokens.push(Token {
                    kind: TokenKind::Eof,
                    pos,
                });
                break;
            };
            let kind = match c {
                '+' => TokenKind::Plus,
                '-' => TokenKind::Minus,
                '*' => TokenKind::Star,
                '/' => TokenKind::Slash,
                '%' => TokenKind::Percent,
                '(' => TokenKind::LParen,
                ')' => TokenKind::RParen,
                '[' => TokenKind::LBracket,
                ']' => TokenKind::RBracket,
                ';' => TokenKind::Semi,
                ',' => TokenKind::Comma,
                ':' => {
                    if self.peek_char() == Some('=') {
                        self.bump();
                        TokenKind::ColonEq
                    } else {
                        TokenKind::Colon
                    }
                }
                '.' => {
                    if self.peek_char() == Some('.') {
                        self.bump();
                        TokenKind::DotDot
                    } else {
                        TokenKind::Dot
                    }
                }
                '=' => TokenKind::Eq,
                '<' => match self.peek_char() {
                    Some('=') => {
                        self.bump();
                        TokenKind::Le
                    }
                    Some('>') => {
                        self.bump();
                        TokenKind::Ne
                    }
                    _ => TokenKind::Lt,
                },
                '>' => {
                    if self.peek_char() == Some('=') {
                        self.bump();
                        TokenKind::Ge
                    } else {
                        TokenKind::Gt
                    }
                }
                '!' => {
                    if self.peek_char() == Some('=') {
                        self.bump();
                        TokenKind::NeAlt
                    } else {
                        return Err(LexError { pos, got: c });
                    }
                }
                '\'' | '"' => self.lex_string(c, pos)?,
                '0'..='9' => self.lex_number_or_time(start, pos)?,
                c if c == '_' || c.is_alphabetic() => self.lex_ident_or_keyword(start, pos),
                other => return Err(LexError { pos, got: other }),
            };
            tokens.push(Token { kind, pos });
        }
        Ok(tokens)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek_char() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('/') => {
                    // lookahead without consuming unless it's really `//`
                    let mut lookahead = self.chars.clone();
                    lookahead.next();
                    if matches!(lookahead.peek(), Some((_, '/'))) {
                        self.bump();
                        self.bump();
                        while let Some(c) = self.peek_char() {
                            if c == '\n' {
                                break;
                            }
                            self.bump();
                        }
                    } else {
                        break;
                    }
                }
                Some('(') => {
                    let mut lookahead = self.chars.clone();
                    lookahead.next();
                    if matches!(lookahead.peek(), Some((_, '*'))) {
                        self.bump();
                        self.bump();
                        // Non-nested: stop at the first `*)` (spec §9 open
                        // question — nesting depth is explicitly
                        // unspecified, so this does not attempt to count).
                        loop {
                            match self.bump() {
                                None => break,
                                Some((_, '*')) if self.peek_char() == Some(')') => {
                                    self.bump();
                                    break;
                                }
                                _ => {}
                            }
                        }
                    } else {
                        break;
                    }
                }
                _ => break,
            }
        }
    }

    fn lex_string(&mut self, quote: char, pos: SourcePos) -> Result<TokenKind, LexError> {
        let mut s = String::new();
        loop {
            match self.bump() {
                None => return Err(LexError { pos, got: quote }),
                Some((_, c)) if c == quote => break,
                Some((_, '\\')) => match self.bump() {
                    Some((_, 'n')) => s.push('\n'),
                    Some((_, 't')) => s.push('\t'),
                    Some((_, c)) => s.push(c),
                    None => return Err(LexError { pos, got: '\\' }),
                },
                Some((_, c)) => s.push(c),
            }
        }
        Ok(TokenKind::Str(s))
    }

    fn lex_number_or_time(
        &mut self,
        start: usize,
        pos: SourcePos,
    ) -> Result<TokenKind, LexError> {
        let mut end = start + 1;
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                end += c.len_utf8();
                self.bump();
            } else {
                break;
            }
        }
        if self.peek_char() == Some('.') {
            let mut lookahead = self.chars.clone();
            lookahead.next();
            if matches!(lookahead.peek(), Some((_, c)) if c.is_ascii_digit()) {
                end += 1;
                self.bump();
                while let Some(c) = self.peek_char() {
                    if c.is_ascii_digit() {
                        end += c.len_utf8();
                        self.bump();
                    } else {
                        break;
                    }
                }
            }
        }
        let text = &self.src[start..end];
        text.parse::<f64>()
            .map(TokenKind::Number)
            .map_err(|_| LexError { pos, got: text.chars().next().unwrap_or('0') })
    }

    fn lex_ident_or_keyword(&mut self, start: usize, pos: SourcePos) -> TokenKind {
        let mut end = start + 1;
        while let Some(c) = self.peek_char() {
            if c == '_' || c.is_alphanumeric() {
                end += c.len_utf8();
                self.bump();
            } else {
                break;
            }
        }
        let text = &self.src[start..end];
        let upper = text.to_ascii_uppercase();

        // Time literal: T#<number><unit> or TIME#<number><unit>.
        if (upper == "T" || upper == "TIME") && self.peek_char() == Some('#') {
            self.bump();
            return self.lex_time_literal(pos);
        }

        for (name, kw) in KEYWORDS {
            if upper == *name {
                return TokenKind::Keyword(*kw);
            }
        }
        TokenKind::Ident(text.to_string())
    }

    fn lex_time_literal(&mut self, pos: SourcePos) -> TokenKind {
        let mut digits = String::new();
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() || c == '.' {
                digits.push(c);
                self.bump();
            } else {
                break;
            }
        }
        let mut unit = String::new();
        while let Some(c) = self.peek_char() {
            if c.is_alphabetic() {
                unit.push(c);
                self.bump();
            } else {
                break;
            }
        }
        let n: f64 = digits.parse().unwrap_or(0.0);
        let ms = match unit.as_str() {
            "ms" => n,
            "s" => n * 1000.0,
            "m" => n * 60_000.0,
            "h" => n * 3_600_000.0,
            "d" => n * 86_400_000.0,
            _ => n,
        };
        let _ = pos;
        TokenKind::TimeMs(ms as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).unwrap().into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn tokenizes_assignment() {
        let k = kinds("Start := TRUE;");
        assert_eq!(
            k,
            vec![
                TokenKind::Ident("Start".into()),
                TokenKind::ColonEq,
                TokenKind::Keyword(Keyword::True),
                TokenKind::Semi,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn time_literal_converts_to_ms() {
        let k = kinds("T#100ms");
        assert_eq!(k, vec![TokenKind::TimeMs(100), TokenKind::Eof]);
        let k = kinds("T#2s");
        assert_eq!(k, vec![TokenKind::TimeMs(2000), TokenKind::Eof]);
    }

    #[test]
    fn skips_line_and_block_comments() {
        let k = kinds("// hi\nA := 1; (* skip this *) B := 2;");
        assert_eq!(
            k,
            vec![
                TokenKind::Ident("A".into()),
                TokenKind::ColonEq,
                TokenKind::Number(1.0),
                TokenKind::Semi,
                TokenKind::Ident("B".into()),
                TokenKind::ColonEq,
                TokenKind::Number(2.0),
                TokenKind::Semi,
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn rejects_unknown_character() {
        let err = tokenize("A := @;").unwrap_err();
        assert_eq!(err.got, '@');
    }

    #[test]
    fn two_char_operators() {
        let k = kinds("A <= B <> C >= D != E");
        assert_eq!(
            k,
            vec![
                TokenKind::Ident("A".into()),
                TokenKind::Le,
                TokenKind::Ident("B".into()),
                TokenKind::Ne,
                TokenKind::Ident("C".into()),
                TokenKind::Ge,
                TokenKind::Ident("D".into()),
                TokenKind::NeAlt,
                TokenKind::Ident("E".into()),
                TokenKind::Eof,
            ]
        );
    }
}
