//! Lexical analysis of runtime expressions.
//!
//! `}` always closes an embedded expression, even inside a JSON pointer, so
//! `ID_{$response.body#/foo}_{$response.body#/bar}` splits as expected. A
//! pointer segment can therefore never contain a literal `}`.

/// A lexical token with the byte offset of its last character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    /// `$response`, `$request`, `$url`, ...
    Variable { value: String, end: usize },
    /// Plain text between other tokens.
    String { value: String, end: usize },
    /// Everything from `#` up to `}` or the end of input.
    Pointer { value: String, end: usize },
    Dot { end: usize },
    LBracket { end: usize },
    RBracket { end: usize },
}

impl Token {
    pub fn value(&self) -> &str {
        match self {
            Token::Variable { value, .. }
            | Token::String { value, .. }
            | Token::Pointer { value, .. } => value,
            Token::Dot { .. } => ".",
            Token::LBracket { .. } => "{",
            Token::RBracket { .. } => "}",
        }
    }

    pub fn end(&self) -> usize {
        match self {
            Token::Variable { end, .. }
            | Token::String { end, .. }
            | Token::Pointer { end, .. }
            | Token::Dot { end }
            | Token::LBracket { end }
            | Token::RBracket { end } => *end,
        }
    }
}

fn is_stop(c: char) -> bool {
    matches!(c, '$' | '.' | '{' | '}' | '#')
}

pub fn tokenize(expression: &str) -> Vec<Token> {
    let chars: Vec<(usize, char)> = expression.char_indices().collect();
    let mut tokens = Vec::new();
    let mut cursor = 0;

    let slice = |from: usize, to: usize| -> String {
        let start = chars[from].0;
        let stop = if to < chars.len() {
            chars[to].0
        } else {
            expression.len()
        };
        expression[start..stop].to_string()
    };

    while cursor < chars.len() {
        let (offset, c) = chars[cursor];
        match c {
            '.' => {
                tokens.push(Token::Dot { end: offset });
                cursor += 1;
            }
            '{' => {
                tokens.push(Token::LBracket { end: offset });
                cursor += 1;
            }
            '}' => {
                tokens.push(Token::RBracket { end: offset });
                cursor += 1;
            }
            '#' => {
                let start = cursor;
                cursor += 1;
                while cursor < chars.len() && chars[cursor].1 != '}' {
                    cursor += 1;
                }
                tokens.push(Token::Pointer {
                    value: slice(start, cursor),
                    end: chars[cursor - 1].0,
                });
            }
            _ => {
                let start = cursor;
                cursor += 1;
                while cursor < chars.len() && !is_stop(chars[cursor].1) {
                    cursor += 1;
                }
                let value = slice(start, cursor);
                let end = chars[cursor - 1].0;
                if c == '$' {
                    tokens.push(Token::Variable { value, end });
                } else {
                    tokens.push(Token::String { value, end });
                }
            }
        }
    }
    tokens
}
