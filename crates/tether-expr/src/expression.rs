use std::fmt;

use regex::Regex;
use tether_ir::ParameterLocation;

use crate::lexer::{tokenize, Token};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ExpressionError {
    #[error("Invalid expression `{expression}`: unknown token `{token}`")]
    UnknownToken { expression: String, token: String },

    #[error("Invalid expression `{expression}`: `{name}` should be followed by a dot, got `{got}`")]
    ExpectedDot {
        expression: String,
        name: String,
        got: String,
    },

    #[error("Invalid expression `{expression}`")]
    Invalid { expression: String },

    #[error("Invalid expression `{expression}`: nested embedded expressions are not allowed")]
    NestedEmbedded { expression: String },

    #[error("Invalid expression `{expression}`: unmatched bracket")]
    UnmatchedBracket { expression: String },

    #[error("Invalid extractor in `{expression}`: only `#regex:` is supported")]
    InvalidExtractor { expression: String },

    #[error("Invalid regex extractor `{pattern}`: {reason}")]
    InvalidRegex { pattern: String, reason: String },

    #[error("Regex extractor `{pattern}` must have exactly one capturing group, found {groups}")]
    RegexGroups { pattern: String, groups: usize },
}

/// Single-capture-group regex applied to a header or parameter value.
#[derive(Debug, Clone)]
pub struct Extractor {
    regex: Regex,
}

impl Extractor {
    pub fn new(pattern: &str) -> Result<Self, ExpressionError> {
        let regex = Regex::new(pattern).map_err(|e| ExpressionError::InvalidRegex {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        // captures_len counts the implicit whole-match group.
        let groups = regex.captures_len() - 1;
        if groups != 1 {
            return Err(ExpressionError::RegexGroups {
                pattern: pattern.to_string(),
                groups,
            });
        }
        Ok(Self { regex })
    }

    /// The first capture group, or the empty string when nothing matches.
    pub fn extract(&self, value: &str) -> String {
        self.regex
            .captures(value)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default()
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }
}

impl PartialEq for Extractor {
    fn eq(&self, other: &Self) -> bool {
        self.pattern() == other.pattern()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal text, passed through as-is.
    Text(String),
    Url,
    Method,
    StatusCode,
    RequestParameter {
        location: ParameterLocation,
        name: String,
        extractor: Option<Extractor>,
    },
    RequestBody {
        pointer: Option<String>,
    },
    ResponseHeader {
        name: String,
        extractor: Option<Extractor>,
    },
    ResponseBody {
        pointer: Option<String>,
    },
}

/// A parsed runtime expression, reusable across evaluations.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    nodes: Vec<Node>,
}

impl Expression {
    pub fn parse(expression: &str) -> Result<Self, ExpressionError> {
        let nodes = Parser::new(expression).parse()?;
        Ok(Self {
            source: expression.to_string(),
            nodes,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Whether evaluation needs a response in the context.
    pub fn references_response(&self) -> bool {
        self.nodes.iter().any(|n| {
            matches!(
                n,
                Node::StatusCode | Node::ResponseHeader { .. } | Node::ResponseBody { .. }
            )
        })
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

struct Parser<'a> {
    expression: &'a str,
    tokens: Vec<Token>,
    position: usize,
}

impl<'a> Parser<'a> {
    fn new(expression: &'a str) -> Self {
        Self {
            expression,
            tokens: tokenize(expression),
            position: 0,
        }
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn invalid(&self) -> ExpressionError {
        ExpressionError::Invalid {
            expression: self.expression.to_string(),
        }
    }

    fn parse(mut self) -> Result<Vec<Node>, ExpressionError> {
        let mut nodes = Vec::new();
        let mut inside_brackets = false;
        while let Some(token) = self.next() {
            match token {
                Token::String { value, .. } | Token::Pointer { value, .. } => {
                    nodes.push(Node::Text(value))
                }
                Token::Dot { .. } => nodes.push(Node::Text(".".to_string())),
                Token::Variable { value, .. } => nodes.push(self.parse_variable(&value)?),
                Token::LBracket { .. } => {
                    if inside_brackets {
                        return Err(ExpressionError::NestedEmbedded {
                            expression: self.expression.to_string(),
                        });
                    }
                    inside_brackets = true;
                }
                Token::RBracket { .. } => {
                    if !inside_brackets {
                        return Err(ExpressionError::UnmatchedBracket {
                            expression: self.expression.to_string(),
                        });
                    }
                    inside_brackets = false;
                }
            }
        }
        if inside_brackets {
            return Err(ExpressionError::UnmatchedBracket {
                expression: self.expression.to_string(),
            });
        }
        Ok(nodes)
    }

    fn parse_variable(&mut self, variable: &str) -> Result<Node, ExpressionError> {
        match variable {
            "$url" => Ok(Node::Url),
            "$method" => Ok(Node::Method),
            "$statusCode" => Ok(Node::StatusCode),
            "$request" => self.parse_request(),
            "$response" => self.parse_response(),
            other => Err(ExpressionError::UnknownToken {
                expression: self.expression.to_string(),
                token: other.to_string(),
            }),
        }
    }

    fn parse_request(&mut self) -> Result<Node, ExpressionError> {
        self.skip_dot("$request")?;
        let location = self.take_string()?;
        match location.as_str() {
            "body" => Ok(Node::RequestBody {
                pointer: self.take_pointer(),
            }),
            "path" | "query" | "header" | "cookie" => {
                self.skip_dot(&format!("$request.{location}"))?;
                let name = self.take_string()?;
                let extractor = self.take_extractor()?;
                let location = location.parse().map_err(|_| self.invalid())?;
                Ok(Node::RequestParameter {
                    location,
                    name,
                    extractor,
                })
            }
            _ => Err(self.invalid()),
        }
    }

    fn parse_response(&mut self) -> Result<Node, ExpressionError> {
        self.skip_dot("$response")?;
        let location = self.take_string()?;
        match location.as_str() {
            "body" => Ok(Node::ResponseBody {
                pointer: self.take_pointer(),
            }),
            "header" => {
                self.skip_dot("$response.header")?;
                let name = self.take_string()?;
                let extractor = self.take_extractor()?;
                Ok(Node::ResponseHeader { name, extractor })
            }
            _ => Err(self.invalid()),
        }
    }

    fn skip_dot(&mut self, name: &str) -> Result<(), ExpressionError> {
        match self.next() {
            Some(Token::Dot { .. }) => Ok(()),
            other => Err(ExpressionError::ExpectedDot {
                expression: self.expression.to_string(),
                name: name.to_string(),
                got: other.map(|t| t.value().to_string()).unwrap_or_default(),
            }),
        }
    }

    fn take_string(&mut self) -> Result<String, ExpressionError> {
        match self.next() {
            Some(Token::String { value, .. }) => Ok(value),
            _ => Err(self.invalid()),
        }
    }

    /// A `#/pointer` directly following `body`. The leading `#` is stripped.
    fn take_pointer(&mut self) -> Option<String> {
        match self.peek() {
            Some(Token::Pointer { value, .. }) if !value.starts_with("#regex:") => {
                let pointer = value[1..].to_string();
                self.position += 1;
                Some(pointer)
            }
            _ => None,
        }
    }

    /// Anything other than the end of the expression or of the embedded
    /// expression must be a `#regex:` extractor.
    fn take_extractor(&mut self) -> Result<Option<Extractor>, ExpressionError> {
        match self.peek() {
            None | Some(Token::RBracket { .. }) => Ok(None),
            Some(Token::Pointer { value, .. }) => match value.strip_prefix("#regex:") {
                Some(pattern) => {
                    let extractor = Extractor::new(pattern)?;
                    self.position += 1;
                    Ok(Some(extractor))
                }
                None => Err(ExpressionError::InvalidExtractor {
                    expression: self.expression.to_string(),
                }),
            },
            Some(_) => Err(ExpressionError::InvalidExtractor {
                expression: self.expression.to_string(),
            }),
        }
    }
}
