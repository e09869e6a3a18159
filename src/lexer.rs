//! Lexer for the dataflow description language using logos
//!
//! Supports tokens like:
//! - Identifiers: Network, CONV1, TemporalMap, Y' (a trailing prime is allowed)
//! - Integers: 1, 64
//! - Operators: +, -
//! - Punctuation: {, }, (, ), ,, ;, :
//!
//! Keywords are lexed as identifiers and recognised by the parser.

use logos::Logos;

/// Token types for the dataflow description language
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r]+")] // Skip whitespace
#[logos(skip r"//[^\n]*")] // Skip line comments
pub enum Token {
    // Literals
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Number(i64),

    // Identifiers and keywords
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*'?", |lex| lex.slice().to_string())]
    Ident(String),

    // Operators
    #[token("+")]
    Plus,

    #[token("-")]
    Minus,

    // Punctuation
    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token(",")]
    Comma,

    #[token(";")]
    Semicolon,

    #[token(":")]
    Colon,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{}", n),
            Token::Ident(s) => write!(f, "{}", s),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Comma => write!(f, ","),
            Token::Semicolon => write!(f, ";"),
            Token::Colon => write!(f, ":"),
        }
    }
}

/// Lexer wrapper that provides a stream of tokens
pub struct Lexer<'source> {
    inner: logos::Lexer<'source, Token>,
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source str) -> Self {
        Self {
            inner: Token::lexer(source),
        }
    }

    /// Get current position in source
    pub fn span(&self) -> std::ops::Range<usize> {
        self.inner.span()
    }
}

impl<'source> Iterator for Lexer<'source> {
    type Item = Result<Token, ()>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directive_tokens() {
        let source = "TemporalMap(Sz(R),1) Y';";
        let tokens: Vec<_> = Lexer::new(source).filter_map(Result::ok).collect();
        assert_eq!(tokens, vec![
            Token::Ident("TemporalMap".to_string()),
            Token::LParen,
            Token::Ident("Sz".to_string()),
            Token::LParen,
            Token::Ident("R".to_string()),
            Token::RParen,
            Token::Comma,
            Token::Number(1),
            Token::RParen,
            Token::Ident("Y'".to_string()),
            Token::Semicolon,
        ]);
    }

    #[test]
    fn test_block_tokens() {
        let source = "Dimensions { K: 64, C: 3 } // trailing comment";
        let tokens: Vec<_> = Lexer::new(source).filter_map(Result::ok).collect();
        assert_eq!(tokens, vec![
            Token::Ident("Dimensions".to_string()),
            Token::LBrace,
            Token::Ident("K".to_string()),
            Token::Colon,
            Token::Number(64),
            Token::Comma,
            Token::Ident("C".to_string()),
            Token::Colon,
            Token::Number(3),
            Token::RBrace,
        ]);
    }

    #[test]
    fn test_size_arithmetic() {
        let source = "8+Sz(R)-1";
        let tokens: Vec<_> = Lexer::new(source).filter_map(Result::ok).collect();
        assert_eq!(tokens.len(), 8);
        assert_eq!(tokens[1], Token::Plus);
        assert_eq!(tokens[6], Token::Minus);
    }

    #[test]
    fn test_invalid_character() {
        let results: Vec<_> = Lexer::new("K @ 3").collect();
        assert!(results.iter().any(|r| r.is_err()));
    }
}
