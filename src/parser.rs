//! Parser for the dataflow description language
//!
//! Parses descriptions like:
//! ```text
//! Network demo {
//!   Layer CONV1 {
//!     Type: CONV
//!     Stride { X: 1, Y: 1 }
//!     Dimensions { K: 4, C: 2, R: 3, S: 3, Y: 10, X: 10 }
//!     Dataflow {
//!       SpatialMap(1,1) K;
//!       TemporalMap(Sz(R),1) Y;
//!       Cluster(2, P);
//!       SpatialMap(1,1) C;
//!     }
//!   }
//! }
//! ```

use crate::ast::{DataflowItem, DirectiveDecl, Layer, LayerType, Network, SizeExpr};
use crate::directive::DirectiveClass;
use crate::energy::Quantization;
use crate::error::{AnalysisError, AnalysisResult};
use crate::lexer::{Lexer, Token};

/// Parser for dataflow descriptions
pub struct Parser<'source> {
    lexer: Lexer<'source>,
    current: Option<Token>,
    /// First lexer error seen, reported on the next advance
    lex_error: Option<AnalysisError>,
}

impl<'source> Parser<'source> {
    pub fn new(source: &'source str) -> Self {
        let mut parser = Self {
            lexer: Lexer::new(source),
            current: None,
            lex_error: None,
        };
        parser.current = parser.next_token();
        parser
    }

    fn next_token(&mut self) -> Option<Token> {
        match self.lexer.next() {
            Some(Ok(tok)) => Some(tok),
            Some(Err(())) => {
                if self.lex_error.is_none() {
                    self.lex_error = Some(AnalysisError::LexerError {
                        position: self.lexer.span().start,
                        message: "unexpected character".to_string(),
                    });
                }
                None
            }
            None => None,
        }
    }

    /// Advance to the next token
    fn advance(&mut self) -> AnalysisResult<Option<Token>> {
        if let Some(err) = self.lex_error.take() {
            return Err(err);
        }
        let prev = self.current.take();
        self.current = self.next_token();
        Ok(prev)
    }

    /// Check if current token matches expected
    fn check(&self, expected: &Token) -> bool {
        match &self.current {
            Some(tok) => std::mem::discriminant(tok) == std::mem::discriminant(expected),
            None => false,
        }
    }

    fn check_keyword(&self, keyword: &str) -> bool {
        matches!(&self.current, Some(Token::Ident(name)) if name == keyword)
    }

    /// Consume token if it matches, otherwise error
    fn expect(&mut self, expected: Token) -> AnalysisResult<Token> {
        if self.check(&expected) {
            self.advance()?
                .ok_or_else(|| AnalysisError::parse_error("Unexpected end of input"))
        } else {
            Err(self.unexpected(&expected.to_string()))
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> AnalysisResult<()> {
        if self.check_keyword(keyword) {
            self.advance()?;
            Ok(())
        } else {
            Err(self.unexpected(keyword))
        }
    }

    fn expect_ident(&mut self) -> AnalysisResult<String> {
        match self.advance()? {
            Some(Token::Ident(name)) => Ok(name),
            other => Err(AnalysisError::parse_error(format!(
                "Expected identifier, got {:?}",
                other
            ))),
        }
    }

    fn expect_number(&mut self) -> AnalysisResult<i64> {
        match self.advance()? {
            Some(Token::Number(n)) => Ok(n),
            other => Err(AnalysisError::parse_error(format!(
                "Expected number, got {:?}",
                other
            ))),
        }
    }

    fn skip_optional(&mut self, token: Token) -> AnalysisResult<()> {
        if self.check(&token) {
            self.advance()?;
        }
        Ok(())
    }

    fn unexpected(&mut self, expected: &str) -> AnalysisError {
        if let Some(err) = self.lex_error.take() {
            return err;
        }
        AnalysisError::parse_error(format!("Expected {}, got {:?}", expected, self.current))
    }

    /// Parse a complete description
    ///
    /// The `Network name { ... }` wrapper is optional; bare layers form an
    /// unnamed network.
    pub fn parse_network(&mut self) -> AnalysisResult<Network> {
        let network = if self.check_keyword("Network") {
            self.advance()?;
            let name = self.expect_ident()?;
            self.expect(Token::LBrace)?;
            let layers = self.parse_layers(true)?;
            self.expect(Token::RBrace)?;
            Network { name, layers }
        } else {
            let layers = self.parse_layers(false)?;
            Network {
                name: "network".to_string(),
                layers,
            }
        };

        if let Some(err) = self.lex_error.take() {
            return Err(err);
        }
        if self.current.is_some() {
            return Err(self.unexpected("end of input"));
        }
        Ok(network)
    }

    fn parse_layers(&mut self, in_block: bool) -> AnalysisResult<Vec<Layer>> {
        let mut layers = Vec::new();
        while self.current.is_some() && !(in_block && self.check(&Token::RBrace)) {
            layers.push(self.parse_layer()?);
        }
        Ok(layers)
    }

    /// Parse a `Layer name { ... }` block
    pub fn parse_layer(&mut self) -> AnalysisResult<Layer> {
        self.expect_keyword("Layer")?;
        let name = self.expect_ident()?;
        self.expect(Token::LBrace)?;

        let mut layer_type = None;
        let mut quantization = Quantization::default();
        let mut strides = Vec::new();
        let mut dimensions = Vec::new();
        let mut dataflow = Vec::new();

        while !self.check(&Token::RBrace) {
            let keyword = self.expect_ident()?;
            match keyword.as_str() {
                "Type" => {
                    self.expect(Token::Colon)?;
                    layer_type = Some(self.expect_ident()?.parse::<LayerType>()?);
                    self.skip_optional(Token::Semicolon)?;
                }
                "Quantization" => {
                    self.expect(Token::Colon)?;
                    quantization = self.expect_ident()?.parse::<Quantization>()?;
                    self.skip_optional(Token::Semicolon)?;
                }
                "Stride" => strides = self.parse_entries()?,
                "Dimensions" => dimensions = self.parse_entries()?,
                "Dataflow" => dataflow = self.parse_dataflow()?,
                other => {
                    return Err(AnalysisError::parse_error(format!(
                        "Unknown layer section '{}' in layer {}",
                        other, name
                    )))
                }
            }
        }
        self.expect(Token::RBrace)?;

        let layer_type = layer_type.ok_or_else(|| {
            AnalysisError::parse_error(format!("Layer {} has no Type", name))
        })?;

        Ok(Layer {
            name,
            layer_type,
            quantization,
            strides,
            dimensions,
            dataflow,
        })
    }

    /// Parse `{ A: 1, B: 2 }`
    fn parse_entries(&mut self) -> AnalysisResult<Vec<(String, i64)>> {
        self.expect(Token::LBrace)?;
        let mut entries = Vec::new();
        while !self.check(&Token::RBrace) {
            let name = self.expect_ident()?;
            self.expect(Token::Colon)?;
            let value = self.expect_number()?;
            entries.push((name, value));
            self.skip_optional(Token::Comma)?;
        }
        self.expect(Token::RBrace)?;
        Ok(entries)
    }

    /// Parse the body of a `Dataflow { ... }` block
    fn parse_dataflow(&mut self) -> AnalysisResult<Vec<DataflowItem>> {
        self.expect(Token::LBrace)?;
        let mut items = Vec::new();

        while !self.check(&Token::RBrace) {
            let keyword = self.expect_ident()?;
            let item = match keyword.as_str() {
                "TemporalMap" => DataflowItem::Map(self.parse_directive(DirectiveClass::TemporalMap)?),
                "SpatialMap" => DataflowItem::Map(self.parse_directive(DirectiveClass::SpatialMap)?),
                "Cluster" => {
                    self.expect(Token::LParen)?;
                    let size = self.expect_number()?;
                    let mut logical = false;
                    if self.check(&Token::Comma) {
                        self.advance()?;
                        logical = match self.expect_ident()?.as_str() {
                            "P" => false,
                            "L" => true,
                            other => {
                                return Err(AnalysisError::parse_error(format!(
                                    "Unknown cluster type '{}'",
                                    other
                                )))
                            }
                        };
                    }
                    self.expect(Token::RParen)?;
                    DataflowItem::Cluster { size, logical }
                }
                other => {
                    return Err(AnalysisError::parse_error(format!(
                        "Unknown directive '{}'",
                        other
                    )))
                }
            };
            self.skip_optional(Token::Semicolon)?;
            items.push(item);
        }
        self.expect(Token::RBrace)?;
        Ok(items)
    }

    /// Parse `(size, offset) Dim` after the map keyword
    fn parse_directive(&mut self, class: DirectiveClass) -> AnalysisResult<DirectiveDecl> {
        self.expect(Token::LParen)?;
        let size = self.parse_size_expr()?;
        self.expect(Token::Comma)?;
        let offset = self.parse_size_expr()?;
        self.expect(Token::RParen)?;
        let dim = self.expect_ident()?;
        Ok(DirectiveDecl {
            class,
            size,
            offset,
            dim,
        })
    }

    /// Parse additive size expressions: a + b, a - b
    fn parse_size_expr(&mut self) -> AnalysisResult<SizeExpr> {
        let mut left = self.parse_size_term()?;

        loop {
            if self.check(&Token::Plus) {
                self.advance()?;
                let right = self.parse_size_term()?;
                left = SizeExpr::Add(Box::new(left), Box::new(right));
            } else if self.check(&Token::Minus) {
                self.advance()?;
                let right = self.parse_size_term()?;
                left = SizeExpr::Sub(Box::new(left), Box::new(right));
            } else {
                break;
            }
        }

        Ok(left)
    }

    /// Parse a number or `Sz(Dim)`
    fn parse_size_term(&mut self) -> AnalysisResult<SizeExpr> {
        match self.advance()? {
            Some(Token::Number(n)) => Ok(SizeExpr::Literal(n)),
            Some(Token::Ident(name)) if name == "Sz" => {
                self.expect(Token::LParen)?;
                let dim = self.expect_ident()?;
                self.expect(Token::RParen)?;
                Ok(SizeExpr::Sz(dim))
            }
            other => Err(AnalysisError::parse_error(format!(
                "Expected size expression, got {:?}",
                other
            ))),
        }
    }
}

/// Parse a complete description
pub fn parse(source: &str) -> AnalysisResult<Network> {
    Parser::new(source).parse_network()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONV_LAYER: &str = "
        Network demo {
          Layer CONV1 {
            Type: CONV
            Quantization: INT8
            Stride { X: 1, Y: 1 }
            Dimensions { K: 4, C: 2, R: 3, S: 3, Y: 10, X: 10 }
            Dataflow {
              SpatialMap(1,1) K;
              TemporalMap(Sz(R),1) Y;
              Cluster(2, P);
              SpatialMap(1,1) C;
            }
          }
        }";

    #[test]
    fn test_parse_network() {
        let network = parse(CONV_LAYER).unwrap();
        assert_eq!(network.name, "demo");
        assert_eq!(network.layers.len(), 1);

        let layer = &network.layers[0];
        assert_eq!(layer.name, "CONV1");
        assert_eq!(layer.layer_type, LayerType::Conv);
        assert_eq!(layer.quantization, Quantization::INT8);
        assert_eq!(layer.dimensions.len(), 6);
        assert_eq!(layer.stride_of("Y"), 1);
        assert_eq!(layer.dataflow.len(), 4);
        assert_eq!(layer.dataflow[2], DataflowItem::Cluster { size: 2, logical: false });
    }

    #[test]
    fn test_parse_directive_sizes() {
        let network = parse(CONV_LAYER).unwrap();
        if let DataflowItem::Map(decl) = &network.layers[0].dataflow[1] {
            assert_eq!(decl.class, DirectiveClass::TemporalMap);
            assert_eq!(decl.size, SizeExpr::Sz("R".to_string()));
            assert_eq!(decl.offset, SizeExpr::Literal(1));
            assert_eq!(decl.dim, "Y");
        } else {
            panic!("Expected a map directive");
        }
    }

    #[test]
    fn test_parse_bare_layer() {
        let source = "Layer fc { Type: GEMM Dimensions { M: 8, N: 8, K: 8 } Dataflow { SpatialMap(1,1) M; TemporalMap(8-4,4) K; } }";
        let network = parse(source).unwrap();
        assert_eq!(network.name, "network");
        if let DataflowItem::Map(decl) = &network.layers[0].dataflow[1] {
            assert_eq!(decl.size.to_string(), "8-4");
        } else {
            panic!("Expected a map directive");
        }
    }

    #[test]
    fn test_unsupported_layer_type() {
        let result = parse("Layer l { Type: LSTM }");
        assert!(matches!(result, Err(AnalysisError::UnsupportedLayerType { .. })));
    }

    #[test]
    fn test_missing_type() {
        assert!(parse("Layer l { Dimensions { K: 4 } }").is_err());
    }

    #[test]
    fn test_lexer_error_reported() {
        let result = parse("Layer l { Type: CONV Dimensions { K: 4 @ } }");
        assert!(matches!(result, Err(AnalysisError::LexerError { .. })));
    }
}
