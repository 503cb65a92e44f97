use std::iter::Peekable;
use std::vec::IntoIter;

use crate::io::gpr_parse::token::Token;
use crate::metabolic_model::gene::Gene;
use crate::metabolic_model::model::{Gpr, GprOperatorType};

use indexmap::IndexMap;
use thiserror::Error;
/*
GPR Grammar (`and` binds tighter than `or`, as in COBRApy rules):
expression -> or
or         -> and ("OR" and)* ;
and        -> unary ("AND" unary)* ;
unary      -> "NOT" unary | primary ;
primary    -> GENE | "(" expression ")" ;

e.g. Gene1 AND Gene2 OR Gene3 AND NOT Gene4 == (Gene1 AND Gene2) OR (Gene3 AND (NOT Gene4))
 */

/// Recursive descent parser turning GPR tokens into a [`Gpr`] tree
pub struct GPRParser<'gm> {
    tokens: Peekable<IntoIter<Token>>,
    /// Genes found in the rule are added here if missing
    pub(crate) gene_map: &'gm mut IndexMap<String, Gene>,
}

impl<'gm> GPRParser<'gm> {
    pub fn new(tokens: Vec<Token>, gene_map: &'gm mut IndexMap<String, Gene>) -> GPRParser<'gm> {
        GPRParser {
            tokens: tokens.into_iter().peekable(),
            gene_map,
        }
    }

    /// Parse the whole token stream into a GPR tree
    pub fn parse(&mut self) -> Result<Gpr, ParseError> {
        let gpr = self.expression()?;
        match self.tokens.peek() {
            None | Some(Token::Eof) => Ok(gpr),
            Some(_) => Err(ParseError::EarlyTermination),
        }
    }

    fn expression(&mut self) -> Result<Gpr, ParseError> {
        self.binary(GprOperatorType::Or)
    }

    /// Left associative chain of `operator`, with `and` chains as operands of `or`
    fn binary(&mut self, operator: GprOperatorType) -> Result<Gpr, ParseError> {
        let (token, operand) = match operator {
            GprOperatorType::Or => (Token::Or, GprOperatorType::And),
            GprOperatorType::And => (Token::And, GprOperatorType::Not),
            GprOperatorType::Not => return Err(ParseError::InvalidBinaryOperator),
        };
        let mut expr = self.operand(operand)?;
        while self.next_if(&token) {
            let right = self.operand(operand)?;
            expr = Gpr::new_binary_operation(expr, operator, right)
                .map_err(|_| ParseError::InvalidBinaryOperator)?;
        }
        Ok(expr)
    }

    fn operand(&mut self, operator: GprOperatorType) -> Result<Gpr, ParseError> {
        match operator {
            GprOperatorType::Not => self.unary(),
            binary => self.binary(binary),
        }
    }

    fn unary(&mut self) -> Result<Gpr, ParseError> {
        if self.next_if(&Token::Not) {
            let val = self.unary()?;
            return Gpr::new_unary_operation(GprOperatorType::Not, val)
                .map_err(|_| ParseError::InvalidUnaryOperator);
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Gpr, ParseError> {
        match self.tokens.next_if(|t| matches!(t, Token::Identifier(_) | Token::LeftParen)) {
            Some(Token::Identifier(gene)) => {
                self.gene_map
                    .entry(gene.clone())
                    .or_insert_with(|| Gene::new(&gene));
                Ok(Gpr::new_gene_node(&gene))
            }
            Some(_) => {
                let expr = self.expression()?;
                if !self.next_if(&Token::RightParen) {
                    return Err(ParseError::MissingToken(
                        "Expect ')' after expression.".to_string(),
                    ));
                }
                Ok(expr)
            }
            None => Err(ParseError::ExpectedExpression),
        }
    }

    /// Consume the next token if it is `token`
    fn next_if(&mut self, token: &Token) -> bool {
        self.tokens.next_if_eq(token).is_some()
    }
}

/// Enum representing possible parse errors
#[derive(Debug, Error, PartialEq, Clone)]
pub enum ParseError {
    /// Token was expected to be a binary operator but was not
    #[error("Invalid binary operator encountered, expected only `and` and `or`")]
    InvalidBinaryOperator,
    /// Token was expected to be a unary operator but was not
    #[error("Invalid unary operator encountered, expected only `not`")]
    InvalidUnaryOperator,
    /// Missing expected token (e.g. a right parenthesis)
    #[error("Missing expected token: {0}")]
    MissingToken(String),
    /// No expression found when one was expected
    #[error("No expression found, check that the GPR string is not empty")]
    ExpectedExpression,
    /// Expression was not completed when parsing terminated
    #[error("Parsing terminated early, check for a `not` between two gene identifiers/grouped expressions")]
    EarlyTermination,
}
