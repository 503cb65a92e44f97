//! Lex a GPR string into a series of tokens for later parsing

use std::iter::Peekable;
use std::str::CharIndices;

use crate::io::gpr_parse::token::Token;
use thiserror::Error;

pub struct Lexer<'s> {
    source: &'s str,
    chars: Peekable<CharIndices<'s>>,
}

impl<'s> Lexer<'s> {
    pub fn new(source: &'s str) -> Self {
        Lexer {
            source,
            chars: source.char_indices().peekable(),
        }
    }

    /// Convert the source string into tokens, always terminated by [`Token::Eof`]
    pub fn lex(&mut self) -> Result<Vec<Token>, LexerError> {
        let mut tokens = Vec::new();
        while let Some((start, c)) = self.chars.next() {
            match c {
                '(' => tokens.push(Token::LeftParen),
                ')' => tokens.push(Token::RightParen),
                c if c.is_whitespace() => {}
                c if is_identifier_start(c) => tokens.push(self.identifier(start)),
                _ => return Err(LexerError::InvalidToken(c, start)),
            }
        }
        tokens.push(Token::Eof);
        Ok(tokens)
    }

    /// Read the rest of a word starting at `start`, keywords are case insensitive
    fn identifier(&mut self, start: usize) -> Token {
        let mut end = self.source.len();
        while let Some(&(idx, c)) = self.chars.peek() {
            if !is_identifier_char(c) {
                end = idx;
                break;
            }
            self.chars.next();
        }
        let word = &self.source[start..end];
        match word.to_ascii_lowercase().as_str() {
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            _ => Token::Identifier(word.to_string()),
        }
    }
}

fn is_identifier_start(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Gene ids commonly carry transcript suffixes (`10005.1`) or locus separators
fn is_identifier_char(c: char) -> bool {
    is_identifier_start(c) || matches!(c, '.' | '-' | ':')
}

#[derive(Debug, Error, PartialEq, Clone)]
pub enum LexerError {
    #[error("Invalid character {0:?} at position {1}")]
    InvalidToken(char, usize),
}

#[cfg(test)]
mod tests {
    use crate::io::gpr_parse::lexer::{Lexer, LexerError};
    use crate::io::gpr_parse::token::Token;

    #[test]
    fn test_single_gene() {
        let mut lexer = Lexer::new("Rv0023");
        let tokens = lexer.lex().unwrap();
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0], Token::Identifier(String::from("Rv0023")));
    }

    #[test]
    fn test_grouping() {
        let mut lexer = Lexer::new("(Rv0023 or Rv0123)");
        let tokens = lexer.lex().unwrap();
        let expected_tokens = vec![
            Token::LeftParen,
            Token::Identifier(String::from("Rv0023")),
            Token::Or,
            Token::Identifier(String::from("Rv0123")),
            Token::RightParen,
            Token::Eof,
        ];
        assert_eq!(tokens, expected_tokens);
    }

    #[test]
    fn test_transcript_ids() {
        let mut lexer = Lexer::new("10005.1 AND not 10005.2");
        let tokens = lexer.lex().unwrap();
        let expected_tokens = vec![
            Token::Identifier(String::from("10005.1")),
            Token::And,
            Token::Not,
            Token::Identifier(String::from("10005.2")),
            Token::Eof,
        ];
        assert_eq!(tokens, expected_tokens);
    }

    #[test]
    fn keywords_ignore_case() {
        let tokens = Lexer::new("a1 aNd b2 Or NOT c3").lex().unwrap();
        assert_eq!(tokens[1], Token::And);
        assert_eq!(tokens[3], Token::Or);
        assert_eq!(tokens[4], Token::Not);
        // Keywords only match whole words
        let tokens = Lexer::new("android").lex().unwrap();
        assert_eq!(tokens[0], Token::Identifier("android".to_string()));
    }

    #[test]
    fn test_invalid_character() {
        let mut lexer = Lexer::new("Rv0001 & Rv0002");
        assert_eq!(lexer.lex(), Err(LexerError::InvalidToken('&', 7)));
    }
}
