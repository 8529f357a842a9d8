//! Tokenizer for the expression language.

use rust_decimal::Decimal;
use std::str::FromStr;

use super::expressions_errors::ExpressionError;
use crate::constants::MAX_EXPRESSION_STRING_LEN;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(Decimal),
    Str(String),
    Ident(String),
    And,
    Or,
    Not,
    In,
    If,
    Else,
    True,
    False,
    None,
    Plus,
    Minus,
    Star,
    DoubleStar,
    Slash,
    DoubleSlash,
    Percent,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Assign,
}

/// A token with the byte offset it starts at.
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub position: usize,
}

pub fn tokenize(source: &str) -> Result<Vec<Spanned>, ExpressionError> {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (position, c) = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && next_is_digit(&chars, i)) {
            let start = i;
            while i < chars.len() && (chars[i].1.is_ascii_digit() || chars[i].1 == '_') {
                i += 1;
            }
            if i < chars.len() && chars[i].1 == '.' && next_is_digit(&chars, i) {
                i += 1;
                while i < chars.len() && chars[i].1.is_ascii_digit() {
                    i += 1;
                }
            } else if i < chars.len() && chars[i].1 == '.' && !next_is_ident_start(&chars, i) {
                // trailing dot as in `1.`
                i += 1;
            }
            let mut exponent = false;
            if i < chars.len() && (chars[i].1 == 'e' || chars[i].1 == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j].1 == '+' || chars[j].1 == '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].1.is_ascii_digit() {
                    exponent = true;
                    i = j;
                    while i < chars.len() && chars[i].1.is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let text: String = chars[start..i]
                .iter()
                .map(|(_, ch)| *ch)
                .filter(|ch| *ch != '_')
                .collect();
            let text = text.trim_end_matches('.');
            let text = if text.starts_with('.') {
                format!("0{}", text)
            } else {
                text.to_string()
            };
            let parsed = if exponent {
                Decimal::from_scientific(&text)
            } else {
                Decimal::from_str(&text)
            };
            let number = parsed
                .map_err(|_| ExpressionError::parse(position, format!("invalid number '{}'", text)))?;
            tokens.push(Spanned {
                token: Token::Number(number),
                position,
            });
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].1.is_alphanumeric() || chars[i].1 == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().map(|(_, ch)| *ch).collect();
            let token = match word.as_str() {
                "and" => Token::And,
                "or" => Token::Or,
                "not" => Token::Not,
                "in" => Token::In,
                "if" => Token::If,
                "else" => Token::Else,
                "True" | "true" => Token::True,
                "False" | "false" => Token::False,
                "None" | "null" => Token::None,
                _ => Token::Ident(word),
            };
            tokens.push(Spanned { token, position });
            continue;
        }

        if c == '"' || c == '\'' {
            let quote = c;
            i += 1;
            let mut text = String::new();
            let mut closed = false;
            while i < chars.len() {
                let ch = chars[i].1;
                if ch == '\\' && i + 1 < chars.len() {
                    match chars[i + 1].1 {
                        'n' => text.push('\n'),
                        't' => text.push('\t'),
                        'r' => text.push('\r'),
                        escaped @ ('\\' | '\'' | '"') => text.push(escaped),
                        other => {
                            text.push('\\');
                            text.push(other);
                        }
                    }
                    i += 2;
                    continue;
                }
                if ch == quote {
                    closed = true;
                    i += 1;
                    break;
                }
                text.push(ch);
                i += 1;
            }
            if !closed {
                return Err(ExpressionError::parse(position, "unterminated string literal"));
            }
            if text.len() > MAX_EXPRESSION_STRING_LEN {
                return Err(ExpressionError::LimitExceeded(format!(
                    "string literal longer than {} characters",
                    MAX_EXPRESSION_STRING_LEN
                )));
            }
            tokens.push(Spanned {
                token: Token::Str(text),
                position,
            });
            continue;
        }

        let next = chars.get(i + 1).map(|(_, ch)| *ch);
        let (token, width) = match (c, next) {
            ('*', Some('*')) => (Token::DoubleStar, 2),
            ('/', Some('/')) => (Token::DoubleSlash, 2),
            ('=', Some('=')) => (Token::Eq, 2),
            ('!', Some('=')) => (Token::NotEq, 2),
            ('<', Some('=')) => (Token::LtEq, 2),
            ('>', Some('=')) => (Token::GtEq, 2),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', _) => (Token::Star, 1),
            ('/', _) => (Token::Slash, 1),
            ('%', _) => (Token::Percent, 1),
            ('<', _) => (Token::Lt, 1),
            ('>', _) => (Token::Gt, 1),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            ('[', _) => (Token::LBracket, 1),
            (']', _) => (Token::RBracket, 1),
            (',', _) => (Token::Comma, 1),
            ('.', _) => (Token::Dot, 1),
            ('=', _) => (Token::Assign, 1),
            _ => {
                return Err(ExpressionError::parse(
                    position,
                    format!("unexpected character '{}'", c),
                ))
            }
        };
        tokens.push(Spanned { token, position });
        i += width;
    }

    Ok(tokens)
}

fn next_is_digit(chars: &[(usize, char)], i: usize) -> bool {
    chars.get(i + 1).map(|(_, ch)| ch.is_ascii_digit()).unwrap_or(false)
}

fn next_is_ident_start(chars: &[(usize, char)], i: usize) -> bool {
    chars
        .get(i + 1)
        .map(|(_, ch)| ch.is_alphabetic() || *ch == '_')
        .unwrap_or(false)
}
