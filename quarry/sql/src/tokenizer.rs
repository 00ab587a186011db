// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! SQL tokenizer: turns the input text into a token stream with byte
//! offsets, so parse errors can point at the offending spot

use std::fmt;

use quarry_common::ParseError;

/// Keywords recognized by the dialect. Any other identifier carries
/// [`Keyword::NoKeyword`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Select,
    From,
    Where,
    Group,
    By,
    Order,
    Limit,
    As,
    And,
    Or,
    Not,
    Is,
    Null,
    Join,
    Inner,
    Left,
    Right,
    Full,
    Outer,
    Cross,
    On,
    Asc,
    Desc,
    Count,
    Sum,
    Avg,
    Min,
    Max,
    True,
    False,
    NoKeyword,
}

fn keyword_of(upper: &str) -> Keyword {
    match upper {
        "SELECT" => Keyword::Select,
        "FROM" => Keyword::From,
        "WHERE" => Keyword::Where,
        "GROUP" => Keyword::Group,
        "BY" => Keyword::By,
        "ORDER" => Keyword::Order,
        "LIMIT" => Keyword::Limit,
        "AS" => Keyword::As,
        "AND" => Keyword::And,
        "OR" => Keyword::Or,
        "NOT" => Keyword::Not,
        "IS" => Keyword::Is,
        "NULL" => Keyword::Null,
        "JOIN" => Keyword::Join,
        "INNER" => Keyword::Inner,
        "LEFT" => Keyword::Left,
        "RIGHT" => Keyword::Right,
        "FULL" => Keyword::Full,
        "OUTER" => Keyword::Outer,
        "CROSS" => Keyword::Cross,
        "ON" => Keyword::On,
        "ASC" => Keyword::Asc,
        "DESC" => Keyword::Desc,
        "COUNT" => Keyword::Count,
        "SUM" => Keyword::Sum,
        "AVG" => Keyword::Avg,
        "MIN" => Keyword::Min,
        "MAX" => Keyword::Max,
        "TRUE" => Keyword::True,
        "FALSE" => Keyword::False,
        _ => Keyword::NoKeyword,
    }
}

/// An identifier or keyword, case preserved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    pub value: String,
    pub keyword: Keyword,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Word(Word),
    /// Unsigned numeric literal text; sign is handled by the parser
    Number(String),
    SingleQuotedString(String),
    Comma,
    LParen,
    RParen,
    Period,
    SemiColon,
    Eq,
    Neq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    Plus,
    Minus,
    Mul,
    Div,
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Token::Word(w) => write!(f, "{}", w.value),
            Token::Number(n) => write!(f, "{n}"),
            Token::SingleQuotedString(s) => write!(f, "'{s}'"),
            Token::Comma => write!(f, ","),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::Period => write!(f, "."),
            Token::SemiColon => write!(f, ";"),
            Token::Eq => write!(f, "="),
            Token::Neq => write!(f, "!="),
            Token::Lt => write!(f, "<"),
            Token::LtEq => write!(f, "<="),
            Token::Gt => write!(f, ">"),
            Token::GtEq => write!(f, ">="),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Mul => write!(f, "*"),
            Token::Div => write!(f, "/"),
            Token::Eof => write!(f, "EOF"),
        }
    }
}

/// A token plus the byte offset it started at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenWithOffset {
    pub token: Token,
    pub offset: usize,
}

/// A short window of the input around `offset`, respecting char
/// boundaries, for error messages
pub fn snippet_at(sql: &str, offset: usize) -> String {
    let offset = offset.min(sql.len());
    let mut start = offset.saturating_sub(10);
    while !sql.is_char_boundary(start) {
        start -= 1;
    }
    sql[start..].chars().take(20).collect()
}

pub(crate) fn parse_error(message: impl Into<String>, offset: usize, sql: &str) -> ParseError {
    ParseError {
        message: message.into(),
        offset,
        snippet: snippet_at(sql, offset),
    }
}

/// SQL tokenizer over the raw query text
pub struct Tokenizer<'a> {
    sql: &'a str,
}

impl<'a> Tokenizer<'a> {
    pub fn new(sql: &'a str) -> Self {
        Self { sql }
    }

    pub fn tokenize(&self) -> Result<Vec<TokenWithOffset>, ParseError> {
        let mut tokens = Vec::new();
        let mut chars = self.sql.char_indices().peekable();

        while let Some(&(offset, c)) = chars.peek() {
            match c {
                c if c.is_whitespace() => {
                    chars.next();
                }
                // `--` comments run to end of line
                '-' if self.sql[offset..].starts_with("--") => {
                    for (_, c) in chars.by_ref() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                c if c.is_ascii_alphabetic() || c == '_' => {
                    let word = self.take_while(&mut chars, |c| {
                        c.is_ascii_alphanumeric() || c == '_'
                    });
                    let keyword = keyword_of(&word.to_ascii_uppercase());
                    tokens.push(TokenWithOffset {
                        token: Token::Word(Word {
                            value: word,
                            keyword,
                        }),
                        offset,
                    });
                }
                c if c.is_ascii_digit() => {
                    let mut text = self.take_while(&mut chars, |c| c.is_ascii_digit());
                    // a fractional part only when a digit follows the dot,
                    // so `t.1` style input does not confuse the number
                    if let Some(&(dot_idx, '.')) = chars.peek() {
                        if self.sql[dot_idx + 1..]
                            .chars()
                            .next()
                            .is_some_and(|c| c.is_ascii_digit())
                        {
                            chars.next();
                            text.push('.');
                            text.push_str(&self.take_while(&mut chars, |c| {
                                c.is_ascii_digit()
                            }));
                        }
                    }
                    tokens.push(TokenWithOffset {
                        token: Token::Number(text),
                        offset,
                    });
                }
                '\'' => {
                    chars.next();
                    let mut text = String::new();
                    let mut closed = false;
                    while let Some((_, c)) = chars.next() {
                        if c == '\'' {
                            // '' escapes a quote inside the string
                            if chars.peek().map(|&(_, c)| c) == Some('\'') {
                                chars.next();
                                text.push('\'');
                            } else {
                                closed = true;
                                break;
                            }
                        } else {
                            text.push(c);
                        }
                    }
                    if !closed {
                        return Err(parse_error(
                            "Unterminated string literal",
                            offset,
                            self.sql,
                        ));
                    }
                    tokens.push(TokenWithOffset {
                        token: Token::SingleQuotedString(text),
                        offset,
                    });
                }
                _ => {
                    chars.next();
                    let token = match c {
                        ',' => Token::Comma,
                        '(' => Token::LParen,
                        ')' => Token::RParen,
                        '.' => Token::Period,
                        ';' => Token::SemiColon,
                        '=' => Token::Eq,
                        '+' => Token::Plus,
                        '-' => Token::Minus,
                        '*' => Token::Mul,
                        '/' => Token::Div,
                        '<' => match chars.peek().map(|&(_, c)| c) {
                            Some('=') => {
                                chars.next();
                                Token::LtEq
                            }
                            Some('>') => {
                                chars.next();
                                Token::Neq
                            }
                            _ => Token::Lt,
                        },
                        '>' => match chars.peek().map(|&(_, c)| c) {
                            Some('=') => {
                                chars.next();
                                Token::GtEq
                            }
                            _ => Token::Gt,
                        },
                        '!' => match chars.peek().map(|&(_, c)| c) {
                            Some('=') => {
                                chars.next();
                                Token::Neq
                            }
                            _ => {
                                return Err(parse_error(
                                    "Unexpected character '!'",
                                    offset,
                                    self.sql,
                                ))
                            }
                        },
                        other => {
                            return Err(parse_error(
                                format!("Unexpected character '{other}'"),
                                offset,
                                self.sql,
                            ))
                        }
                    };
                    tokens.push(TokenWithOffset { token, offset });
                }
            }
        }

        tokens.push(TokenWithOffset {
            token: Token::Eof,
            offset: self.sql.len(),
        });
        Ok(tokens)
    }

    fn take_while(
        &self,
        chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>,
        pred: fn(char) -> bool,
    ) -> String {
        let mut out = String::new();
        while let Some(&(_, c)) = chars.peek() {
            if pred(c) {
                out.push(c);
                chars.next();
            } else {
                break;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(sql: &str) -> Vec<Token> {
        Tokenizer::new(sql)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.token)
            .collect()
    }

    #[test]
    fn keywords_are_case_insensitive() {
        let t = tokens("select FROM WhErE");
        assert!(matches!(&t[0], Token::Word(w) if w.keyword == Keyword::Select));
        assert!(matches!(&t[1], Token::Word(w) if w.keyword == Keyword::From));
        assert!(matches!(&t[2], Token::Word(w) if w.keyword == Keyword::Where));
    }

    #[test]
    fn operators() {
        assert_eq!(
            tokens("= != <> < <= > >="),
            vec![
                Token::Eq,
                Token::Neq,
                Token::Neq,
                Token::Lt,
                Token::LtEq,
                Token::Gt,
                Token::GtEq,
                Token::Eof,
            ]
        );
    }

    #[test]
    fn numbers_and_qualified_names() {
        assert_eq!(
            tokens("u.id 1.5 42"),
            vec![
                Token::Word(Word {
                    value: "u".to_string(),
                    keyword: Keyword::NoKeyword
                }),
                Token::Period,
                Token::Word(Word {
                    value: "id".to_string(),
                    keyword: Keyword::NoKeyword
                }),
                Token::Number("1.5".to_string()),
                Token::Number("42".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn quoted_strings_with_escapes() {
        assert_eq!(
            tokens("'orders.csv' 'it''s'"),
            vec![
                Token::SingleQuotedString("orders.csv".to_string()),
                Token::SingleQuotedString("it's".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn unterminated_string_reports_offset() {
        let err = Tokenizer::new("SELECT 'oops").tokenize().unwrap_err();
        assert_eq!(err.offset, 7);
        assert!(err.message.contains("Unterminated"));
    }

    #[test]
    fn line_comments_are_skipped() {
        assert_eq!(
            tokens("SELECT -- everything\n1"),
            vec![
                Token::Word(Word {
                    value: "SELECT".to_string(),
                    keyword: Keyword::Select
                }),
                Token::Number("1".to_string()),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn minus_is_not_a_comment() {
        assert_eq!(
            tokens("1 - 2"),
            vec![
                Token::Number("1".to_string()),
                Token::Minus,
                Token::Number("2".to_string()),
                Token::Eof,
            ]
        );
    }
}
