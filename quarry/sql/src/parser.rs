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

//! Hand-written recursive-descent SQL parser

use quarry_common::{
    infer_type_from_string, parse_string_as, ParseError, Value,
};
use quarry_expr::{AggregateFunc, JoinKind, Operator};

use crate::ast::{
    ColumnRef, Expr, JoinClause, OrderByExpr, Query, SelectItem, SourceName, TableRef,
};
use crate::tokenizer::{parse_error, Keyword, Token, TokenWithOffset, Tokenizer, Word};

// binding powers for the precedence climbing loop
const OR_PREC: u8 = 5;
const AND_PREC: u8 = 10;
const NOT_PREC: u8 = 15;
const IS_PREC: u8 = 17;
const CMP_PREC: u8 = 20;
const PLUS_MINUS_PREC: u8 = 30;
const MUL_DIV_PREC: u8 = 40;

/// Recursive-descent parser over the token stream produced by
/// [`Tokenizer`]
pub struct Parser<'a> {
    sql: &'a str,
    tokens: Vec<TokenWithOffset>,
    index: usize,
}

impl<'a> Parser<'a> {
    pub fn new(sql: &'a str) -> Result<Self, ParseError> {
        let tokens = Tokenizer::new(sql).tokenize()?;
        Ok(Parser {
            sql,
            tokens,
            index: 0,
        })
    }

    /// Parse a single SELECT query, requiring the input to be fully
    /// consumed (one optional trailing `;` is allowed)
    pub fn parse_query(sql: &'a str) -> Result<Query, ParseError> {
        let mut parser = Parser::new(sql)?;
        let query = parser.parse_select()?;
        parser.consume_token(&Token::SemiColon);
        let trailing = parser.peek_token().clone();
        if trailing.token != Token::Eof {
            return parser.expected("end of statement", &trailing);
        }
        Ok(query)
    }

    fn peek_token(&self) -> &TokenWithOffset {
        &self.tokens[self.index.min(self.tokens.len() - 1)]
    }

    fn next_token(&mut self) -> TokenWithOffset {
        let token = self.peek_token().clone();
        if self.index < self.tokens.len() - 1 {
            self.index += 1;
        }
        token
    }

    fn consume_token(&mut self, expected: &Token) -> bool {
        if &self.peek_token().token == expected {
            self.next_token();
            true
        } else {
            false
        }
    }

    fn parse_keyword(&mut self, keyword: Keyword) -> bool {
        match &self.peek_token().token {
            Token::Word(w) if w.keyword == keyword => {
                self.next_token();
                true
            }
            _ => false,
        }
    }

    fn parse_keywords(&mut self, keywords: &[Keyword]) -> bool {
        let start = self.index;
        for &keyword in keywords {
            if !self.parse_keyword(keyword) {
                self.index = start;
                return false;
            }
        }
        true
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Result<(), ParseError> {
        if self.parse_keyword(keyword) {
            Ok(())
        } else {
            let found = self.peek_token().clone();
            self.expected(&format!("{keyword:?}").to_ascii_uppercase(), &found)
        }
    }

    /// Report an unexpected token
    fn expected<T>(
        &self,
        expected: &str,
        found: &TokenWithOffset,
    ) -> Result<T, ParseError> {
        Err(parse_error(
            format!("Expected {expected}, found: {}", found.token),
            found.offset,
            self.sql,
        ))
    }

    fn parse_select(&mut self) -> Result<Query, ParseError> {
        self.expect_keyword(Keyword::Select)?;
        let projection = self.parse_projection()?;
        self.expect_keyword(Keyword::From)?;

        let mut from = vec![self.parse_table_ref()?];
        while self.consume_token(&Token::Comma) {
            from.push(self.parse_table_ref()?);
        }

        let mut joins = vec![];
        loop {
            // CROSS JOIN carries no ON condition and reads as another
            // comma source
            if self.parse_keywords(&[Keyword::Cross, Keyword::Join]) {
                from.push(self.parse_table_ref()?);
                continue;
            }
            let Some(kind) = self.parse_join_kind()? else {
                break;
            };
            let table = self.parse_table_ref()?;
            self.expect_keyword(Keyword::On)?;
            let on = self.parse_expr()?;
            joins.push(JoinClause { kind, table, on });
        }

        let selection = if self.parse_keyword(Keyword::Where) {
            Some(self.parse_expr()?)
        } else {
            None
        };

        let group_by = if self.parse_keywords(&[Keyword::Group, Keyword::By]) {
            self.parse_column_ref_list()?
        } else {
            vec![]
        };

        let order_by = if self.parse_keywords(&[Keyword::Order, Keyword::By]) {
            self.parse_order_by()?
        } else {
            vec![]
        };

        let limit = if self.parse_keyword(Keyword::Limit) {
            Some(self.parse_limit()?)
        } else {
            None
        };

        Ok(Query {
            projection,
            from,
            joins,
            selection,
            group_by,
            order_by,
            limit,
        })
    }

    fn parse_projection(&mut self) -> Result<Vec<SelectItem>, ParseError> {
        if self.consume_token(&Token::Mul) {
            return Ok(vec![SelectItem::Wildcard]);
        }
        let mut items = vec![];
        loop {
            let expr = self.parse_expr()?;
            let alias = if self.parse_keyword(Keyword::As) {
                Some(self.parse_identifier()?)
            } else {
                None
            };
            items.push(SelectItem::Expr { expr, alias });
            if !self.consume_token(&Token::Comma) {
                return Ok(items);
            }
        }
    }

    fn parse_table_ref(&mut self) -> Result<TableRef, ParseError> {
        let token = self.next_token();
        let source = match &token.token {
            Token::SingleQuotedString(path) => SourceName::Path(path.clone()),
            Token::Word(w) if w.keyword == Keyword::NoKeyword => {
                SourceName::Named(w.value.clone())
            }
            _ => return self.expected("table name or quoted path", &token),
        };
        // an alias, either `AS x` or a bare identifier
        let alias = if self.parse_keyword(Keyword::As) {
            Some(self.parse_identifier()?)
        } else {
            match &self.peek_token().token {
                Token::Word(w) if w.keyword == Keyword::NoKeyword => {
                    let alias = w.value.clone();
                    self.next_token();
                    Some(alias)
                }
                _ => None,
            }
        };
        Ok(TableRef { source, alias })
    }

    fn parse_join_kind(&mut self) -> Result<Option<JoinKind>, ParseError> {
        let kind = if self.parse_keyword(Keyword::Inner) {
            JoinKind::Inner
        } else if self.parse_keyword(Keyword::Left) {
            JoinKind::Left
        } else if self.parse_keyword(Keyword::Right) {
            JoinKind::Right
        } else if self.parse_keyword(Keyword::Full) {
            JoinKind::Full
        } else if self.parse_keyword(Keyword::Join) {
            // bare JOIN reads as INNER JOIN
            return Ok(Some(JoinKind::Inner));
        } else {
            return Ok(None);
        };
        // LEFT/RIGHT/FULL allow an OUTER noise word
        self.parse_keyword(Keyword::Outer);
        self.expect_keyword(Keyword::Join)?;
        Ok(Some(kind))
    }

    fn parse_identifier(&mut self) -> Result<String, ParseError> {
        let token = self.next_token();
        match &token.token {
            Token::Word(w) if w.keyword == Keyword::NoKeyword => Ok(w.value.clone()),
            _ => self.expected("identifier", &token),
        }
    }

    fn parse_column_ref(&mut self) -> Result<ColumnRef, ParseError> {
        let first = self.parse_identifier()?;
        if self.consume_token(&Token::Period) {
            let name = self.parse_identifier()?;
            Ok(ColumnRef {
                qualifier: Some(first),
                name,
            })
        } else {
            Ok(ColumnRef {
                qualifier: None,
                name: first,
            })
        }
    }

    fn parse_column_ref_list(&mut self) -> Result<Vec<ColumnRef>, ParseError> {
        let mut refs = vec![self.parse_column_ref()?];
        while self.consume_token(&Token::Comma) {
            refs.push(self.parse_column_ref()?);
        }
        Ok(refs)
    }

    fn parse_order_by(&mut self) -> Result<Vec<OrderByExpr>, ParseError> {
        let mut keys = vec![];
        loop {
            let column = self.parse_column_ref()?;
            let ascending = if self.parse_keyword(Keyword::Asc) {
                true
            } else if self.parse_keyword(Keyword::Desc) {
                false
            } else {
                true
            };
            keys.push(OrderByExpr { column, ascending });
            if !self.consume_token(&Token::Comma) {
                return Ok(keys);
            }
        }
    }

    fn parse_limit(&mut self) -> Result<usize, ParseError> {
        let token = self.next_token();
        match &token.token {
            Token::Number(n) => n
                .parse::<usize>()
                .map_err(|_| {
                    parse_error(
                        format!("LIMIT expects a non-negative integer, found: {n}"),
                        token.offset,
                        self.sql,
                    )
                }),
            _ => self.expected("a non-negative integer after LIMIT", &token),
        }
    }

    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_subexpr(0)
    }

    fn parse_subexpr(&mut self, precedence: u8) -> Result<Expr, ParseError> {
        let mut expr = self.parse_prefix()?;
        loop {
            let next_precedence = self.next_precedence();
            if next_precedence <= precedence {
                return Ok(expr);
            }
            expr = self.parse_infix(expr, next_precedence)?;
        }
    }

    fn next_precedence(&self) -> u8 {
        match &self.peek_token().token {
            Token::Word(w) => match w.keyword {
                Keyword::Or => OR_PREC,
                Keyword::And => AND_PREC,
                Keyword::Is => IS_PREC,
                _ => 0,
            },
            Token::Eq
            | Token::Neq
            | Token::Lt
            | Token::LtEq
            | Token::Gt
            | Token::GtEq => CMP_PREC,
            Token::Plus | Token::Minus => PLUS_MINUS_PREC,
            Token::Mul | Token::Div => MUL_DIV_PREC,
            _ => 0,
        }
    }

    fn parse_infix(&mut self, left: Expr, precedence: u8) -> Result<Expr, ParseError> {
        let token = self.next_token();
        let op = match &token.token {
            Token::Word(w) => match w.keyword {
                Keyword::And => Operator::And,
                Keyword::Or => Operator::Or,
                Keyword::Is => {
                    let negated = self.parse_keyword(Keyword::Not);
                    self.expect_keyword(Keyword::Null)?;
                    return Ok(Expr::IsNull {
                        expr: Box::new(left),
                        negated,
                    });
                }
                _ => return self.expected("an operator", &token),
            },
            Token::Eq => Operator::Eq,
            Token::Neq => Operator::NotEq,
            Token::Lt => Operator::Lt,
            Token::LtEq => Operator::LtEq,
            Token::Gt => Operator::Gt,
            Token::GtEq => Operator::GtEq,
            Token::Plus => Operator::Plus,
            Token::Minus => Operator::Minus,
            Token::Mul => Operator::Multiply,
            Token::Div => Operator::Divide,
            _ => return self.expected("an operator", &token),
        };
        let right = self.parse_subexpr(precedence)?;
        Ok(Expr::BinaryOp {
            left: Box::new(left),
            op,
            right: Box::new(right),
        })
    }

    fn parse_prefix(&mut self) -> Result<Expr, ParseError> {
        let token = self.next_token();
        match &token.token {
            Token::Word(w) => self.parse_word_prefix(w.clone(), &token),
            Token::Number(n) => Ok(Expr::Literal(number_literal(n))),
            Token::SingleQuotedString(s) => Ok(Expr::Literal(Value::Utf8(s.clone()))),
            Token::Minus => {
                let operand = self.parse_subexpr(PLUS_MINUS_PREC)?;
                match operand {
                    Expr::Literal(Value::Integer(i)) => {
                        Ok(Expr::Literal(Value::Integer(-i)))
                    }
                    Expr::Literal(Value::Float(v)) => Ok(Expr::Literal(Value::Float(-v))),
                    Expr::Literal(Value::Decimal(d)) => {
                        Ok(Expr::Literal(Value::Decimal(-d)))
                    }
                    other => Ok(Expr::BinaryOp {
                        left: Box::new(Expr::Literal(Value::Integer(0))),
                        op: Operator::Minus,
                        right: Box::new(other),
                    }),
                }
            }
            Token::LParen => {
                let expr = self.parse_expr()?;
                if !self.consume_token(&Token::RParen) {
                    let found = self.peek_token().clone();
                    return self.expected("')'", &found);
                }
                Ok(expr)
            }
            _ => self.expected("an expression", &token),
        }
    }

    fn parse_word_prefix(
        &mut self,
        word: Word,
        token: &TokenWithOffset,
    ) -> Result<Expr, ParseError> {
        match word.keyword {
            Keyword::True => Ok(Expr::Literal(Value::Boolean(true))),
            Keyword::False => Ok(Expr::Literal(Value::Boolean(false))),
            Keyword::Null => Ok(Expr::Literal(Value::Null)),
            Keyword::Not => {
                let operand = self.parse_subexpr(NOT_PREC)?;
                Ok(Expr::Not(Box::new(operand)))
            }
            Keyword::Count
            | Keyword::Sum
            | Keyword::Avg
            | Keyword::Min
            | Keyword::Max => {
                let func = match word.keyword {
                    Keyword::Count => AggregateFunc::Count,
                    Keyword::Sum => AggregateFunc::Sum,
                    Keyword::Avg => AggregateFunc::Avg,
                    Keyword::Min => AggregateFunc::Min,
                    _ => AggregateFunc::Max,
                };
                if !self.consume_token(&Token::LParen) {
                    let found = self.peek_token().clone();
                    return self.expected("'(' after aggregate function", &found);
                }
                let column = if func == AggregateFunc::Count
                    && self.consume_token(&Token::Mul)
                {
                    None
                } else {
                    Some(self.parse_column_ref()?)
                };
                if !self.consume_token(&Token::RParen) {
                    let found = self.peek_token().clone();
                    return self.expected("')'", &found);
                }
                Ok(Expr::Aggregate { func, column })
            }
            Keyword::NoKeyword => {
                if self.consume_token(&Token::Period) {
                    let name = self.parse_identifier()?;
                    Ok(Expr::Identifier(ColumnRef {
                        qualifier: Some(word.value),
                        name,
                    }))
                } else {
                    Ok(Expr::Identifier(ColumnRef {
                        qualifier: None,
                        name: word.value,
                    }))
                }
            }
            _ => self.expected("an expression", token),
        }
    }
}

/// Convert an unsigned numeric literal to a typed value using the same
/// float/decimal split the type inference applies to data cells
fn number_literal(text: &str) -> Value {
    match infer_type_from_string(text) {
        ty if ty.is_numeric() => {
            parse_string_as(text, &ty).unwrap_or_else(|| Value::Utf8(text.to_string()))
        }
        _ => Value::Utf8(text.to_string()),
    }
}

/// Pre-pass over the token stream collecting single-quoted FROM/JOIN
/// source paths, in query order, before any planning happens
pub fn extract_source_paths(sql: &str) -> Result<Vec<String>, ParseError> {
    let tokens = Tokenizer::new(sql).tokenize()?;
    let mut paths = vec![];
    let mut expecting_source = false;
    let mut in_source_list = false;

    for t in &tokens {
        match &t.token {
            Token::Word(w) if w.keyword == Keyword::From => {
                expecting_source = true;
                in_source_list = true;
            }
            Token::Word(w) if w.keyword == Keyword::Join => {
                expecting_source = true;
                in_source_list = false;
            }
            Token::SingleQuotedString(path) if expecting_source => {
                paths.push(path.clone());
                expecting_source = false;
            }
            Token::Word(w)
                if expecting_source && w.keyword == Keyword::NoKeyword =>
            {
                // a named table; no path to collect
                expecting_source = false;
            }
            Token::Comma if in_source_list => {
                expecting_source = true;
            }
            Token::Word(w)
                if in_source_list
                    && !matches!(w.keyword, Keyword::NoKeyword | Keyword::As) =>
            {
                // any clause keyword ends the source list
                in_source_list = false;
            }
            _ => {}
        }
    }
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expect_parse_ok(sql: &str) -> Query {
        match Parser::parse_query(sql) {
            Ok(q) => q,
            Err(e) => panic!("expected '{sql}' to parse, got: {e}"),
        }
    }

    /// Parses sql and asserts that the expected error message was found
    fn expect_parse_error(sql: &str, expected_error: &str) {
        match Parser::parse_query(sql) {
            Ok(q) => panic!("expected parse error for '{sql}', got: {q:?}"),
            Err(e) => {
                let message = e.to_string();
                assert!(
                    message.contains(expected_error),
                    "expected error '{expected_error}' not found in '{message}'"
                );
            }
        }
    }

    #[test]
    fn select_star() {
        let q = expect_parse_ok("SELECT * FROM 'data.csv'");
        assert_eq!(q.projection, vec![SelectItem::Wildcard]);
        assert_eq!(
            q.from,
            vec![TableRef {
                source: SourceName::Path("data.csv".to_string()),
                alias: None,
            }]
        );
    }

    #[test]
    fn filter_and_order() {
        let q = expect_parse_ok(
            "SELECT name FROM 'e.csv' WHERE age >= 25 ORDER BY name",
        );
        let selection = q.selection.unwrap();
        assert_eq!(selection.to_string(), "age >= 25");
        assert_eq!(q.order_by.len(), 1);
        assert!(q.order_by[0].ascending);
    }

    #[test]
    fn aliases_and_joins() {
        let q = expect_parse_ok(
            "SELECT u.name, o.amt FROM 'u.csv' u \
             LEFT JOIN 'o.csv' o ON u.id = o.uid \
             ORDER BY u.name, o.amt",
        );
        assert_eq!(q.from[0].alias.as_deref(), Some("u"));
        assert_eq!(q.joins.len(), 1);
        assert_eq!(q.joins[0].kind, JoinKind::Left);
        assert_eq!(q.joins[0].on.to_string(), "u.id = o.uid");
    }

    #[test]
    fn group_by_and_aggregates() {
        let q = expect_parse_ok(
            "SELECT k, AVG(v) FROM 's.csv' GROUP BY k ORDER BY k",
        );
        assert_eq!(q.group_by.len(), 1);
        let SelectItem::Expr { expr, .. } = &q.projection[1] else {
            panic!("expected expression item");
        };
        assert_eq!(expr.to_string(), "AVG(v)");
    }

    #[test]
    fn count_star_and_count_column() {
        let q = expect_parse_ok("SELECT COUNT(*), COUNT(id) FROM t");
        let items: Vec<String> = q
            .projection
            .iter()
            .map(|i| match i {
                SelectItem::Expr { expr, .. } => expr.to_string(),
                SelectItem::Wildcard => "*".to_string(),
            })
            .collect();
        assert_eq!(items, vec!["COUNT(*)", "COUNT(id)"]);
    }

    #[test]
    fn operator_precedence() {
        let q = expect_parse_ok("SELECT a FROM t WHERE a > 1 AND b < 2 OR c = 3");
        assert_eq!(
            q.selection.unwrap().to_string(),
            "a > 1 AND b < 2 OR c = 3"
        );

        let q = expect_parse_ok("SELECT a FROM t WHERE a + 1 * 2 > 3");
        assert_eq!(q.selection.unwrap().to_string(), "a + 1 * 2 > 3");
    }

    #[test]
    fn not_and_is_null() {
        let q = expect_parse_ok(
            "SELECT a FROM t WHERE NOT a IS NULL AND b IS NOT NULL",
        );
        assert_eq!(
            q.selection.unwrap().to_string(),
            "NOT a IS NULL AND b IS NOT NULL"
        );
    }

    #[test]
    fn numeric_literal_types() {
        let q = expect_parse_ok("SELECT a FROM t WHERE a > 25 AND b < 1.5 AND c = -3");
        let text = q.selection.unwrap().to_string();
        assert_eq!(text, "a > 25 AND b < 1.5 AND c = -3");
    }

    #[test]
    fn limit_must_be_integer() {
        let q = expect_parse_ok("SELECT * FROM t LIMIT 10");
        assert_eq!(q.limit, Some(10));
        expect_parse_error(
            "SELECT * FROM t LIMIT 1.5",
            "LIMIT expects a non-negative integer",
        );
    }

    #[test]
    fn errors_carry_position() {
        let err = Parser::parse_query("SELECT FROM t").unwrap_err();
        assert_eq!(err.offset, 7);
        assert!(err.message.contains("Expected an expression"));

        expect_parse_error("SELECT a b FROM t", "Expected FROM");
        expect_parse_error("SELECT a FROM", "Expected table name or quoted path");
        expect_parse_error(
            "SELECT a FROM t INNER 'x.csv' ON a = b",
            "Expected JOIN",
        );
    }

    #[test]
    fn extract_paths_from_sources() {
        let paths = extract_source_paths(
            "SELECT u.name, o.amt FROM 'u.csv' u, 'x.csv' \
             LEFT JOIN 'o.csv' o ON u.id = o.uid WHERE u.name != 'o.csv'",
        )
        .unwrap();
        assert_eq!(paths, vec!["u.csv", "x.csv", "o.csv"]);
    }

    #[test]
    fn extract_paths_ignores_string_literals_elsewhere() {
        let paths =
            extract_source_paths("SELECT a FROM t WHERE name = 'data.csv'").unwrap();
        assert!(paths.is_empty());
    }
}
