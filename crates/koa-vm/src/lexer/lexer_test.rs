// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright 2026 Tobias Sarnowski

//! Tests for the lexer.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use super::{Lexer, StrSource, Token, TokenKind};

fn tokenize(text: &str) -> Vec<Token> {
    let mut lexer = Lexer::new(Box::new(StrSource::new(text)));
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token().unwrap();
        let done = token.kind == TokenKind::End;
        tokens.push(token);
        if done {
            return tokens;
        }
    }
}

fn kinds(text: &str) -> Vec<TokenKind> {
    tokenize(text).into_iter().map(|t| t.kind).collect()
}

#[test]
fn keywords_and_identifiers() {
    assert_eq!(
        kinds("int x while foo"),
        vec![
            TokenKind::Int,
            TokenKind::Identifier,
            TokenKind::While,
            TokenKind::Identifier,
            TokenKind::End,
        ]
    );
}

#[test]
fn operator_tokens() {
    assert_eq!(
        kinds("<< >> <= >= == != && || ++ -- += <<= ="),
        vec![
            TokenKind::Lshift,
            TokenKind::Rshift,
            TokenKind::LeEq,
            TokenKind::LaEq,
            TokenKind::Eq,
            TokenKind::Neq,
            TokenKind::Land,
            TokenKind::Lor,
            TokenKind::Inc,
            TokenKind::Dec,
            TokenKind::IpAdd,
            TokenKind::IpLs,
            TokenKind::Sym(b'='),
            TokenKind::End,
        ]
    );
}

#[test]
fn division_is_not_a_comment() {
    assert_eq!(
        kinds("a / b /= c"),
        vec![
            TokenKind::Identifier,
            TokenKind::Sym(b'/'),
            TokenKind::Identifier,
            TokenKind::IpDiv,
            TokenKind::Identifier,
            TokenKind::End,
        ]
    );
}

#[test]
fn comments_are_skipped() {
    assert_eq!(
        kinds("1 // comment\n 2 /* block\ncomment */ 3"),
        vec![
            TokenKind::Integer,
            TokenKind::Integer,
            TokenKind::Integer,
            TokenKind::End,
        ]
    );
}

#[test]
fn numeric_literals() {
    let tokens = tokenize("42 0x2a 7l 3.5 1e-3 2.5e4");
    assert_eq!(tokens[0].kind, TokenKind::Integer);
    assert_eq!(tokens[0].lexeme, "42");
    assert_eq!(tokens[1].kind, TokenKind::HexInt);
    assert_eq!(tokens[1].lexeme, "0x2a");
    assert_eq!(tokens[2].kind, TokenKind::LInteger);
    assert_eq!(tokens[2].lexeme, "7");
    assert_eq!(tokens[3].kind, TokenKind::Floating);
    assert_eq!(tokens[3].lexeme, "3.5");
    assert_eq!(tokens[4].kind, TokenKind::Expo);
    assert_eq!(tokens[4].lexeme, "1e-3");
    assert_eq!(tokens[5].kind, TokenKind::Expo);
}

#[test]
fn string_and_char_literals() {
    let tokens = tokenize(r#""hello\nworld" 'a' '\n'"#);
    assert_eq!(tokens[0].kind, TokenKind::String);
    assert_eq!(tokens[0].lexeme, "hello\nworld");
    assert_eq!(tokens[1].kind, TokenKind::Character);
    assert_eq!(tokens[1].lexeme, "a");
    assert_eq!(tokens[2].kind, TokenKind::Character);
    assert_eq!(tokens[2].lexeme, "\n");
}

#[test]
fn unterminated_string_is_an_error() {
    let mut lexer = Lexer::new(Box::new(StrSource::new("\"oops")));
    assert!(lexer.next_token().is_err());
}

#[test]
fn line_numbers_advance() {
    let tokens = tokenize("1\n2\n\n3");
    assert_eq!(tokens[0].line, 1);
    assert_eq!(tokens[1].line, 2);
    assert_eq!(tokens[2].line, 4);
}

#[test]
fn bom_is_skipped() {
    let text = "\u{feff}int";
    assert_eq!(kinds(text), vec![TokenKind::Int, TokenKind::End]);
}

#[test]
fn literals_true_false_null() {
    assert_eq!(
        kinds("true false null"),
        vec![
            TokenKind::True,
            TokenKind::False,
            TokenKind::Null,
            TokenKind::End,
        ]
    );
}
