// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn book_id_accepts_alphanumeric_and_hyphen() {
    let id = BookId::parse("war-and-peace-1869").unwrap();
    assert_eq!(id.as_str(), "war-and-peace-1869");
    assert_eq!(id.to_string(), "war-and-peace-1869");
}

#[yare::parameterized(
    empty = { "" },
    space = { "a b" },
    quote = { "a\"b" },
    brace = { "a{b}" },
    underscore = { "a_b" },
    newline = { "a\nb" },
)]
fn book_id_rejects(raw: &str) {
    assert!(BookId::parse(raw).is_err());
}

#[test]
fn book_id_rejects_overlong() {
    let raw = "a".repeat(65);
    assert!(BookId::parse(raw).is_err());
    let ok = "a".repeat(64);
    assert!(BookId::parse(ok).is_ok());
}

#[test]
fn validate_id_matches_book_id_rules() {
    assert!(validate_id("abc-123").is_ok());
    assert!(validate_id("query{Book}").is_err());
}

#[test]
fn agent_id_display_and_serde() {
    let id = AgentId::new("agent-7");
    assert_eq!(id.to_string(), "agent-7");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"agent-7\"");
    let parsed: AgentId = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, id);
}

#[test]
fn short_id_truncates() {
    assert_eq!("abcdef".short(4), "abcd");
    assert_eq!("ab".short(4), "ab");
}

#[test]
fn uuid_gen_produces_unique_ids() {
    let gen = UuidIdGen;
    let a = gen.next();
    let b = gen.next();
    assert_ne!(a, b);
}

#[test]
fn sequential_gen_is_deterministic() {
    let gen = SequentialIdGen::new("unit");
    assert_eq!(gen.next(), "unit-1");
    assert_eq!(gen.next(), "unit-2");
}
