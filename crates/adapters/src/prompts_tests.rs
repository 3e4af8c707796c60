// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn embedded_set_covers_every_prompt_name() {
    let book_id = BookId::parse("b1").unwrap();
    let prompts = EmbeddedPrompts.resolve_all(&book_id).await;
    for name in PROMPT_NAMES {
        let resolved = prompts.get(name).unwrap_or_else(|| panic!("missing {name}"));
        assert!(!resolved.text.is_empty());
        assert_eq!(resolved.cid, "embedded");
    }
    assert_eq!(prompts.len(), PROMPT_NAMES.len());
}
