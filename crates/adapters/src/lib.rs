// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! bindery-adapters: contracts for the coordinator's external
//! collaborators (work-unit dispatcher, page-image source, prompt
//! resolver), plus fake implementations for deterministic tests.

mod dispatch;
mod image;
mod prompts;

pub use dispatch::{DispatchError, Dispatcher, FakeDispatcher};
pub use image::{FakeImageSource, ImageError, ImageSource};
pub use prompts::{EmbeddedPrompts, PromptResolver, ResolvedPrompt, PROMPT_NAMES};
