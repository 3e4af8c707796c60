// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Page-image source contract and a fake

use async_trait::async_trait;
use bindery_core::BookId;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors from image loading
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("no image for page {page} of {book_id}")]
    Missing { book_id: String, page: u32 },
    #[error("image source failed: {0}")]
    Io(String),
}

/// Supplies raw page images for OCR units.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn page_image(&self, book_id: &BookId, page: u32) -> Result<Vec<u8>, ImageError>;
}

/// Fake image source backed by a map; pages default to a small stub image.
#[derive(Clone, Default)]
pub struct FakeImageSource {
    images: Arc<Mutex<HashMap<(String, u32), Vec<u8>>>>,
}

impl FakeImageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, book_id: &BookId, page: u32, bytes: Vec<u8>) {
        self.images
            .lock()
            .insert((book_id.as_str().to_string(), page), bytes);
    }
}

#[async_trait]
impl ImageSource for FakeImageSource {
    async fn page_image(&self, book_id: &BookId, page: u32) -> Result<Vec<u8>, ImageError> {
        Ok(self
            .images
            .lock()
            .get(&(book_id.as_str().to_string(), page))
            .cloned()
            .unwrap_or_else(|| vec![0u8; 4]))
    }
}
