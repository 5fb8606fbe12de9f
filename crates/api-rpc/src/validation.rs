//! Submission validation
//!
//! Runs before a job exists; a rejected request never reaches the queue.

use crate::types::SubmitRequest;
use coursework_core::domain::PaperRequest;
use coursework_core::error::{AppError, Result};

pub const MAX_TOPIC_CHARS: usize = 500;
pub const MIN_PAGE_COUNT: u32 = 5;
pub const MAX_PAGE_COUNT: u32 = 100;
pub const SUPPORTED_LANGUAGES: [&str; 5] = ["english", "russian", "ukrainian", "kazakh", "uzbek"];

pub fn validate_submit(request: SubmitRequest) -> Result<PaperRequest> {
    let topic = request.topic.trim();
    if topic.is_empty() {
        return Err(AppError::Validation("topic must not be empty".to_string()));
    }
    if topic.chars().count() > MAX_TOPIC_CHARS {
        return Err(AppError::Validation(format!(
            "topic must be at most {} characters",
            MAX_TOPIC_CHARS
        )));
    }

    let language = request.language.trim().to_lowercase();
    if !SUPPORTED_LANGUAGES.contains(&language.as_str()) {
        return Err(AppError::Validation(format!(
            "unsupported language '{}' (expected one of: {})",
            request.language,
            SUPPORTED_LANGUAGES.join(", ")
        )));
    }

    if let Some(pages) = request.page_count {
        if !(MIN_PAGE_COUNT..=MAX_PAGE_COUNT).contains(&pages) {
            return Err(AppError::Validation(format!(
                "page_count must be between {} and {}",
                MIN_PAGE_COUNT, MAX_PAGE_COUNT
            )));
        }
    }

    let webhook_url = match request.webhook_url {
        Some(url) => Some(validate_webhook_url(url.trim())?),
        None => None,
    };

    Ok(PaperRequest {
        topic: topic.to_string(),
        language,
        page_count: request.page_count,
        metadata: request.metadata.unwrap_or_default(),
        webhook_url,
    })
}

fn validate_webhook_url(url: &str) -> Result<String> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| AppError::Validation("webhook_url must be an http(s) URL".to_string()))?;

    let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
    if host.is_empty() || url.chars().any(char::is_whitespace) {
        return Err(AppError::Validation(format!(
            "webhook_url is not a valid URL: {}",
            url
        )));
    }
    Ok(url.to_string())
}
