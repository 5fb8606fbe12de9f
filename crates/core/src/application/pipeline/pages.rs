// Page estimate for the page count stage

use crate::application::constants::{PAGE_TOLERANCE, WORDS_PER_PAGE};
use crate::domain::paper::PageReport;
use crate::domain::pipeline::Drafted;

fn words(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Words in the body of the paper (introduction, sections, conclusion, bibliography)
pub fn count_words(draft: &Drafted) -> usize {
    let sections: usize = draft
        .chapters
        .iter()
        .flat_map(|chapter| chapter.sections.iter())
        .map(|section| words(&section.content))
        .sum();
    let bibliography: usize = draft.bibliography.iter().map(|entry| words(entry)).sum();

    words(&draft.introduction.content) + sections + words(&draft.conclusion.content) + bibliography
}

/// Estimate formatted pages and compare against the requested target
pub fn measure(draft: &Drafted) -> PageReport {
    let word_count = count_words(draft);
    let estimated_pages = word_count as f64 / WORDS_PER_PAGE as f64;
    let target_pages = draft.prepared.target_pages;
    let deviation = (estimated_pages - target_pages as f64).abs();

    PageReport {
        word_count,
        estimated_pages: (estimated_pages * 10.0).round() / 10.0,
        target_pages,
        within_tolerance: deviation <= target_pages as f64 * PAGE_TOLERANCE,
    }
}
