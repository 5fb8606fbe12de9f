// Paper content tree produced by the pipeline

use serde::{Deserialize, Serialize};

/// The three chapters every paper has, in document order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChapterKind {
    Theory,
    Analysis,
    Improvement,
}

impl ChapterKind {
    pub const ALL: [ChapterKind; 3] = [
        ChapterKind::Theory,
        ChapterKind::Analysis,
        ChapterKind::Improvement,
    ];

    /// Roman chapter number used in headings and progress labels
    pub fn numeral(self) -> &'static str {
        match self {
            ChapterKind::Theory => "I",
            ChapterKind::Analysis => "II",
            ChapterKind::Improvement => "III",
        }
    }
}

impl std::fmt::Display for ChapterKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChapterKind::Theory => write!(f, "theory"),
            ChapterKind::Analysis => write!(f, "analysis"),
            ChapterKind::Improvement => write!(f, "improvement"),
        }
    }
}

/// Outcome of the quality loop for one unit of text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub passed: bool,
    pub score: f64,
    pub details: String,
    pub attempts: u32,
}

/// Introduction or conclusion text with its evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WrittenText {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<Evaluation>,
}

/// One subsection of a chapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub researched_data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<Evaluation>,
}

impl Section {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: String::new(),
            researched_data: String::new(),
            evaluation: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub kind: ChapterKind,
    pub chapter_title: String,
    pub sections: Vec<Section>,
}

/// Whole-paper review produced during the quality check stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub overall_score: f64,
    pub passed: bool,
    #[serde(default)]
    pub issues: Vec<String>,
    /// Units that were accepted below the threshold after exhausting attempts
    #[serde(default)]
    pub units_below_threshold: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageReport {
    pub word_count: usize,
    pub estimated_pages: f64,
    pub target_pages: u32,
    pub within_tolerance: bool,
}

/// Reference to the rendered document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub path: String,
    pub format: String,
}

/// Structured output stored on completed jobs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperResult {
    pub title: String,
    pub introduction: WrittenText,
    pub chapters: Vec<Chapter>,
    pub conclusion: WrittenText,
    pub bibliography: Vec<String>,
    pub document: DocumentRef,
    pub quality_report: QualityReport,
    pub page_report: PageReport,
}

#[cfg(test)]
impl PaperResult {
    pub fn sample() -> Self {
        Self {
            title: "Sample".to_string(),
            introduction: WrittenText {
                content: "Intro".to_string(),
                evaluation: None,
            },
            chapters: Vec::new(),
            conclusion: WrittenText {
                content: "Conclusion".to_string(),
                evaluation: None,
            },
            bibliography: Vec::new(),
            document: DocumentRef {
                path: "/tmp/sample.md".to_string(),
                format: "markdown".to_string(),
            },
            quality_report: QualityReport {
                overall_score: 1.0,
                passed: true,
                issues: Vec::new(),
                units_below_threshold: Vec::new(),
            },
            page_report: PageReport {
                word_count: 0,
                estimated_pages: 0.0,
                target_pages: 25,
                within_tolerance: false,
            },
        }
    }
}
