// Pipeline stages and the per-stage document types
//
// Each stage consumes one document variant and produces the next one, so the
// state machine is the enum itself: `PaperDocument::next_stage` names the stage
// that is allowed to run on a document.

use crate::domain::job::{JobId, PaperRequest};
use crate::domain::paper::{
    Chapter, ChapterKind, DocumentRef, PageReport, PaperResult, QualityReport, WrittenText,
};
use serde::{Deserialize, Serialize};

/// Stages of the fixed paper pipeline, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Preparing,
    Planning,
    Researching,
    WritingIntro,
    WritingChapters,
    WritingConclusion,
    WritingBibliography,
    QualityCheck,
    PageCount,
    RenderingDocument,
    Done,
}

impl PipelineStage {
    pub const ORDER: [PipelineStage; 11] = [
        PipelineStage::Preparing,
        PipelineStage::Planning,
        PipelineStage::Researching,
        PipelineStage::WritingIntro,
        PipelineStage::WritingChapters,
        PipelineStage::WritingConclusion,
        PipelineStage::WritingBibliography,
        PipelineStage::QualityCheck,
        PipelineStage::PageCount,
        PipelineStage::RenderingDocument,
        PipelineStage::Done,
    ];

    /// Number of working stages (everything before `Done`)
    pub const WORKING_STAGES: u32 = 10;

    pub fn index(self) -> u32 {
        Self::ORDER
            .iter()
            .position(|stage| *stage == self)
            .unwrap_or(0) as u32
    }

    /// Human-readable label stored as the job's `current_step`
    pub fn label(self) -> &'static str {
        match self {
            PipelineStage::Preparing => "Extracting topic",
            PipelineStage::Planning => "Planning structure",
            PipelineStage::Researching => "Researching sections",
            PipelineStage::WritingIntro => "Writing introduction",
            PipelineStage::WritingChapters => "Writing chapters",
            PipelineStage::WritingConclusion => "Writing conclusion",
            PipelineStage::WritingBibliography => "Compiling bibliography",
            PipelineStage::QualityCheck => "Checking quality",
            PipelineStage::PageCount => "Counting pages",
            PipelineStage::RenderingDocument => "Rendering document",
            PipelineStage::Done => "Done",
        }
    }

    /// Progress reported when the stage starts (`index / working stages`)
    pub fn progress_floor(self) -> u8 {
        (self.index().min(Self::WORKING_STAGES) * 100 / Self::WORKING_STAGES) as u8
    }

    /// Progress reported when the stage finishes
    pub fn progress_ceiling(self) -> u8 {
        ((self.index() + 1).min(Self::WORKING_STAGES) * 100 / Self::WORKING_STAGES) as u8
    }

    /// Interpolate inside the stage for `done` of `total` units of work
    pub fn progress_within(self, done: usize, total: usize) -> u8 {
        let floor = self.progress_floor() as usize;
        let span = (self.progress_ceiling() - self.progress_floor()) as usize;
        if total == 0 {
            return self.progress_floor();
        }
        (floor + span * done.min(total) / total) as u8
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Topic extraction output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopicBrief {
    pub title: String,
    pub topic: String,
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Planned chapter before research
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterPlan {
    pub kind: ChapterKind,
    pub title: String,
    pub sections: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperPlan {
    pub chapters: Vec<ChapterPlan>,
}

/// Input to the pipeline
#[derive(Debug, Clone)]
pub struct Requested {
    pub job_id: JobId,
    pub request: PaperRequest,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreparedInput {
    pub job_id: JobId,
    pub request: PaperRequest,
    pub brief: TopicBrief,
    pub target_pages: u32,
}

#[derive(Debug, Clone)]
pub struct Planned {
    pub prepared: PreparedInput,
    pub plan: PaperPlan,
}

/// Chapters with research notes attached to every section
#[derive(Debug, Clone)]
pub struct Researched {
    pub prepared: PreparedInput,
    pub chapters: Vec<Chapter>,
}

#[derive(Debug, Clone)]
pub struct Introduced {
    pub researched: Researched,
    pub introduction: WrittenText,
}

#[derive(Debug, Clone)]
pub struct ChaptersWritten {
    pub prepared: PreparedInput,
    pub introduction: WrittenText,
    pub chapters: Vec<Chapter>,
}

#[derive(Debug, Clone)]
pub struct Concluded {
    pub written: ChaptersWritten,
    pub conclusion: WrittenText,
}

/// Complete text of the paper
#[derive(Debug, Clone, Serialize)]
pub struct Drafted {
    pub prepared: PreparedInput,
    pub introduction: WrittenText,
    pub chapters: Vec<Chapter>,
    pub conclusion: WrittenText,
    pub bibliography: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Evaluated {
    pub drafted: Drafted,
    pub quality_report: QualityReport,
}

#[derive(Debug, Clone)]
pub struct Measured {
    pub evaluated: Evaluated,
    pub page_report: PageReport,
}

#[derive(Debug, Clone)]
pub struct Rendered {
    pub measured: Measured,
    pub document: DocumentRef,
}

impl Rendered {
    pub fn into_result(self) -> PaperResult {
        let Measured {
            evaluated,
            page_report,
        } = self.measured;
        let Evaluated {
            drafted,
            quality_report,
        } = evaluated;

        PaperResult {
            title: drafted.prepared.brief.title,
            introduction: drafted.introduction,
            chapters: drafted.chapters,
            conclusion: drafted.conclusion,
            bibliography: drafted.bibliography,
            document: self.document,
            quality_report,
            page_report,
        }
    }
}

/// The accumulated job document, one variant per pipeline state
#[derive(Debug, Clone)]
pub enum PaperDocument {
    Requested(Requested),
    Prepared(PreparedInput),
    Planned(Planned),
    Researched(Researched),
    Introduced(Introduced),
    ChaptersWritten(ChaptersWritten),
    Concluded(Concluded),
    Drafted(Drafted),
    Evaluated(Evaluated),
    Measured(Measured),
    Rendered(Rendered),
}

impl PaperDocument {
    /// The stage that consumes this document
    pub fn next_stage(&self) -> PipelineStage {
        match self {
            PaperDocument::Requested(_) => PipelineStage::Preparing,
            PaperDocument::Prepared(_) => PipelineStage::Planning,
            PaperDocument::Planned(_) => PipelineStage::Researching,
            PaperDocument::Researched(_) => PipelineStage::WritingIntro,
            PaperDocument::Introduced(_) => PipelineStage::WritingChapters,
            PaperDocument::ChaptersWritten(_) => PipelineStage::WritingConclusion,
            PaperDocument::Concluded(_) => PipelineStage::WritingBibliography,
            PaperDocument::Drafted(_) => PipelineStage::QualityCheck,
            PaperDocument::Evaluated(_) => PipelineStage::PageCount,
            PaperDocument::Measured(_) => PipelineStage::RenderingDocument,
            PaperDocument::Rendered(_) => PipelineStage::Done,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_floors_are_increasing() {
        let floors: Vec<u8> = PipelineStage::ORDER
            .iter()
            .map(|s| s.progress_floor())
            .collect();
        assert_eq!(floors.first(), Some(&0));
        assert_eq!(floors.last(), Some(&100));
        assert!(floors.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_progress_within_stage() {
        let stage = PipelineStage::WritingChapters;
        assert_eq!(stage.progress_within(0, 9), 40);
        assert_eq!(stage.progress_within(9, 9), 50);
        assert!(stage.progress_within(4, 9) > 40);
        assert_eq!(stage.progress_within(0, 0), 40);
    }

    #[test]
    fn test_requested_document_starts_at_preparing() {
        let doc = PaperDocument::Requested(Requested {
            job_id: "job".to_string(),
            request: PaperRequest::new("Topic", "english"),
        });
        assert_eq!(doc.next_stage(), PipelineStage::Preparing);
    }
}
