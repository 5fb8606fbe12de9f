// Markdown document renderer
use async_trait::async_trait;
use std::fmt::Write as _;
use std::path::PathBuf;
use tracing::info;

use coursework_core::domain::paper::{DocumentRef, WrittenText};
use coursework_core::domain::pipeline::Measured;
use coursework_core::domain::PaperMetadata;
use coursework_core::port::{AgentError, DocumentRenderer};

const FORMAT: &str = "markdown";

/// Writes `<output_dir>/<job_id>.md`
pub struct MarkdownRenderer {
    output_dir: PathBuf,
}

impl MarkdownRenderer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    fn compose(&self, paper: &Measured) -> String {
        let draft = &paper.evaluated.drafted;
        let mut out = String::new();

        title_block(&mut out, &draft.prepared.brief.title, &draft.prepared.request.metadata);

        let _ = writeln!(out, "## Contents\n");
        let _ = writeln!(out, "- Introduction");
        for chapter in &draft.chapters {
            let _ = writeln!(
                out,
                "- Chapter {}. {}",
                chapter.kind.numeral(),
                chapter.chapter_title
            );
            for section in &chapter.sections {
                let _ = writeln!(out, "  - {}", section.title);
            }
        }
        let _ = writeln!(out, "- Conclusion");
        let _ = writeln!(out, "- Bibliography\n");

        body(&mut out, "Introduction", &draft.introduction);

        for chapter in &draft.chapters {
            let _ = writeln!(
                out,
                "## Chapter {}. {}\n",
                chapter.kind.numeral(),
                chapter.chapter_title
            );
            for section in &chapter.sections {
                let _ = writeln!(out, "### {}\n\n{}\n", section.title, section.content.trim());
            }
        }

        body(&mut out, "Conclusion", &draft.conclusion);

        let _ = writeln!(out, "## Bibliography\n");
        for entry in &draft.bibliography {
            let _ = writeln!(out, "{}  ", entry.trim());
        }

        out
    }
}

fn title_block(out: &mut String, title: &str, metadata: &PaperMetadata) {
    let institution = [&metadata.university, &metadata.faculty, &metadata.department];
    for line in institution.into_iter().flatten() {
        let _ = writeln!(out, "**{}**  ", line);
    }
    if institution.iter().any(|line| line.is_some()) {
        out.push('\n');
    }

    let _ = writeln!(out, "# {}\n", title);

    let people = [
        ("Student", &metadata.student_name),
        ("Group", &metadata.group),
        ("Supervisor", &metadata.supervisor),
    ];
    for (label, value) in people {
        if let Some(value) = value {
            let _ = writeln!(out, "{}: {}  ", label, value);
        }
    }

    match (&metadata.city, metadata.year) {
        (Some(city), Some(year)) => {
            let _ = writeln!(out, "\n{}, {}", city, year);
        }
        (Some(city), None) => {
            let _ = writeln!(out, "\n{}", city);
        }
        (None, Some(year)) => {
            let _ = writeln!(out, "\n{}", year);
        }
        (None, None) => {}
    }
    out.push('\n');
}

fn body(out: &mut String, heading: &str, text: &WrittenText) {
    let _ = writeln!(out, "## {}\n\n{}\n", heading, text.content.trim());
}

#[async_trait]
impl DocumentRenderer for MarkdownRenderer {
    async fn render(&self, paper: &Measured) -> Result<DocumentRef, AgentError> {
        let job_id = &paper.evaluated.drafted.prepared.job_id;
        let path = self.output_dir.join(format!("{}.md", job_id));

        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|e| AgentError::Io(format!("{}: {}", self.output_dir.display(), e)))?;
        tokio::fs::write(&path, self.compose(paper))
            .await
            .map_err(|e| AgentError::Io(format!("{}: {}", path.display(), e)))?;

        info!(job_id = %job_id, path = %path.display(), "Document rendered");
        Ok(DocumentRef {
            path: path.display().to_string(),
            format: FORMAT.to_string(),
        })
    }
}
