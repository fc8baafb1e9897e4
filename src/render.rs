//! Terminal rendering for threads, evidence panels, and lists.
//!
//! Renderers return strings so views can be printed, diffed in tests, or
//! redrawn after every event. Colour comes from `colored` and is switched on
//! or off once per process from the `[display]` config.

use std::fmt::Write;

use colored::Colorize;
use kbdesk_core::citation::Segment;
use kbdesk_core::models::{EvidenceSource, HistoryItem};
use kbdesk_core::panel::PanelView;
use kbdesk_core::thread::{Thread, ThreadEntry};

use crate::schema::{ChunkPreview, DocumentChunk, DocumentView, PublishedDocument, SearchHit};

/// Turn ANSI styling on or off for the whole process.
pub fn init_color(enabled: bool) {
    colored::control::set_override(enabled);
}

fn color_enabled() -> bool {
    colored::control::SHOULD_COLORIZE.should_colorize()
}

/// Named styles for terminal output. Whether they emit escapes is decided
/// once by [`init_color`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Style;

impl Style {
    pub fn new() -> Self {
        Style
    }

    /// Escape-free styling for assertions on rendered text.
    #[cfg(test)]
    pub(crate) fn plain() -> Self {
        init_color(false);
        Style
    }

    pub fn bold(&self, text: &str) -> String {
        text.bold().to_string()
    }

    pub fn dim(&self, text: &str) -> String {
        text.dimmed().to_string()
    }

    pub fn warn(&self, text: &str) -> String {
        text.yellow().to_string()
    }

    pub fn error(&self, text: &str) -> String {
        text.red().to_string()
    }

    pub fn ok(&self, text: &str) -> String {
        text.green().to_string()
    }

    /// A citation marker. The active one is reversed; without colour it is
    /// wrapped in `>...<`. Unresolved markers get a trailing `?`.
    fn citation(&self, raw: &str, active: bool, resolved: bool) -> String {
        let suffix = if resolved { "" } else { "?" };
        match (color_enabled(), active) {
            (true, true) => format!("{}{suffix}", raw.cyan().reversed()),
            (true, false) => format!("{}{suffix}", raw.cyan()),
            (false, true) => format!(">{raw}<{suffix}"),
            (false, false) => format!("{raw}{suffix}"),
        }
    }
}

/// Answer text with citation markers styled.
///
/// `active_source` is the highlighted number when this entry is the active
/// version, `None` otherwise.
pub fn answer_text(entry: &ThreadEntry, active_source: Option<u32>, style: &Style) -> String {
    let mut out = String::new();
    for segment in entry.segments() {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Citation { source_no, raw } => {
                let resolved = entry.index().contains(source_no);
                let active = active_source == Some(source_no);
                out.push_str(&style.citation(raw, active, resolved));
            }
        }
    }
    out
}

fn version_header(entry: &ThreadEntry, active: bool, style: &Style) -> String {
    let version = entry.version();
    let mut header = format!("Version {}", version.version_no);
    if let Some(created_at) = version.created_at {
        let _ = write!(header, "  {}", created_at.format("%Y-%m-%d %H:%M"));
    }
    let _ = write!(header, "  (id {})", version.version_id);
    if active {
        format!("{} {}", style.bold("*"), style.bold(&header))
    } else {
        format!("  {}", style.dim(&header))
    }
}

/// Every version of the thread, the active one marked.
pub fn thread(thread: &Thread, style: &Style) -> String {
    let mut out = String::new();
    if let Some(question) = thread.question() {
        let _ = writeln!(out, "{} {}", style.bold("Q:"), question);
        out.push('\n');
    }
    let active_id = thread.active_version_id();
    for entry in thread.entries() {
        let active = Some(entry.version().version_id) == active_id;
        let highlighted = if active { thread.active_source_no() } else { None };
        let _ = writeln!(out, "{}", version_header(entry, active, style));
        let _ = writeln!(out, "{}", answer_text(entry, highlighted, style));
        let dangling = entry.dangling_citations();
        if !dangling.is_empty() {
            let list: Vec<String> = dangling.iter().map(|n| format!("S{n}")).collect();
            let _ = writeln!(
                out,
                "{}",
                style.dim(&format!("  cited but not attached: {}", list.join(", ")))
            );
        }
        out.push('\n');
    }
    out
}

pub fn empty_thread(style: &Style) -> String {
    format!(
        "{}\n{}\n\n",
        style.bold("No questions yet"),
        style.dim("Ask a question: the answer appears here and its sources in the panel below.")
    )
}

pub fn failure(message: &str, hint: &str, style: &Style) -> String {
    format!("{}\n{}\n", style.error(message), style.dim(hint))
}

fn card(source: &EvidenceSource, active: bool, style: &Style) -> String {
    let marker = if active { ">" } else { " " };
    let label = format!("S{}", source.source_no);
    let label = if active { style.bold(&label) } else { label };
    format!(
        "{marker} [{label}] {title}\n    Document #{doc} · fragment {chunk} · {link}\n    {snippet}\n",
        title = source.display_title(),
        doc = source.doc_id,
        chunk = source.chunk_id,
        link = style.dim(&source.deep_link()),
        snippet = source.snippet.trim(),
    )
}

/// The evidence panel. Each view state has its own message.
pub fn panel(view: &PanelView<'_>, style: &Style) -> String {
    let mut out = String::new();
    let count = match view {
        PanelView::Cards { cards, .. } => cards.len(),
        _ => 0,
    };
    let _ = writeln!(out, "{} ({count})", style.bold("Sources"));

    let unresolved = match view {
        PanelView::NoVersion => {
            let _ = writeln!(out, "{}", style.dim("Fragments appear here after the first answer."));
            None
        }
        PanelView::NoSources => {
            let _ = writeln!(out, "{}", style.dim("This answer has no attached fragments."));
            None
        }
        PanelView::NothingSelected { unresolved } => {
            let _ = writeln!(
                out,
                "{}",
                style.dim("Select a fragment in the answer to show it here.")
            );
            *unresolved
        }
        PanelView::Cards { cards, unresolved } => {
            let _ = writeln!(out, "{}", style.dim("Pick [S#] in the answer to highlight a fragment."));
            for c in cards {
                out.push_str(&card(c.source, c.active, style));
            }
            *unresolved
        }
    };
    if let Some(n) = unresolved {
        let _ = writeln!(
            out,
            "{}",
            style.warn(&format!("S{n} is not among this answer's sources."))
        );
    }
    out
}

pub fn history_list(items: &[HistoryItem], style: &Style) -> String {
    if items.is_empty() {
        return format!(
            "{}\n{}\n",
            style.bold("History is empty"),
            style.dim("Ask something with `kbd ask` or `kbd chat` and it will show up here.")
        );
    }
    let mut out = String::new();
    for item in items {
        let _ = writeln!(
            out,
            "{:>6}  {}  v{:<3} {}",
            item.query_id,
            style.dim(&item.created_at.format("%Y-%m-%d %H:%M").to_string()),
            item.latest_version_no,
            item.question
        );
    }
    out
}

pub fn search_hits(hits: &[SearchHit], style: &Style) -> String {
    if hits.is_empty() {
        return format!("{}\n", style.dim("No matching fragments."));
    }
    let mut out = String::new();
    for (i, hit) in hits.iter().enumerate() {
        let title = hit.title.as_deref().filter(|t| !t.trim().is_empty());
        let title = title.map_or_else(|| format!("Document {}", hit.doc_id), str::to_string);
        let _ = writeln!(
            out,
            "{:>2}. {}  {}",
            i + 1,
            style.bold(&title),
            style.dim(&format!("score {:.3}", hit.score))
        );
        let _ = writeln!(
            out,
            "    {}",
            style.dim(&format!("/doc/{}?chunk={}", hit.doc_id, hit.chunk_id))
        );
        let _ = writeln!(out, "    {}", hit.snippet.trim());
    }
    out
}

pub fn document(doc: &DocumentView, style: &Style) -> String {
    let mut out = String::new();
    let title = doc.title.as_deref().unwrap_or(&doc.original_name);
    let _ = writeln!(out, "{}", style.bold(title));
    let _ = writeln!(
        out,
        "{}",
        style.dim(&format!(
            "#{} · {} · {} · {} · {}",
            doc.doc_id,
            doc.original_name,
            doc.mime_type,
            doc.status,
            doc.created_at.format("%Y-%m-%d %H:%M")
        ))
    );
    if doc.chunks_preview.is_empty() {
        let _ = writeln!(out, "{}", style.dim("No fragments indexed."));
    }
    for chunk in &doc.chunks_preview {
        let _ = writeln!(
            out,
            "  [{}] {} {}",
            chunk.chunk_index,
            style.dim(&format!("chunk {}", chunk.chunk_id)),
            chunk.snippet.trim()
        );
    }
    out
}

/// A fragment with its neighbours in document order, the fragment itself marked.
pub fn document_chunk(chunk: &DocumentChunk, style: &Style) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}",
        style.dim(&format!("Document #{} · fragment {}", chunk.doc_id, chunk.chunk_id))
    );
    let mut before: Vec<&ChunkPreview> = chunk
        .neighbors
        .iter()
        .filter(|n| n.chunk_index < chunk.chunk_index)
        .collect();
    let mut after: Vec<&ChunkPreview> = chunk
        .neighbors
        .iter()
        .filter(|n| n.chunk_index > chunk.chunk_index)
        .collect();
    before.sort_by_key(|n| n.chunk_index);
    after.sort_by_key(|n| n.chunk_index);

    for n in before {
        let _ = writeln!(out, "  [{}] {}", n.chunk_index, style.dim(n.snippet.trim()));
    }
    let _ = writeln!(out, "> [{}] {}", chunk.chunk_index, style.bold(chunk.text.trim()));
    for n in after {
        let _ = writeln!(out, "  [{}] {}", n.chunk_index, style.dim(n.snippet.trim()));
    }
    out
}

pub fn documents(docs: &[PublishedDocument], style: &Style) -> String {
    if docs.is_empty() {
        return format!("{}\n", style.dim("No published documents."));
    }
    let mut out = String::new();
    for doc in docs {
        let _ = writeln!(
            out,
            "{:>6}  {}  {}",
            doc.id,
            style.dim(&doc.created_at.format("%Y-%m-%d").to_string()),
            doc.title.as_deref().unwrap_or("(untitled)")
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use kbdesk_core::models::{Answer, AnswerVersion};
    use kbdesk_core::panel::{self, PanelFilter};

    fn thread_with(text: &str, nos: &[u32]) -> Thread {
        let mut thread = Thread::new();
        let ticket = thread.ticket();
        let answer = Answer {
            query_id: 1,
            version: AnswerVersion {
                version_id: 10,
                version_no: 1,
                text: text.to_string(),
                sources: nos
                    .iter()
                    .map(|&n| EvidenceSource {
                        source_no: n,
                        doc_id: 3,
                        title: None,
                        chunk_id: 30 + i64::from(n),
                        snippet: format!("fragment {n}"),
                    })
                    .collect(),
                created_at: None,
            },
        };
        thread.apply_ask(ticket, "Question?", answer).unwrap();
        thread
    }

    #[test]
    fn test_answer_text_marks_active_and_unresolved() {
        let thread = thread_with("A [S1] b [S2] c [S9].", &[1, 2]);
        let entry = thread.active_entry().unwrap();
        let text = answer_text(entry, Some(1), &Style::plain());
        assert_eq!(text, "A >[S1]< b [S2] c [S9]?.");
    }

    #[test]
    fn test_thread_lists_dangling_citations() {
        let thread = thread_with("x [S4]", &[1]);
        let out = super::thread(&thread, &Style::plain());
        assert!(out.contains("Q: Question?"));
        assert!(out.contains("* Version 1"));
        assert!(out.contains("cited but not attached: S4"));
    }

    #[test]
    fn test_panel_cards() {
        let thread = thread_with("x [S1]", &[1, 2]);
        let out = panel(&panel::view_thread(&thread, PanelFilter::All), &Style::plain());
        assert!(out.contains("Sources (2)"));
        assert!(out.contains("> [S1] Document 3"));
        assert!(out.contains("/doc/3?chunk=31"));
    }

    #[test]
    fn test_panel_empty_states() {
        let empty = Thread::new();
        let out = panel(&panel::view_thread(&empty, PanelFilter::All), &Style::plain());
        assert!(out.contains("after the first answer"));

        let mut thread = thread_with("x", &[1]);
        thread.click_source(7);
        let out = panel(&panel::view_thread(&thread, PanelFilter::Selected), &Style::plain());
        assert!(out.contains("Select a fragment"));
        assert!(out.contains("S7 is not among"));
    }

    #[test]
    fn test_document_chunk_orders_neighbours() {
        let preview = |index: i64| ChunkPreview {
            chunk_id: 100 + index,
            chunk_index: index,
            snippet: format!("neighbour {index}"),
        };
        let chunk = DocumentChunk {
            doc_id: 1,
            chunk_id: 102,
            chunk_index: 2,
            text: "the cited text".into(),
            snippet: "the cited".into(),
            neighbors: vec![preview(3), preview(1)],
        };
        let out = document_chunk(&chunk, &Style::plain());
        let first = out.find("neighbour 1").unwrap();
        let cited = out.find("> [2] the cited text").unwrap();
        let last = out.find("neighbour 3").unwrap();
        assert!(first < cited && cited < last);
    }

    #[test]
    fn test_search_hits_fall_back_to_doc_id() {
        let hits = vec![SearchHit {
            doc_id: 4,
            title: None,
            chunk_id: 40,
            snippet: "match".into(),
            score: 0.5,
        }];
        let out = search_hits(&hits, &Style::plain());
        assert!(out.contains(" 1. Document 4  score 0.500"));
        assert!(out.contains("/doc/4?chunk=40"));
        assert!(search_hits(&[], &Style::plain()).contains("No matching"));
    }

    #[test]
    fn test_plain_style_has_no_escapes() {
        let thread = thread_with("x [S1]", &[1]);
        let out = super::thread(&thread, &Style::plain());
        assert!(!out.contains('\x1b'));
    }
}
