//! Selection state for one question thread.
//!
//! A [`Thread`] holds the answer versions of a single query, each paired
//! with its own [`EvidenceIndex`], plus the current focus: which version is
//! active and which source number is highlighted within it.
//!
//! # Transitions
//!
//! | Event | Versions | Active version | Active source |
//! |-------|----------|----------------|---------------|
//! | [`apply_ask`](Thread::apply_ask) | replaced by `[new]` | new | new default |
//! | [`apply_rerun`](Thread::apply_rerun) | `new` appended | new | new default |
//! | [`load_history`](Thread::load_history) | replaced by history | latest | latest default |
//! | [`select_version`](Thread::select_version) | unchanged | target | target default |
//! | [`click_citation`](Thread::click_citation) | unchanged | citing version | cited number |
//! | [`click_source`](Thread::click_source) | unchanged | unchanged | clicked number |
//!
//! The focus is stored as a single value, so every transition replaces the
//! active version and active source together. An empty thread has no focus.
//!
//! # Stale responses
//!
//! Responses arrive asynchronously. Callers take a [`Ticket`] before sending
//! a request and hand it back when applying the response. [`Thread::reset`]
//! (the view was left) moves to a new epoch, after which older tickets are
//! rejected with [`ThreadError::Stale`] and leave the thread untouched.

use thiserror::Error;

use crate::citation::{self, Segments};
use crate::evidence::EvidenceIndex;
use crate::models::{Answer, AnswerVersion, EvidenceSource, Query};

/// Proof that a response belongs to the current view epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    epoch: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ThreadError {
    #[error("response belongs to a view that has been discarded")]
    Stale,
    #[error("answer for query {got} cannot join the thread of query {expected}")]
    QueryMismatch { expected: i64, got: i64 },
    #[error("version {0} is not part of this thread")]
    UnknownVersion(i64),
}

/// What the evidence panel should highlight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection<'a> {
    /// No active version, or the active version has no default source.
    None,
    Resolved(&'a EvidenceSource),
    /// A source number that the active version does not carry.
    Unresolved(u32),
}

/// An answer version together with its evidence index.
#[derive(Debug, Clone)]
pub struct ThreadEntry {
    version: AnswerVersion,
    index: EvidenceIndex,
}

impl ThreadEntry {
    fn new(version: AnswerVersion) -> Self {
        let index = EvidenceIndex::for_version(&version);
        Self { version, index }
    }

    pub fn version(&self) -> &AnswerVersion {
        &self.version
    }

    pub fn index(&self) -> &EvidenceIndex {
        &self.index
    }

    pub fn segments(&self) -> Segments<'_> {
        citation::tokenize(&self.version.text)
    }

    /// Cited numbers that do not resolve in this version's sources.
    pub fn dangling_citations(&self) -> Vec<u32> {
        citation::cited_source_nos(&self.version.text)
            .into_iter()
            .filter(|n| !self.index.contains(*n))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Focus {
    version_id: i64,
    source_no: Option<u32>,
}

/// Versions and selection state of one query.
#[derive(Debug, Clone, Default)]
pub struct Thread {
    query_id: Option<i64>,
    question: Option<String>,
    entries: Vec<ThreadEntry>,
    focus: Option<Focus>,
    epoch: u64,
}

impl Thread {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ticket for a request issued now.
    pub fn ticket(&self) -> Ticket {
        Ticket { epoch: self.epoch }
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        ticket.epoch == self.epoch
    }

    /// Discard all state and invalidate outstanding tickets.
    pub fn reset(&mut self) {
        let epoch = self.epoch.wrapping_add(1);
        *self = Self {
            epoch,
            ..Self::default()
        };
    }

    /// A fresh answer starts a new thread containing only that version.
    pub fn apply_ask(
        &mut self,
        ticket: Ticket,
        question: &str,
        answer: Answer,
    ) -> Result<(), ThreadError> {
        self.check(ticket)?;
        let entry = ThreadEntry::new(answer.version);
        let focus = Self::default_focus(&entry);
        self.query_id = Some(answer.query_id);
        self.question = Some(question.to_string());
        self.entries = vec![entry];
        self.focus = Some(focus);
        Ok(())
    }

    /// Append a rerun result and focus it.
    ///
    /// Prior versions are never replaced. If the version is already present
    /// (the same response applied twice) it is focused without appending.
    pub fn apply_rerun(&mut self, ticket: Ticket, answer: Answer) -> Result<(), ThreadError> {
        self.check(ticket)?;
        if let Some(expected) = self.query_id {
            if expected != answer.query_id {
                return Err(ThreadError::QueryMismatch {
                    expected,
                    got: answer.query_id,
                });
            }
        }
        self.query_id = Some(answer.query_id);

        let version_id = answer.version.version_id;
        let focus = match self.entry(version_id).map(Self::default_focus) {
            Some(existing) => existing,
            None => {
                let entry = ThreadEntry::new(answer.version);
                let focus = Self::default_focus(&entry);
                self.entries.push(entry);
                focus
            }
        };
        self.focus = Some(focus);
        Ok(())
    }

    /// Replace the thread with a history detail, focusing the latest version.
    pub fn load_history(&mut self, ticket: Ticket, query: Query) -> Result<(), ThreadError> {
        self.check(ticket)?;
        let entries: Vec<ThreadEntry> = query.versions.into_iter().map(ThreadEntry::new).collect();
        self.focus = entries.last().map(Self::default_focus);
        self.entries = entries;
        self.query_id = Some(query.query_id);
        self.question = Some(query.question);
        Ok(())
    }

    /// Make `version_id` active. Its default source becomes the selection.
    pub fn select_version(&mut self, version_id: i64) -> Result<(), ThreadError> {
        let entry = self
            .entry(version_id)
            .ok_or(ThreadError::UnknownVersion(version_id))?;
        self.focus = Some(Self::default_focus(entry));
        Ok(())
    }

    /// A citation marker inside `version_id`'s text was clicked.
    ///
    /// Focus moves to the citing version and `source_no` is selected even if
    /// that version has no such source; the panel reports it as unresolved.
    pub fn click_citation(&mut self, version_id: i64, source_no: u32) -> Result<(), ThreadError> {
        if self.entry(version_id).is_none() {
            return Err(ThreadError::UnknownVersion(version_id));
        }
        self.focus = Some(Focus {
            version_id,
            source_no: Some(source_no),
        });
        Ok(())
    }

    /// An evidence card of the active version was clicked.
    ///
    /// Only the selected source changes. Without an active version there are
    /// no cards, so this does nothing.
    pub fn click_source(&mut self, source_no: u32) {
        if let Some(focus) = self.focus.as_mut() {
            focus.source_no = Some(source_no);
        }
    }

    pub fn query_id(&self) -> Option<i64> {
        self.query_id
    }

    pub fn question(&self) -> Option<&str> {
        self.question.as_deref()
    }

    pub fn entries(&self) -> &[ThreadEntry] {
        &self.entries
    }

    pub fn versions(&self) -> impl Iterator<Item = &AnswerVersion> + '_ {
        self.entries.iter().map(|e| &e.version)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, version_id: i64) -> Option<&ThreadEntry> {
        self.entries
            .iter()
            .find(|e| e.version.version_id == version_id)
    }

    pub fn entry_by_no(&self, version_no: u32) -> Option<&ThreadEntry> {
        self.entries
            .iter()
            .find(|e| e.version.version_no == version_no)
    }

    pub fn active_version_id(&self) -> Option<i64> {
        self.focus.map(|f| f.version_id)
    }

    pub fn active_source_no(&self) -> Option<u32> {
        self.focus.and_then(|f| f.source_no)
    }

    pub fn active_entry(&self) -> Option<&ThreadEntry> {
        self.focus.and_then(|f| self.entry(f.version_id))
    }

    pub fn active_version(&self) -> Option<&AnswerVersion> {
        self.active_entry().map(ThreadEntry::version)
    }

    pub fn active_index(&self) -> Option<&EvidenceIndex> {
        self.active_entry().map(ThreadEntry::index)
    }

    pub fn selection(&self) -> Selection<'_> {
        let (Some(entry), Some(source_no)) = (self.active_entry(), self.active_source_no()) else {
            return Selection::None;
        };
        match entry.index.lookup(source_no) {
            Some(source) => Selection::Resolved(source),
            None => Selection::Unresolved(source_no),
        }
    }

    fn check(&self, ticket: Ticket) -> Result<(), ThreadError> {
        if self.is_current(ticket) {
            Ok(())
        } else {
            Err(ThreadError::Stale)
        }
    }

    fn default_focus(entry: &ThreadEntry) -> Focus {
        Focus {
            version_id: entry.version.version_id,
            source_no: entry.index.default_source_no(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn src(source_no: u32) -> EvidenceSource {
        EvidenceSource {
            source_no,
            doc_id: i64::from(source_no) + 100,
            title: Some(format!("Doc {source_no}")),
            chunk_id: i64::from(source_no) + 1000,
            snippet: format!("fragment {source_no}"),
        }
    }

    fn answer(query_id: i64, version_id: i64, version_no: u32, text: &str, nos: &[u32]) -> Answer {
        Answer {
            query_id,
            version: AnswerVersion {
                version_id,
                version_no,
                text: text.to_string(),
                sources: nos.iter().copied().map(src).collect(),
                created_at: None,
            },
        }
    }

    fn ids(thread: &Thread) -> Vec<i64> {
        thread.versions().map(|v| v.version_id).collect()
    }

    #[test]
    fn test_empty_thread_has_no_focus() {
        let thread = Thread::new();
        assert!(thread.is_empty());
        assert_eq!(thread.active_version_id(), None);
        assert_eq!(thread.active_source_no(), None);
        assert_eq!(thread.selection(), Selection::None);
        assert!(thread.active_index().is_none());
    }

    #[test]
    fn test_ask_resets_thread() {
        let mut thread = Thread::new();
        let t = thread.ticket();
        thread.apply_ask(t, "q1", answer(1, 10, 1, "a [S1]", &[1, 2])).unwrap();
        thread.apply_ask(t, "q2", answer(2, 20, 1, "b [S4]", &[4])).unwrap();

        assert_eq!(ids(&thread), vec![20]);
        assert_eq!(thread.active_version_id(), Some(20));
        assert_eq!(thread.active_source_no(), Some(4));
        assert_eq!(thread.question(), Some("q2"));
        assert_eq!(thread.query_id(), Some(2));
    }

    #[test]
    fn test_rerun_appends() {
        let mut thread = Thread::new();
        let t = thread.ticket();
        thread.apply_ask(t, "q", answer(1, 10, 1, "a", &[1])).unwrap();
        thread.apply_rerun(t, answer(1, 11, 2, "b", &[5, 6])).unwrap();

        assert_eq!(ids(&thread), vec![10, 11]);
        assert_eq!(thread.active_version_id(), Some(11));
        assert_eq!(thread.active_source_no(), Some(5));
    }

    #[test]
    fn test_rerun_on_empty_thread_starts_it() {
        let mut thread = Thread::new();
        let t = thread.ticket();
        thread.apply_rerun(t, answer(4, 40, 3, "x", &[])).unwrap();
        assert_eq!(ids(&thread), vec![40]);
        assert_eq!(thread.query_id(), Some(4));
        assert_eq!(thread.active_source_no(), None);
    }

    #[test]
    fn test_rerun_for_other_query_rejected() {
        let mut thread = Thread::new();
        let t = thread.ticket();
        thread.apply_ask(t, "q", answer(1, 10, 1, "a", &[1])).unwrap();
        thread.click_source(9);

        let err = thread.apply_rerun(t, answer(2, 20, 1, "b", &[2])).unwrap_err();
        assert_eq!(err, ThreadError::QueryMismatch { expected: 1, got: 2 });
        assert_eq!(ids(&thread), vec![10]);
        assert_eq!(thread.active_source_no(), Some(9));
    }

    #[test]
    fn test_same_rerun_applied_twice_not_duplicated() {
        let mut thread = Thread::new();
        let t = thread.ticket();
        thread.apply_ask(t, "q", answer(1, 10, 1, "a", &[1])).unwrap();
        thread.apply_rerun(t, answer(1, 11, 2, "b", &[2])).unwrap();
        thread.select_version(10).unwrap();
        thread.apply_rerun(t, answer(1, 11, 2, "b", &[2])).unwrap();

        assert_eq!(ids(&thread), vec![10, 11]);
        assert_eq!(thread.active_version_id(), Some(11));
    }

    #[test]
    fn test_concurrent_reruns_last_applied_wins() {
        let mut thread = Thread::new();
        let t = thread.ticket();
        thread.apply_ask(t, "q", answer(1, 10, 1, "a", &[1])).unwrap();
        let first = thread.ticket();
        let second = thread.ticket();
        // Responses land in the opposite order to the requests.
        thread.apply_rerun(second, answer(1, 12, 3, "c", &[3])).unwrap();
        thread.apply_rerun(first, answer(1, 11, 2, "b", &[2])).unwrap();

        assert_eq!(ids(&thread), vec![10, 12, 11]);
        assert_eq!(thread.active_version_id(), Some(11));
    }

    #[test]
    fn test_version_switch_resets_source() {
        let mut thread = Thread::new();
        let t = thread.ticket();
        thread.apply_ask(t, "q", answer(1, 10, 1, "a", &[1, 2])).unwrap();
        thread.apply_rerun(t, answer(1, 11, 2, "b", &[5, 6])).unwrap();
        thread.click_source(6);
        assert_eq!(thread.active_source_no(), Some(6));

        thread.select_version(10).unwrap();
        assert_eq!(thread.active_version_id(), Some(10));
        assert_eq!(thread.active_source_no(), Some(1));
    }

    #[test]
    fn test_select_unknown_version_keeps_state() {
        let mut thread = Thread::new();
        let t = thread.ticket();
        thread.apply_ask(t, "q", answer(1, 10, 1, "a", &[1, 2])).unwrap();
        thread.click_source(2);

        assert_eq!(thread.select_version(99), Err(ThreadError::UnknownVersion(99)));
        assert_eq!(thread.active_version_id(), Some(10));
        assert_eq!(thread.active_source_no(), Some(2));
    }

    #[test]
    fn test_citation_click_switches_version() {
        let mut thread = Thread::new();
        let t = thread.ticket();
        thread.apply_ask(t, "q", answer(1, 10, 1, "see [S4]", &[4])).unwrap();
        thread.apply_rerun(t, answer(1, 11, 2, "see [S1]", &[1])).unwrap();

        thread.click_citation(10, 4).unwrap();
        assert_eq!(thread.active_version_id(), Some(10));
        assert_eq!(thread.active_source_no(), Some(4));
        assert_eq!(thread.selection(), Selection::Resolved(&src(4)));
    }

    #[test]
    fn test_citation_click_unresolved_is_permitted() {
        let mut thread = Thread::new();
        let t = thread.ticket();
        thread.apply_ask(t, "q", answer(1, 10, 1, "see [S8]", &[1])).unwrap();

        thread.click_citation(10, 8).unwrap();
        assert_eq!(thread.active_source_no(), Some(8));
        assert_eq!(thread.selection(), Selection::Unresolved(8));
        assert_eq!(thread.active_entry().unwrap().dangling_citations(), vec![8]);
    }

    #[test]
    fn test_card_click_never_switches_version() {
        let mut thread = Thread::new();
        let t = thread.ticket();
        thread.apply_ask(t, "q", answer(1, 10, 1, "a", &[1, 2])).unwrap();
        thread.apply_rerun(t, answer(1, 11, 2, "b", &[1, 2])).unwrap();

        thread.click_source(2);
        assert_eq!(thread.active_version_id(), Some(11));
        assert_eq!(thread.active_source_no(), Some(2));
    }

    #[test]
    fn test_card_click_on_empty_thread_is_noop() {
        let mut thread = Thread::new();
        thread.click_source(3);
        assert_eq!(thread.active_source_no(), None);
    }

    #[test]
    fn test_version_without_sources() {
        let mut thread = Thread::new();
        let t = thread.ticket();
        thread.apply_ask(t, "q", answer(1, 10, 1, "a", &[3])).unwrap();
        thread.apply_rerun(t, answer(1, 11, 2, "none", &[])).unwrap();
        assert_eq!(thread.active_source_no(), None);

        thread.select_version(10).unwrap();
        assert_eq!(thread.active_source_no(), Some(3));
        thread.select_version(11).unwrap();
        assert_eq!(thread.active_source_no(), None);
        assert_eq!(thread.selection(), Selection::None);
    }

    #[test]
    fn test_load_history_focuses_latest() {
        let mut thread = Thread::new();
        let t = thread.ticket();
        let query = Query {
            query_id: 5,
            question: "why".to_string(),
            versions: vec![
                answer(5, 50, 1, "a", &[1]).version,
                answer(5, 51, 2, "b", &[7, 8]).version,
            ],
        };
        thread.load_history(t, query).unwrap();
        assert_eq!(ids(&thread), vec![50, 51]);
        assert_eq!(thread.active_version_id(), Some(51));
        assert_eq!(thread.active_source_no(), Some(7));
        assert_eq!(thread.question(), Some("why"));
        assert_eq!(thread.entry_by_no(1).unwrap().version().version_id, 50);
    }

    #[test]
    fn test_load_empty_history() {
        let mut thread = Thread::new();
        let t = thread.ticket();
        let query = Query {
            query_id: 5,
            question: "why".to_string(),
            versions: Vec::new(),
        };
        thread.load_history(t, query).unwrap();
        assert!(thread.is_empty());
        assert_eq!(thread.active_version_id(), None);
        assert_eq!(thread.query_id(), Some(5));
    }

    #[test]
    fn test_stale_ticket_after_reset() {
        let mut thread = Thread::new();
        let stale = thread.ticket();
        thread.reset();

        let err = thread
            .apply_ask(stale, "q", answer(1, 10, 1, "a", &[1]))
            .unwrap_err();
        assert_eq!(err, ThreadError::Stale);
        assert!(thread.is_empty());

        let fresh = thread.ticket();
        assert!(thread.is_current(fresh));
        thread.apply_ask(fresh, "q", answer(1, 10, 1, "a", &[1])).unwrap();
        assert_eq!(thread.len(), 1);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut thread = Thread::new();
        let t = thread.ticket();
        thread.apply_ask(t, "q", answer(1, 10, 1, "a", &[1])).unwrap();
        thread.reset();
        assert!(thread.is_empty());
        assert_eq!(thread.query_id(), None);
        assert_eq!(thread.active_version_id(), None);
    }
}
