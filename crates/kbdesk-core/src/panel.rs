//! Evidence panel view model.
//!
//! Turns the active version's [`EvidenceIndex`] and the selected source
//! number into what the panel should show. Every combination maps to a
//! defined view; an unresolved selection is reported, never replaced by a
//! fallback card.

use std::str::FromStr;

use crate::evidence::EvidenceIndex;
use crate::models::EvidenceSource;
use crate::thread::Thread;

/// Which cards the panel lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PanelFilter {
    #[default]
    All,
    Selected,
}

impl FromStr for PanelFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(Self::All),
            "selected" => Ok(Self::Selected),
            other => Err(format!("unknown panel filter '{other}': use all or selected")),
        }
    }
}

/// One evidence card.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Card<'a> {
    pub source: &'a EvidenceSource,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelView<'a> {
    /// There is no active version yet.
    NoVersion,
    /// The active version carries no evidence.
    NoSources,
    /// Filtering to the selection left nothing to show.
    NothingSelected { unresolved: Option<u32> },
    Cards {
        cards: Vec<Card<'a>>,
        /// Selected number that is not among the cards.
        unresolved: Option<u32>,
    },
}

/// Build the panel for an index and selection.
pub fn view(
    index: Option<&EvidenceIndex>,
    active_source_no: Option<u32>,
    filter: PanelFilter,
) -> PanelView<'_> {
    let Some(index) = index else {
        return PanelView::NoVersion;
    };
    if index.is_empty() {
        return PanelView::NoSources;
    }

    let unresolved = active_source_no.filter(|n| !index.contains(*n));
    let cards: Vec<Card<'_>> = index
        .all()
        .iter()
        .map(|source| Card {
            source,
            active: active_source_no == Some(source.source_no),
        })
        .filter(|card| filter == PanelFilter::All || card.active)
        .collect();

    if cards.is_empty() {
        PanelView::NothingSelected { unresolved }
    } else {
        PanelView::Cards { cards, unresolved }
    }
}

/// Panel for the thread's active version.
pub fn view_thread(thread: &Thread, filter: PanelFilter) -> PanelView<'_> {
    view(thread.active_index(), thread.active_source_no(), filter)
}
