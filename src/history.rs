//! History views: the list of past questions and a single thread.
//!
//! Opening a thread loads every stored version and focuses the latest one.
//! Reruns from here append a version exactly like the chat view does; a
//! failed rerun leaves versions and selection as they were.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use kbdesk_core::models::{Answer, HistoryItem, Query};
use kbdesk_core::panel::{self, PanelFilter};
use kbdesk_core::thread::{Thread, ThreadError, Ticket};

use crate::api::{ApiClient, ApiError, Backend};
use crate::config::Config;
use crate::render::{self, Style};

/// The history list.
#[derive(Debug, Default)]
pub struct HistoryList {
    items: Vec<HistoryItem>,
    error: Option<String>,
}

impl HistoryList {
    pub async fn load(backend: &dyn Backend, limit: u32) -> Self {
        match backend.history(limit).await {
            Ok(items) => Self { items, error: None },
            Err(e) => {
                tracing::warn!(error = %e, "history list failed");
                Self {
                    items: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    pub fn items(&self) -> &[HistoryItem] {
        &self.items
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// Request handed out by [`DetailView`], completed with its response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetailRequest {
    ticket: Ticket,
    pub query_id: i64,
}

/// One past question with all its versions.
#[derive(Debug, Default)]
pub struct DetailView {
    thread: Thread,
    loading: bool,
    rerunning: bool,
    error: Option<String>,
    pub filter: PanelFilter,
}

impl DetailView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn thread(&self) -> &Thread {
        &self.thread
    }

    pub fn thread_mut(&mut self) -> &mut Thread {
        &mut self.thread
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_rerunning(&self) -> bool {
        self.rerunning
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Start loading `query_id`. Whatever was shown before is dropped and
    /// responses for it are ignored from now on.
    pub fn begin_open(&mut self, query_id: i64) -> DetailRequest {
        self.thread.reset();
        self.loading = true;
        self.rerunning = false;
        self.error = None;
        DetailRequest {
            ticket: self.thread.ticket(),
            query_id,
        }
    }

    pub fn complete_open(
        &mut self,
        request: DetailRequest,
        result: Result<Query, ApiError>,
    ) -> Result<(), ThreadError> {
        if !self.thread.is_current(request.ticket) {
            return Err(ThreadError::Stale);
        }
        self.loading = false;
        match result {
            Ok(query) => self.thread.load_history(request.ticket, query),
            Err(e) => {
                tracing::warn!(query_id = request.query_id, error = %e, "history detail failed");
                self.error = Some(e.to_string());
                Ok(())
            }
        }
    }

    /// Start a rerun of the loaded question. `None` while busy or empty.
    pub fn begin_rerun(&mut self) -> Option<DetailRequest> {
        if self.loading || self.rerunning {
            return None;
        }
        let query_id = self.thread.query_id()?;
        self.rerunning = true;
        self.error = None;
        Some(DetailRequest {
            ticket: self.thread.ticket(),
            query_id,
        })
    }

    pub fn complete_rerun(
        &mut self,
        request: DetailRequest,
        result: Result<Answer, ApiError>,
    ) -> Result<(), ThreadError> {
        if !self.thread.is_current(request.ticket) {
            return Err(ThreadError::Stale);
        }
        self.rerunning = false;
        match result {
            Ok(answer) => self.thread.apply_rerun(request.ticket, answer),
            Err(e) => {
                tracing::warn!(query_id = request.query_id, error = %e, "rerun failed");
                self.error = Some(format!("Could not recompute the answer: {e}"));
                Ok(())
            }
        }
    }

    /// Open `query_id` against `backend` in one step.
    pub async fn open(&mut self, backend: &dyn Backend, query_id: i64) -> Result<(), ThreadError> {
        let request = self.begin_open(query_id);
        let result = backend.history_detail(query_id).await;
        self.complete_open(request, result)
    }

    /// Rerun against `backend` in one step. `Ok(false)` when nothing was sent.
    pub async fn rerun(&mut self, backend: &dyn Backend) -> Result<bool, ThreadError> {
        let Some(request) = self.begin_rerun() else {
            return Ok(false);
        };
        let result = backend.rerun(request.query_id).await;
        self.complete_rerun(request, result)?;
        Ok(true)
    }
}

pub fn render_detail(view: &DetailView, style: &Style) -> String {
    let mut out = String::new();
    if let Some(error) = view.error() {
        out.push_str(&render::failure(error, "check the id or try again later", style));
    }
    if view.thread().is_empty() {
        if view.error().is_none() {
            out.push_str(&style.dim("This question has no stored answers."));
            out.push('\n');
        }
        return out;
    }
    out.push_str(&render::thread(view.thread(), style));
    out.push_str(&render::panel(
        &panel::view_thread(view.thread(), view.filter),
        style,
    ));
    out
}

/// Default file name for an exported version.
pub fn export_file_name(version_id: i64) -> PathBuf {
    PathBuf::from(format!("answer-{version_id}.pdf"))
}

/// Download a version as PDF and write it to `path`.
pub async fn export_version(backend: &dyn Backend, version_id: i64, path: &Path) -> Result<usize> {
    let bytes = backend
        .export_pdf(version_id)
        .await
        .with_context(|| format!("Failed to export version {version_id}"))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    std::fs::write(path, &bytes)
        .with_context(|| format!("Failed to write export: {}", path.display()))?;
    tracing::info!(version_id, path = %path.display(), bytes = bytes.len(), "exported");
    Ok(bytes.len())
}

/// `kbd history`
pub async fn run_history(config: &Config, client: &ApiClient, limit: Option<u32>) -> Result<()> {
    let style = Style::new();
    let limit = limit.unwrap_or(config.history.limit);
    let list = HistoryList::load(client, limit).await;
    if let Some(error) = list.error() {
        anyhow::bail!("Could not load history: {error}");
    }
    print!("{}", render::history_list(list.items(), &style));
    Ok(())
}

/// Options for `kbd show`.
#[derive(Debug, Clone, Default)]
pub struct ShowOptions {
    pub version_no: Option<u32>,
    pub source_no: Option<u32>,
    pub selected_only: bool,
}

/// Apply `kbd show` selection flags to a loaded view.
pub fn apply_show_options(view: &mut DetailView, options: &ShowOptions) -> Result<()> {
    if let Some(no) = options.version_no {
        let version_id = view
            .thread()
            .entry_by_no(no)
            .map(|e| e.version().version_id)
            .with_context(|| format!("Question has no version {no}"))?;
        view.thread_mut().select_version(version_id)?;
    }
    if let Some(source_no) = options.source_no {
        view.thread_mut().click_source(source_no);
    }
    if options.selected_only {
        view.filter = PanelFilter::Selected;
    }
    Ok(())
}

/// `kbd show <query_id>`
pub async fn run_show(
    client: &ApiClient,
    query_id: i64,
    options: &ShowOptions,
) -> Result<()> {
    let style = Style::new();
    let mut view = DetailView::new();
    view.open(client, query_id).await?;
    if let Some(error) = view.error() {
        anyhow::bail!("Could not open question {query_id}: {error}");
    }
    apply_show_options(&mut view, options)?;
    print!("{}", render_detail(&view, &style));
    Ok(())
}

/// `kbd rerun <query_id>`: load, rerun, show the thread with the new version active.
pub async fn run_rerun(client: &ApiClient, query_id: i64) -> Result<()> {
    let style = Style::new();
    let mut view = DetailView::new();
    view.open(client, query_id).await?;
    if let Some(error) = view.error() {
        anyhow::bail!("Could not open question {query_id}: {error}");
    }
    view.rerun(client).await?;
    print!("{}", render_detail(&view, &style));
    if view.error().is_some() {
        anyhow::bail!("rerun failed");
    }
    println!("{}", style.ok("new answer version created"));
    Ok(())
}

/// `kbd export <version_id>`
pub async fn run_export(client: &ApiClient, version_id: i64, output: Option<PathBuf>) -> Result<()> {
    let path = output.unwrap_or_else(|| export_file_name(version_id));
    let written = export_version(client, version_id, &path).await?;
    println!("Saved {} ({written} bytes)", path.display());
    Ok(())
}
