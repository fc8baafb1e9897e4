//! Chat view: composer, answer thread, and evidence panel.
//!
//! Requests are split into a `begin_*` step that marks the composer busy and
//! hands out a [`PendingRequest`], and [`ChatView::complete`], which applies
//! the response. Between the two the thread stays fully interactive, so
//! citations and cards of already loaded versions can still be clicked while
//! an answer is being generated.
//!
//! A failed request never touches the thread. A failed ask keeps the typed
//! question and offers a retry.

use std::future::Future;
use std::pin::Pin;

use anyhow::Result;
use kbdesk_core::models::Answer;
use kbdesk_core::panel::{self, PanelFilter};
use kbdesk_core::thread::{Thread, ThreadError, Ticket};
use tokio::sync::mpsc;

use crate::api::{ApiClient, ApiError, Backend};
use crate::render::{self, Style};

/// Which composer action is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pending {
    Ask,
    Rerun,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    Ask { question: String },
    Rerun { query_id: i64 },
}

/// A request issued by the view, to be completed with its response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    ticket: Ticket,
    pub kind: RequestKind,
}

/// Error shown under the composer.
///
/// `retry` is the action `:retry` repeats; it is `None` when repeating the
/// request cannot help and `hint` says what to do instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatFailure {
    pub message: String,
    pub retry: Option<Pending>,
    pub hint: &'static str,
}

/// What [`ChatView::complete`] did with a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Answered,
    NewVersion,
    Failed,
    /// The view was left after the request was issued.
    Discarded,
}

#[derive(Debug, Default)]
pub struct ChatView {
    thread: Thread,
    draft: String,
    pending: Option<Pending>,
    failure: Option<ChatFailure>,
    pub filter: PanelFilter,
}

impl ChatView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn thread(&self) -> &Thread {
        &self.thread
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    pub fn pending(&self) -> Option<Pending> {
        self.pending
    }

    pub fn failure(&self) -> Option<&ChatFailure> {
        self.failure.as_ref()
    }

    pub fn can_ask(&self) -> bool {
        self.pending.is_none() && !self.draft.trim().is_empty()
    }

    pub fn can_rerun(&self) -> bool {
        self.pending.is_none() && self.thread.query_id().is_some()
    }

    pub fn begin_ask(&mut self) -> Option<PendingRequest> {
        if !self.can_ask() {
            return None;
        }
        self.pending = Some(Pending::Ask);
        self.failure = None;
        Some(PendingRequest {
            ticket: self.thread.ticket(),
            kind: RequestKind::Ask {
                question: self.draft.clone(),
            },
        })
    }

    pub fn begin_rerun(&mut self) -> Option<PendingRequest> {
        if !self.can_rerun() {
            return None;
        }
        let query_id = self.thread.query_id()?;
        self.pending = Some(Pending::Rerun);
        self.failure = None;
        Some(PendingRequest {
            ticket: self.thread.ticket(),
            kind: RequestKind::Rerun { query_id },
        })
    }

    /// Repeat the action that last failed.
    pub fn retry(&mut self) -> Option<PendingRequest> {
        match self.failure.as_ref()?.retry? {
            Pending::Ask => self.begin_ask(),
            Pending::Rerun => self.begin_rerun(),
        }
    }

    pub fn complete(
        &mut self,
        request: PendingRequest,
        result: Result<Answer, ApiError>,
    ) -> Outcome {
        if !self.thread.is_current(request.ticket) {
            tracing::debug!(kind = ?request.kind, "dropping response for a discarded view");
            return Outcome::Discarded;
        }
        self.pending = None;

        let action = match request.kind {
            RequestKind::Ask { .. } => Pending::Ask,
            RequestKind::Rerun { .. } => Pending::Rerun,
        };
        let answer = match result {
            Ok(answer) => answer,
            Err(e) => {
                tracing::warn!(error = %e, "chat request failed");
                self.failure = Some(ChatFailure {
                    message: failure_message(action, &e),
                    retry: e.is_retryable().then_some(action),
                    hint: failure_hint(&e),
                });
                return Outcome::Failed;
            }
        };

        let applied = match &request.kind {
            RequestKind::Ask { question } => self
                .thread
                .apply_ask(request.ticket, question, answer)
                .map(|_| Outcome::Answered),
            RequestKind::Rerun { .. } => self
                .thread
                .apply_rerun(request.ticket, answer)
                .map(|_| Outcome::NewVersion),
        };
        match applied {
            Ok(outcome) => {
                if outcome == Outcome::Answered {
                    self.draft.clear();
                }
                outcome
            }
            Err(ThreadError::Stale) => Outcome::Discarded,
            Err(e) => {
                self.failure = Some(ChatFailure {
                    message: e.to_string(),
                    retry: None,
                    hint: "start a new thread with :new",
                });
                Outcome::Failed
            }
        }
    }

    pub fn select_version(&mut self, version_id: i64) -> Result<(), ThreadError> {
        self.thread.select_version(version_id)
    }

    pub fn click_citation(&mut self, version_id: i64, source_no: u32) -> Result<(), ThreadError> {
        self.thread.click_citation(version_id, source_no)
    }

    pub fn click_source(&mut self, source_no: u32) {
        self.thread.click_source(source_no);
    }

    /// Leave the view: all state goes and in-flight responses are dropped.
    pub fn leave(&mut self) {
        self.thread.reset();
        self.draft.clear();
        self.pending = None;
        self.failure = None;
        self.filter = PanelFilter::default();
    }
}

fn failure_message(action: Pending, error: &ApiError) -> String {
    let prefix = match action {
        Pending::Ask => "Could not get an answer",
        Pending::Rerun => "Could not recompute the answer",
    };
    match error {
        ApiError::Status { detail, .. } => format!("{prefix}: {detail}"),
        other => format!("{prefix}: {other}"),
    }
}

fn failure_hint(error: &ApiError) -> &'static str {
    match error {
        ApiError::Unauthorized { .. } => "sign in again with `kbd login <email>`",
        ApiError::AccountBlocked => "this account is blocked; contact an administrator",
        ApiError::MustChangePassword => "change your password with `kbd passwd`",
        e if e.is_retryable() => "type :retry to try again",
        _ => "the server rejected the request",
    }
}

/// Send a view request to the backend.
pub async fn perform(backend: &dyn Backend, kind: RequestKind) -> Result<Answer, ApiError> {
    match kind {
        RequestKind::Ask { question } => backend.ask(&question).await,
        RequestKind::Rerun { query_id } => backend.rerun(query_id).await,
    }
}

/// Render the whole view: thread, composer state, and panel.
pub fn render_view(view: &ChatView, style: &Style) -> String {
    let mut out = String::new();
    if view.thread.is_empty() {
        out.push_str(&render::empty_thread(style));
    } else {
        out.push_str(&render::thread(&view.thread, style));
    }
    if let Some(failure) = &view.failure {
        out.push_str(&render::failure(&failure.message, failure.hint, style));
    }
    if let Some(pending) = view.pending {
        let label = match pending {
            Pending::Ask => "generating an answer...",
            Pending::Rerun => "recomputing the answer...",
        };
        out.push_str(&style.dim(label));
        out.push('\n');
    }
    out.push_str(&render::panel(
        &panel::view_thread(&view.thread, view.filter),
        style,
    ));
    out
}

/// `kbd ask`: one question, one answer, printed with its evidence.
pub async fn run_ask(client: &ApiClient, question: &str) -> Result<()> {
    let style = Style::new();
    let mut view = ChatView::new();
    view.set_draft(question);
    let Some(request) = view.begin_ask() else {
        anyhow::bail!("question must not be empty");
    };
    let result = perform(client, request.kind.clone()).await;
    let outcome = view.complete(request, result);
    print!("{}", render_view(&view, &style));
    if outcome == Outcome::Failed {
        anyhow::bail!("no answer received");
    }
    Ok(())
}

type ResponseFuture<'a> = Pin<Box<dyn Future<Output = Result<Answer, ApiError>> + Send + 'a>>;

struct InFlight<'a> {
    request: PendingRequest,
    response: ResponseFuture<'a>,
}

async fn next_response(slot: &mut Option<InFlight<'_>>) -> (PendingRequest, Result<Answer, ApiError>) {
    let Some(inflight) = slot.as_mut() else {
        return std::future::pending().await;
    };
    let result = inflight.response.as_mut().await;
    let request = inflight.request.clone();
    *slot = None;
    (request, result)
}

/// Parsed REPL input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ask(String),
    Rerun,
    Retry,
    Version(u32),
    Cite { version_no: u32, source_no: u32 },
    Card(u32),
    Filter(PanelFilter),
    Clear,
    Show,
    Help,
    Quit,
}

pub fn parse_command(line: &str) -> Result<Command, String> {
    let line = line.trim();
    let Some(rest) = line.strip_prefix(':') else {
        return Ok(Command::Ask(line.to_string()));
    };
    let mut parts = rest.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let args: Vec<&str> = parts.collect();
    let number = |s: Option<&&str>| -> Result<u32, String> {
        s.ok_or_else(|| "missing number".to_string())?
            .trim_start_matches(['S', 's', 'v', 'V'])
            .parse::<u32>()
            .map_err(|_| "expected a number".to_string())
    };
    match name {
        "rerun" | "r" => Ok(Command::Rerun),
        "retry" => Ok(Command::Retry),
        "v" | "version" => Ok(Command::Version(number(args.first())?)),
        "cite" | "c" => Ok(Command::Cite {
            version_no: number(args.first())?,
            source_no: number(args.get(1))?,
        }),
        "card" | "s" => Ok(Command::Card(number(args.first())?)),
        "filter" | "f" => args
            .first()
            .ok_or_else(|| "missing filter".to_string())?
            .parse()
            .map(Command::Filter),
        "new" | "clear" => Ok(Command::Clear),
        "show" => Ok(Command::Show),
        "help" | "h" | "?" => Ok(Command::Help),
        "quit" | "q" | "exit" => Ok(Command::Quit),
        other => Err(format!("unknown command :{other}")),
    }
}

const HELP: &str = "\
  <question>            ask a new question (starts a new thread)
  :rerun                generate a new answer version
  :retry                repeat the last failed request
  :v <no>               switch to answer version <no>
  :cite <no> <n>        click [S<n>] in version <no>
  :card <n>             click evidence card S<n>
  :filter all|selected  evidence panel filter
  :new                  leave this thread
  :show                 redraw
  :quit";

/// `kbd chat`: interactive thread with a live evidence panel.
pub async fn run_chat(client: &ApiClient) -> Result<()> {
    let style = Style::new();
    let (tx, mut lines) = mpsc::unbounded_channel::<String>();

    // rustyline blocks, so it gets its own thread and feeds lines over a channel.
    std::thread::spawn(move || {
        let Ok(mut editor) = rustyline::DefaultEditor::new() else {
            return;
        };
        while let Ok(line) = editor.readline("> ") {
            let _ = editor.add_history_entry(line.as_str());
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    println!("Ask a question about the documents. :help lists commands.");
    let mut view = ChatView::new();
    let mut inflight: Option<InFlight<'_>> = None;

    loop {
        tokio::select! {
            line = lines.recv() => {
                let Some(line) = line else { break };
                if line.trim().is_empty() {
                    continue;
                }
                let command = match parse_command(&line) {
                    Ok(command) => command,
                    Err(message) => {
                        println!("{}", style.warn(&message));
                        continue;
                    }
                };
                let request = match command {
                    Command::Quit => break,
                    Command::Help => {
                        println!("{HELP}");
                        continue;
                    }
                    Command::Ask(question) => {
                        if view.pending().is_some() {
                            println!("{}", style.warn("a request is already running"));
                            continue;
                        }
                        view.set_draft(question);
                        view.begin_ask()
                    }
                    Command::Rerun => {
                        if !view.can_rerun() {
                            println!("{}", style.warn("nothing to rerun yet, or a request is running"));
                            continue;
                        }
                        view.begin_rerun()
                    }
                    Command::Retry => {
                        let request = view.retry();
                        if request.is_none() {
                            println!("{}", style.warn("nothing to retry"));
                        }
                        request
                    }
                    Command::Version(no) => {
                        match view.thread().entry_by_no(no).map(|e| e.version().version_id) {
                            Some(id) => {
                                let _ = view.select_version(id);
                            }
                            None => println!("{}", style.warn(&format!("no version {no}"))),
                        }
                        None
                    }
                    Command::Cite { version_no, source_no } => {
                        match view.thread().entry_by_no(version_no).map(|e| e.version().version_id) {
                            Some(id) => {
                                let _ = view.click_citation(id, source_no);
                            }
                            None => println!("{}", style.warn(&format!("no version {version_no}"))),
                        }
                        None
                    }
                    Command::Card(source_no) => {
                        view.click_source(source_no);
                        None
                    }
                    Command::Filter(filter) => {
                        view.filter = filter;
                        None
                    }
                    Command::Clear => {
                        view.leave();
                        inflight = None;
                        None
                    }
                    Command::Show => None,
                };
                if let Some(request) = request {
                    let response = Box::pin(perform(client, request.kind.clone()));
                    inflight = Some(InFlight { request, response });
                }
                print!("{}", render_view(&view, &style));
            }
            (request, result) = next_response(&mut inflight) => {
                let outcome = view.complete(request, result);
                if outcome == Outcome::NewVersion {
                    println!("{}", style.ok("new answer version created"));
                }
                if outcome != Outcome::Discarded {
                    print!("{}", render_view(&view, &style));
                }
            }
        }
    }
    Ok(())
}
