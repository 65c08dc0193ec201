//! Scripted test doubles for the browser and language-model
//! collaborators.
//!
//! Kept as a regular module (not `#[cfg(test)]`) so downstream crates and
//! integration tests can drive the full decision loop without a real
//! browser or model.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::browser::{
    BrowserError, BrowserSession, LinkHit, PageState, ScrollDirection, SessionProvider,
};
use crate::error::LmError;
use crate::lm::{LanguageModel, PlanRequest};

// ── Language model ─────────────────────────────────────────────────────

/// A language model that replays a queue of prepared responses.
pub struct ScriptedLm {
    responses: Mutex<VecDeque<Result<Value, LmError>>>,
    calls: AtomicUsize,
    last_user_message: Mutex<String>,
}

impl ScriptedLm {
    pub fn new(responses: Vec<Result<Value, LmError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
            last_user_message: Mutex::new(String::new()),
        }
    }

    /// Number of completed calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// User message of the most recent call.
    pub fn last_user_message(&self) -> String {
        self.last_user_message.lock().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedLm {
    async fn complete(&self, request: PlanRequest) -> Result<Value, LmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_user_message.lock() = request.user_message;
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(LmError::Transport("scripted responses exhausted".into())))
    }
}

// ── Browser ────────────────────────────────────────────────────────────

/// One scripted reply for the next browser action call.
pub enum ScriptedStep {
    /// Generic success for navigate/click/type/scroll/wait_for.
    Ok,
    /// Success payload for `extract`.
    OkItems(Vec<String>),
    /// Success payload for `attribute`.
    OkText(String),
    /// Success payload for `links_by_text`.
    OkLinks(Vec<LinkHit>),
    /// Success payload for `screenshot`.
    OkBytes(Vec<u8>),
    Err(BrowserError),
    /// Never resolves; used to exercise timeout ceilings.
    Hang,
}

/// A browser session that replays a queue of `ScriptedStep`s, one per
/// action call. `page_state` does not consume a step.
pub struct ScriptedSession {
    steps: Mutex<VecDeque<ScriptedStep>>,
    state: Mutex<PageState>,
    navigations: Mutex<Vec<String>>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedSession {
    pub fn new(steps: Vec<ScriptedStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            state: Mutex::new(PageState::default()),
            navigations: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_page_state(self, state: PageState) -> Self {
        *self.state.lock() = state;
        self
    }

    /// URLs passed to `navigate`, in order.
    pub fn navigations(&self) -> Vec<String> {
        self.navigations.lock().clone()
    }

    /// Method names of every action call, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    async fn next_step(&self, method: &str) -> Result<ScriptedStep, BrowserError> {
        self.calls.lock().push(method.to_string());
        let step = self.steps.lock().pop_front();
        match step {
            Some(ScriptedStep::Hang) => {
                futures::future::pending::<()>().await;
                unreachable!("pending future resolved")
            }
            Some(step) => Ok(step),
            None => Err(BrowserError::Disconnected(format!(
                "script exhausted at {method}"
            ))),
        }
    }

    fn plain(&self, step: ScriptedStep, method: &str) -> Result<(), BrowserError> {
        match step {
            ScriptedStep::Ok => Ok(()),
            ScriptedStep::Err(e) => Err(e),
            _ => Err(BrowserError::BadArg(format!(
                "script mismatch: non-plain step for {method}"
            ))),
        }
    }
}

#[async_trait]
impl BrowserSession for ScriptedSession {
    async fn navigate(&self, url: &str) -> Result<(), BrowserError> {
        let step = self.next_step("navigate").await?;
        let result = self.plain(step, "navigate");
        if result.is_ok() {
            self.navigations.lock().push(url.to_string());
            let mut state = self.state.lock();
            state.url = url.to_string();
            state.http_status = Some(200);
        }
        result
    }

    async fn click(&self, _xpath: &str) -> Result<(), BrowserError> {
        let step = self.next_step("click").await?;
        self.plain(step, "click")
    }

    async fn click_nth(&self, _selector: &str, _index: usize) -> Result<(), BrowserError> {
        let step = self.next_step("click_nth").await?;
        self.plain(step, "click_nth")
    }

    async fn type_text(
        &self,
        _xpath: &str,
        _text: &str,
        _press_enter: bool,
    ) -> Result<(), BrowserError> {
        let step = self.next_step("type_text").await?;
        self.plain(step, "type_text")
    }

    async fn scroll(
        &self,
        _direction: ScrollDirection,
        _amount: Option<i64>,
    ) -> Result<(), BrowserError> {
        let step = self.next_step("scroll").await?;
        self.plain(step, "scroll")
    }

    async fn wait_for(&self, _condition: &str) -> Result<(), BrowserError> {
        let step = self.next_step("wait_for").await?;
        self.plain(step, "wait_for")
    }

    async fn extract(
        &self,
        _selector: Option<&str>,
        _attribute: &str,
        _limit: Option<usize>,
    ) -> Result<Vec<String>, BrowserError> {
        match self.next_step("extract").await? {
            ScriptedStep::OkItems(items) => Ok(items),
            ScriptedStep::Err(e) => Err(e),
            _ => Err(BrowserError::BadArg("script mismatch for extract".into())),
        }
    }

    async fn attribute(&self, _xpath: &str, _attribute: &str) -> Result<String, BrowserError> {
        match self.next_step("attribute").await? {
            ScriptedStep::OkText(text) => Ok(text),
            ScriptedStep::Err(e) => Err(e),
            _ => Err(BrowserError::BadArg("script mismatch for attribute".into())),
        }
    }

    async fn screenshot(&self, _full_page: bool) -> Result<Vec<u8>, BrowserError> {
        match self.next_step("screenshot").await? {
            ScriptedStep::OkBytes(bytes) => Ok(bytes),
            ScriptedStep::Err(e) => Err(e),
            _ => Err(BrowserError::BadArg("script mismatch for screenshot".into())),
        }
    }

    async fn links_by_text(
        &self,
        _keyword: &str,
        _limit: Option<usize>,
    ) -> Result<Vec<LinkHit>, BrowserError> {
        match self.next_step("links_by_text").await? {
            ScriptedStep::OkLinks(links) => Ok(links),
            ScriptedStep::Err(e) => Err(e),
            _ => Err(BrowserError::BadArg(
                "script mismatch for links_by_text".into(),
            )),
        }
    }

    async fn page_state(&self) -> PageState {
        self.state.lock().clone()
    }
}

// ── Session provider ───────────────────────────────────────────────────

/// Hands every task the same pre-built session.
pub struct ScriptedProvider {
    session: Mutex<Option<Arc<dyn BrowserSession>>>,
    released: AtomicUsize,
    cdp_url: Option<String>,
}

impl ScriptedProvider {
    pub fn new(session: Arc<dyn BrowserSession>) -> Self {
        Self {
            session: Mutex::new(Some(session)),
            released: AtomicUsize::new(0),
            cdp_url: None,
        }
    }

    pub fn with_cdp_url(mut self, url: impl Into<String>) -> Self {
        self.cdp_url = Some(url.into());
        self
    }

    /// How many times `release` has been called.
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionProvider for ScriptedProvider {
    async fn acquire(
        &self,
        _task_id: &str,
        _headless: bool,
    ) -> Result<Arc<dyn BrowserSession>, BrowserError> {
        self.session
            .lock()
            .take()
            .ok_or_else(|| BrowserError::Disconnected("no scripted session left".into()))
    }

    async fn release(&self, _task_id: &str) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }

    fn cdp_url(&self, _task_id: &str) -> Option<String> {
        self.cdp_url.clone()
    }
}
