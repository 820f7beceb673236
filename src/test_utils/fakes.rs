use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::test_settings;
use crate::rendering::markup::element_attribute;
use crate::rendering::markup::element_text;
use crate::rendering::markup::select_in_document;
use crate::rendering::markup::select_in_fragment;
use crate::AlertChannel;
use crate::AlertLevel;
use crate::ChangeKind;
use crate::ChangeStream;
use crate::ConfigChange;
use crate::ConfigSource;
use crate::DisplayIdentity;
use crate::ElementHandle;
use crate::Error;
use crate::ItemId;
use crate::RenderingAgent;
use crate::RenderingConfig;
use crate::RenderingError;
use crate::RenderingSession;
use crate::Result;
use crate::Settings;
use crate::SinkError;
use crate::SinkMessage;
use crate::SinkTarget;
use crate::SinkTransport;
use crate::SourceRecord;
use crate::StorageError;
use crate::WaitPolicy;
use crate::WatcherContext;
use crate::WatermarkStore;

// -
// Rendering

/// One post as shown on a fake feed page
#[derive(Debug, Clone)]
pub struct PagePost {
    pub id: ItemId,
    pub author: String,
    pub boosted: bool,
    pub pinned: bool,
}

impl PagePost {
    pub fn new(id: ItemId) -> Self {
        Self {
            id,
            author: "alice".to_string(),
            boosted: false,
            pinned: false,
        }
    }

    pub fn boosted_from(
        mut self,
        author: &str,
    ) -> Self {
        self.boosted = true;
        self.author = author.to_string();
        self
    }

    pub fn pinned(mut self) -> Self {
        self.pinned = true;
        self
    }
}

#[derive(Default)]
struct PageState {
    source_id: String,
    profile: Option<DisplayIdentity>,
    /// Newest first, like the real page
    posts: Vec<PagePost>,
    raw_markup: Option<String>,
    failing_refreshes: usize,
    refresh_delay: Option<Duration>,
    refreshes: usize,
    completed_refreshes: usize,
    active_refreshes: usize,
    max_active_refreshes: usize,
    closed_mid_refresh: bool,
    opens: usize,
    closes: usize,
}

/// Scripted feed page rendered with the default selectors
#[derive(Clone, Default)]
pub struct FakePage {
    inner: Arc<Mutex<PageState>>,
}

impl FakePage {
    pub fn new(source_id: &str) -> Self {
        let page = FakePage::default();
        page.inner.lock().source_id = source_id.to_string();
        page
    }

    pub fn set_posts(
        &self,
        newest_first: Vec<PagePost>,
    ) {
        self.inner.lock().posts = newest_first;
    }

    pub fn set_profile(
        &self,
        name: &str,
        avatar_ref: &str,
    ) {
        self.inner.lock().profile = Some(DisplayIdentity {
            name: name.to_string(),
            avatar_ref: avatar_ref.to_string(),
        });
    }

    /// Replaces the generated markup
    pub fn set_raw_markup(
        &self,
        markup: &str,
    ) {
        self.inner.lock().raw_markup = Some(markup.to_string());
    }

    pub fn fail_next_refreshes(
        &self,
        n: usize,
    ) {
        self.inner.lock().failing_refreshes = n;
    }

    /// Every later refresh takes `delay` before returning
    pub fn set_refresh_delay(
        &self,
        delay: Duration,
    ) {
        self.inner.lock().refresh_delay = Some(delay);
    }

    /// Refreshes started
    pub fn refreshes(&self) -> usize {
        self.inner.lock().refreshes
    }

    pub fn completed_refreshes(&self) -> usize {
        self.inner.lock().completed_refreshes
    }

    pub fn active_refreshes(&self) -> usize {
        self.inner.lock().active_refreshes
    }

    /// Highest number of refreshes ever in flight at once
    pub fn max_active_refreshes(&self) -> usize {
        self.inner.lock().max_active_refreshes
    }

    /// Whether a session was closed while one of its refreshes was in flight
    pub fn closed_mid_refresh(&self) -> bool {
        self.inner.lock().closed_mid_refresh
    }

    pub fn opens(&self) -> usize {
        self.inner.lock().opens
    }

    pub fn closes(&self) -> usize {
        self.inner.lock().closes
    }

    pub fn markup(&self) -> String {
        let state = self.inner.lock();
        if let Some(raw) = &state.raw_markup {
            return raw.clone();
        }

        let mut html = String::from("<html><body>");
        if let Some(profile) = &state.profile {
            html.push_str(&format!(
                r#"<div data-testid="UserName"><span>{}</span></div><a href="/{}/photo"><img src="{}"></a>"#,
                profile.name, state.source_id, profile.avatar_ref
            ));
        }
        for post in &state.posts {
            html.push_str(r#"<article data-testid="tweet">"#);
            if post.boosted {
                html.push_str(&format!(
                    r#"<span data-testid="socialContext">{} Retweeted</span>"#,
                    state.source_id
                ));
            }
            if post.pinned {
                html.push_str(r#"<span data-testid="socialContext">Pinned Tweet</span>"#);
            }
            html.push_str(&format!(
                r#"<div data-testid="User-Name"><a href="/{a}">{a}</a><a href="/{a}/status/{id}?s=20">1m</a></div></article>"#,
                a = post.author,
                id = post.id
            ));
        }
        html.push_str("</body></html>");
        html
    }
}

pub struct FakeSession {
    page: FakePage,
    closed: bool,
    agent_closed: Arc<AtomicBool>,
}

impl FakeSession {
    fn ensure_open(&self) -> Result<()> {
        if self.closed || self.agent_closed.load(Ordering::SeqCst) {
            return Err(RenderingError::SessionClosed.into());
        }
        Ok(())
    }
}

#[async_trait]
impl RenderingSession for FakeSession {
    async fn refresh(
        &mut self,
        wait: WaitPolicy,
    ) -> Result<()> {
        self.ensure_open()?;
        let delay = {
            let mut state = self.page.inner.lock();
            state.refreshes += 1;
            state.active_refreshes += 1;
            state.max_active_refreshes = state.max_active_refreshes.max(state.active_refreshes);
            state.refresh_delay
        };
        if let Some(delay) = delay.filter(|d| !d.is_zero()) {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.page.inner.lock();
        state.active_refreshes -= 1;
        state.completed_refreshes += 1;
        if state.failing_refreshes > 0 {
            state.failing_refreshes -= 1;
            return Err(RenderingError::Timeout(wait.timeout).into());
        }
        Ok(())
    }

    async fn query_all(
        &self,
        selector: &str,
    ) -> Result<Vec<ElementHandle>> {
        self.ensure_open()?;
        select_in_document(&self.page.markup(), selector)
    }

    async fn query_within(
        &self,
        scope: &ElementHandle,
        selector: &str,
    ) -> Result<Vec<ElementHandle>> {
        self.ensure_open()?;
        select_in_fragment(scope.markup(), selector)
    }

    async fn extract_text(
        &self,
        element: &ElementHandle,
    ) -> Result<String> {
        self.ensure_open()?;
        Ok(element_text(element.markup()))
    }

    async fn extract_attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>> {
        self.ensure_open()?;
        element_attribute(element.markup(), name)
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            let mut state = self.page.inner.lock();
            state.closes += 1;
            if state.active_refreshes > 0 {
                state.closed_mid_refresh = true;
            }
        }
        Ok(())
    }
}

/// Agent serving [`FakePage`]s keyed by source id
pub struct FakeAgent {
    rendering: RenderingConfig,
    pages: Mutex<HashMap<String, FakePage>>,
    failing_opens: Mutex<HashSet<String>>,
    closed: Arc<AtomicBool>,
    shutdowns: AtomicUsize,
}

impl Default for FakeAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeAgent {
    pub fn new() -> Self {
        Self {
            rendering: RenderingConfig::default(),
            pages: Mutex::new(HashMap::new()),
            failing_opens: Mutex::new(HashSet::new()),
            closed: Arc::new(AtomicBool::new(false)),
            shutdowns: AtomicUsize::new(0),
        }
    }

    pub fn page(
        &self,
        source_id: &str,
    ) -> FakePage {
        let url = self.rendering.page_url(source_id);
        self.pages
            .lock()
            .entry(url)
            .or_insert_with(|| FakePage::new(source_id))
            .clone()
    }

    pub fn fail_open(
        &self,
        source_id: &str,
        failing: bool,
    ) {
        let url = self.rendering.page_url(source_id);
        let mut failing_opens = self.failing_opens.lock();
        if failing {
            failing_opens.insert(url);
        } else {
            failing_opens.remove(&url);
        }
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RenderingAgent for FakeAgent {
    async fn open(
        &self,
        url: &str,
    ) -> Result<Box<dyn RenderingSession>> {
        if self.failing_opens.lock().contains(url) {
            return Err(RenderingError::Status {
                url: url.to_string(),
                status: 503,
            }
            .into());
        }

        let source_id = url.rsplit('/').next().unwrap_or_default().to_string();
        let page = self
            .pages
            .lock()
            .entry(url.to_string())
            .or_insert_with(|| FakePage::new(&source_id))
            .clone();
        page.inner.lock().opens += 1;

        Ok(Box::new(FakeSession {
            page,
            closed: false,
            agent_closed: self.closed.clone(),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        self.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// -
// Sinks and alerts

/// Records every accepted message; targets marked failing reject
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(SinkTarget, SinkMessage)>>,
    failing: Mutex<HashSet<SinkTarget>>,
    attempts: AtomicUsize,
}

impl RecordingTransport {
    pub fn fail_target(
        &self,
        target: &SinkTarget,
    ) {
        self.failing.lock().insert(target.clone());
    }

    pub fn sent(&self) -> Vec<(SinkTarget, SinkMessage)> {
        self.sent.lock().clone()
    }

    pub fn bodies_for(
        &self,
        target: &SinkTarget,
    ) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter(|(t, _)| t == target)
            .map(|(_, m)| m.body.clone())
            .collect()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SinkTransport for RecordingTransport {
    async fn send(
        &self,
        target: &SinkTarget,
        message: &SinkMessage,
    ) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().contains(target) {
            return Err(SinkError::Rejected { status: 500 }.into());
        }
        self.sent.lock().push((target.clone(), message.clone()));
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingAlerts {
    alerts: Mutex<Vec<(AlertLevel, String)>>,
}

impl RecordingAlerts {
    pub fn alerts(&self) -> Vec<(AlertLevel, String)> {
        self.alerts.lock().clone()
    }

    pub fn count(
        &self,
        level: AlertLevel,
    ) -> usize {
        self.alerts.lock().iter().filter(|(l, _)| *l == level).count()
    }

    pub fn contains(
        &self,
        level: AlertLevel,
        needle: &str,
    ) -> bool {
        self.alerts
            .lock()
            .iter()
            .any(|(l, m)| *l == level && m.contains(needle))
    }
}

impl AlertChannel for RecordingAlerts {
    fn alert(
        &self,
        level: AlertLevel,
        message: &str,
    ) {
        self.alerts.lock().push((level, message.to_string()));
    }
}

// -
// Stores

#[derive(Default)]
pub struct MemoryWatermarkStore {
    watermarks: Mutex<HashMap<String, ItemId>>,
    fail_gets: AtomicBool,
    fail_upserts: AtomicBool,
    upserts: AtomicUsize,
}

impl MemoryWatermarkStore {
    pub fn preset(
        &self,
        source_id: &str,
        id: ItemId,
    ) {
        self.watermarks.lock().insert(source_id.to_string(), id);
    }

    pub fn watermark(
        &self,
        source_id: &str,
    ) -> Option<ItemId> {
        self.watermarks.lock().get(source_id).copied()
    }

    pub fn fail_gets(
        &self,
        failing: bool,
    ) {
        self.fail_gets.store(failing, Ordering::SeqCst);
    }

    pub fn fail_upserts(
        &self,
        failing: bool,
    ) {
        self.fail_upserts.store(failing, Ordering::SeqCst);
    }

    pub fn upserts(&self) -> usize {
        self.upserts.load(Ordering::SeqCst)
    }
}

fn io_failure(what: &str) -> Error {
    StorageError::IoError(std::io::Error::other(what.to_string())).into()
}

#[async_trait]
impl WatermarkStore for MemoryWatermarkStore {
    async fn get(
        &self,
        source_id: &str,
    ) -> Result<Option<ItemId>> {
        if self.fail_gets.load(Ordering::SeqCst) {
            return Err(io_failure("watermark read failed"));
        }
        Ok(self.watermark(source_id))
    }

    async fn upsert(
        &self,
        source_id: &str,
        id: ItemId,
    ) -> Result<()> {
        if self.fail_upserts.load(Ordering::SeqCst) {
            return Err(io_failure("watermark write failed"));
        }
        self.upserts.fetch_add(1, Ordering::SeqCst);
        self.watermarks.lock().insert(source_id.to_string(), id);
        Ok(())
    }
}

/// Configuration records in memory with a controllable change feed
#[derive(Default)]
pub struct MemoryConfigSource {
    records: Mutex<BTreeMap<String, SourceRecord>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Result<ConfigChange>>>>,
    fail_list: AtomicBool,
    fail_watch: AtomicBool,
    list_calls: AtomicUsize,
}

impl MemoryConfigSource {
    /// Stores `record` without notifying
    pub fn seed(
        &self,
        record: SourceRecord,
    ) {
        self.records.lock().insert(record.key.clone(), record);
    }

    pub fn put(
        &self,
        record: SourceRecord,
    ) {
        let key = record.key.clone();
        self.seed(record);
        self.notify(&key, ChangeKind::Upsert);
    }

    pub fn remove(
        &self,
        key: &str,
    ) {
        self.records.lock().remove(key);
        self.notify(key, ChangeKind::Remove);
    }

    pub fn notify(
        &self,
        key: &str,
        kind: ChangeKind,
    ) {
        let change = ConfigChange {
            key: key.to_string(),
            kind,
        };
        self.subscribers
            .lock()
            .retain(|tx| tx.send(Ok(change.clone())).is_ok());
    }

    pub fn send_error(&self) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(Err(StorageError::ChangeStreamClosed.into())).is_ok());
    }

    /// Ends every open change stream
    pub fn close_streams(&self) {
        self.subscribers.lock().clear();
    }

    pub fn fail_list(
        &self,
        failing: bool,
    ) {
        self.fail_list.store(failing, Ordering::SeqCst);
    }

    pub fn fail_watch(
        &self,
        failing: bool,
    ) {
        self.fail_watch.store(failing, Ordering::SeqCst);
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[async_trait]
impl ConfigSource for MemoryConfigSource {
    async fn list_all(&self) -> Result<Vec<SourceRecord>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(io_failure("listing records failed"));
        }
        Ok(self.records.lock().values().cloned().collect())
    }

    async fn watch_changes(&self) -> Result<ChangeStream> {
        if self.fail_watch.load(Ordering::SeqCst) {
            return Err(io_failure("change feed unreachable"));
        }
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        Ok(UnboundedReceiverStream::new(rx).boxed())
    }
}

// -
// Harness

/// Fake collaborators wired into a [`WatcherContext`]
pub struct TestHarness {
    pub agent: Arc<FakeAgent>,
    pub store: Arc<MemoryWatermarkStore>,
    pub transport: Arc<RecordingTransport>,
    pub alerts: Arc<RecordingAlerts>,
    pub settings: Arc<Settings>,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_settings(test_settings())
    }

    pub fn with_settings(settings: Settings) -> Self {
        Self {
            agent: Arc::new(FakeAgent::new()),
            store: Arc::new(MemoryWatermarkStore::default()),
            transport: Arc::new(RecordingTransport::default()),
            alerts: Arc::new(RecordingAlerts::default()),
            settings: Arc::new(settings),
        }
    }

    pub fn context(&self) -> WatcherContext {
        WatcherContext {
            agent: self.agent.clone(),
            store: self.store.clone(),
            transport: self.transport.clone(),
            alerts: self.alerts.clone(),
            settings: self.settings.clone(),
        }
    }
}
