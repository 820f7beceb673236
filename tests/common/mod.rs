use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use feed_relay::ItemId;
use feed_relay::Settings;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use serde_json::Value;
use tracing_subscriber::EnvFilter;
use warp::http::StatusCode;
use warp::Filter;

/// Reference time of [`id_at`], unix ms
pub const BASE_TS: u64 = 1_700_000_000_000;

static LOGGER_INIT: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
});

pub fn enable_logger() {
    Lazy::force(&LOGGER_INIT);
}

pub fn id_at(offset_ms: u64) -> ItemId {
    ItemId::from_timestamp_ms(BASE_TS + offset_ms)
}

/// Serves `/{source}` feed pages whose posts can be changed between polls
#[derive(Clone, Default)]
pub struct FeedServer {
    /// source → post ids, newest first
    pages: Arc<Mutex<HashMap<String, Vec<ItemId>>>>,
    addr: Option<SocketAddr>,
}

impl FeedServer {
    pub fn start() -> Self {
        let mut server = FeedServer::default();
        let pages = server.pages.clone();
        let route = warp::path::param::<String>()
            .and(warp::path::end())
            .map(move |source: String| match pages.lock().get(&source) {
                Some(posts) => warp::reply::with_status(
                    warp::reply::html(page_markup(&source, posts)),
                    StatusCode::OK,
                ),
                None => warp::reply::with_status(warp::reply::html(String::new()), StatusCode::NOT_FOUND),
            });
        let (addr, serve) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(serve);
        server.addr = Some(addr);
        server
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr.expect("server started"))
    }

    pub fn set_posts(
        &self,
        source: &str,
        newest_first: Vec<ItemId>,
    ) {
        self.pages.lock().insert(source.to_string(), newest_first);
    }

    pub fn permalink(
        &self,
        source: &str,
        id: ItemId,
    ) -> String {
        format!("{}/{}/status/{}", self.base_url(), source, id)
    }
}

fn page_markup(
    source: &str,
    posts: &[ItemId],
) -> String {
    let mut html = format!(
        r#"<html><body><div data-testid="UserName"><span>{source} profile</span></div><a href="/{source}/photo"><img src="https://img.example/{source}.jpg"></a>"#
    );
    for id in posts {
        html.push_str(&format!(
            r#"<article data-testid="tweet"><div data-testid="User-Name"><a href="/{source}">{source}</a><a href="/{source}/status/{id}?s=20">1m</a></div></article>"#
        ));
    }
    html.push_str("</body></html>");
    html
}

/// Webhook endpoint recording every posted JSON body
#[derive(Clone, Default)]
pub struct HookServer {
    received: Arc<Mutex<Vec<Value>>>,
    addr: Option<SocketAddr>,
}

impl HookServer {
    pub fn start() -> Self {
        let mut server = HookServer::default();
        let received = server.received.clone();
        let route = warp::post()
            .and(warp::path!("hook"))
            .and(warp::body::json())
            .map(move |body: Value| {
                received.lock().push(body);
                warp::reply()
            });
        let (addr, serve) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(serve);
        server.addr = Some(addr);
        server
    }

    pub fn url(&self) -> String {
        format!("http://{}/hook", self.addr.expect("server started"))
    }

    pub fn contents(&self) -> Vec<String> {
        self.received
            .lock()
            .iter()
            .filter_map(|body| body["content"].as_str().map(str::to_string))
            .collect()
    }

    pub fn usernames(&self) -> Vec<String> {
        self.received
            .lock()
            .iter()
            .filter_map(|body| body["username"].as_str().map(str::to_string))
            .collect()
    }
}

pub fn relay_settings(
    db_root_dir: &Path,
    feed: &FeedServer,
) -> Settings {
    let mut settings = Settings::default();
    settings.storage.db_root_dir = db_root_dir.to_path_buf();
    settings.rendering.page_url_template = format!("{}/{{source}}", feed.base_url());
    settings.rendering.settle_rounds = 1;
    settings.rendering.settle_delay_in_ms = 10;
    settings.rendering.wait_timeout_in_ms = 2_000;
    settings.manager.resync_interval_in_secs = 0;
    settings.monitoring.server_enabled = false;
    settings
}

pub async fn eventually<F>(
    what: &str,
    condition: F,
) where
    F: Fn() -> bool,
{
    for _ in 0..250 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition never held: {what}");
}
