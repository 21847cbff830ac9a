use crate::agent::page::PageHandle;
use crate::branding::{Branding, LOGO_SVG};
use crate::config::BrowserConfig;
use crate::error::{AstaError, PageError, Result};
use crate::tabs::PageFactory;
use async_trait::async_trait;
use base64::Engine;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{Child, Command};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>, WsMessage>;
type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;

const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Remote objects created by `call_function`, released after each call
const CALL_GROUP: &str = "asta-call";

/// Command side of a DevTools WebSocket
struct Connection {
    /// WebSocket sender
    ws_tx: Mutex<WsSink>,
    /// Replies awaited by id
    responses: Pending,
    /// Message ID counter
    msg_id: AtomicU64,
}

/// One page target driven over a raw DevTools WebSocket
pub struct CdpPage {
    target_id: String,
    conn: Arc<Connection>,
    reader: JoinHandle<()>,
    /// `Fetch.*` events, until interception takes them
    fetch_events: parking_lot::Mutex<Option<mpsc::UnboundedReceiver<Value>>>,
    interceptor: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl CdpPage {
    /// Connect to a page target's `webSocketDebuggerUrl`.
    pub async fn connect(target_id: String, ws_url: &str) -> Result<Self> {
        let (ws_stream, _) = connect_async(ws_url)
            .await
            .map_err(|e| AstaError::Browser(format!("Failed to connect WebSocket: {}", e)))?;
        let (tx, mut rx) = ws_stream.split();

        let responses: Pending = Arc::new(Mutex::new(HashMap::new()));
        let routed = Arc::clone(&responses);
        let (fetch_tx, fetch_rx) = mpsc::unbounded_channel();

        // Route replies to the waiting sender. Fetch events go to the
        // interceptor, the rest are only traced.
        let reader = tokio::spawn(async move {
            while let Some(msg) = rx.next().await {
                match msg {
                    Ok(WsMessage::Text(text)) => {
                        let Ok(json) = serde_json::from_str::<Value>(&text) else {
                            continue;
                        };
                        if let Some(id) = json.get("id").and_then(|i| i.as_u64()) {
                            if let Some(sender) = routed.lock().await.remove(&id) {
                                let _ = sender.send(json);
                            }
                        } else {
                            let method = json.get("method").and_then(|m| m.as_str()).unwrap_or("?");
                            if method.starts_with("Fetch.") {
                                let _ = fetch_tx.send(json);
                            } else {
                                tracing::trace!("CDP event: {}", method);
                            }
                        }
                    }
                    Ok(WsMessage::Close(_)) => {
                        tracing::debug!("WebSocket closed");
                        break;
                    }
                    Err(e) => {
                        tracing::debug!("WebSocket error: {:?}", e);
                        break;
                    }
                    _ => {}
                }
            }
            // Wake everyone still waiting
            routed.lock().await.clear();
        });

        let page = Self {
            target_id,
            conn: Arc::new(Connection {
                ws_tx: Mutex::new(tx),
                responses,
                msg_id: AtomicU64::new(1),
            }),
            reader,
            fetch_events: parking_lot::Mutex::new(Some(fetch_rx)),
            interceptor: parking_lot::Mutex::new(None),
        };

        page.send_command("Page.enable", json!({}))
            .await
            .map_err(|e| AstaError::Browser(e.to_string()))?;
        page.send_command("Runtime.enable", json!({}))
            .await
            .map_err(|e| AstaError::Browser(e.to_string()))?;
        tracing::info!("CDP page {} connected", page.target_id);

        Ok(page)
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    async fn send_command(&self, method: &str, params: Value) -> std::result::Result<Value, PageError> {
        self.conn.send_command(method, params).await
    }

    /// Serve the search engine's logo requests from our own logo.
    ///
    /// Only the first call on a page installs the interceptor.
    pub async fn intercept_logos(&self, branding: Branding) -> std::result::Result<(), PageError> {
        let patterns = branding.logo_url_patterns();
        if patterns.is_empty() {
            return Ok(());
        }
        let Some(events) = self.fetch_events.lock().take() else {
            return Ok(());
        };

        let patterns: Vec<Value> = patterns
            .into_iter()
            .map(|pattern| json!({ "urlPattern": pattern, "requestStage": "Request" }))
            .collect();
        self.send_command(
            "Fetch.enable",
            json!({ "patterns": patterns, "handleAuthRequests": false }),
        )
        .await?;

        let conn = Arc::clone(&self.conn);
        let task = tokio::spawn(serve_logos(conn, events, branding));
        *self.interceptor.lock() = Some(task);
        tracing::debug!("Logo interception enabled on {}", self.target_id);
        Ok(())
    }

    /// Turn a `Runtime.evaluate` / `Runtime.callFunctionOn` result into a value
    fn remote_value(result: Value) -> std::result::Result<Value, PageError> {
        if let Some(details) = result.get("exceptionDetails") {
            let message = details
                .get("exception")
                .and_then(|e| e.get("description"))
                .and_then(|d| d.as_str())
                .or_else(|| details.get("text").and_then(|t| t.as_str()))
                .unwrap_or("Script error");
            return Err(PageError::script(message));
        }

        Ok(result
            .get("result")
            .and_then(|r| r.get("value"))
            .cloned()
            .unwrap_or(Value::Null))
    }

    async fn global_object(&self) -> std::result::Result<String, PageError> {
        let result = self
            .send_command(
                "Runtime.evaluate",
                json!({ "expression": "globalThis", "objectGroup": CALL_GROUP }),
            )
            .await?;
        result
            .get("result")
            .and_then(|r| r.get("objectId"))
            .and_then(|id| id.as_str())
            .map(str::to_string)
            .ok_or_else(|| PageError::Decode("no global object".to_string()))
    }

    /// (current index, entry ids)
    async fn history(&self) -> std::result::Result<(usize, Vec<(i64, String)>), PageError> {
        let result = self
            .send_command("Page.getNavigationHistory", json!({}))
            .await?;
        let current = result
            .get("currentIndex")
            .and_then(|i| i.as_u64())
            .unwrap_or(0) as usize;
        let entries = result
            .get("entries")
            .and_then(|e| e.as_array())
            .map(|entries| {
                entries
                    .iter()
                    .map(|e| {
                        (
                            e.get("id").and_then(|i| i.as_i64()).unwrap_or(0),
                            e.get("url")
                                .and_then(|u| u.as_str())
                                .unwrap_or_default()
                                .to_string(),
                        )
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok((current, entries))
    }

    async fn go_to_entry(&self, offset: isize) -> std::result::Result<(), PageError> {
        let (current, entries) = self.history().await?;
        let Some(index) = current.checked_add_signed(offset) else {
            return Ok(());
        };
        if let Some((entry_id, _)) = entries.get(index) {
            self.send_command(
                "Page.navigateToHistoryEntry",
                json!({ "entryId": entry_id }),
            )
            .await?;
        }
        Ok(())
    }
}

impl Connection {
    /// Send a CDP command and return its `result` object
    async fn send_command(&self, method: &str, params: Value) -> std::result::Result<Value, PageError> {
        let id = self.msg_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.responses.lock().await.insert(id, tx);

        let command = json!({
            "id": id,
            "method": method,
            "params": params
        });

        let sent = self
            .ws_tx
            .lock()
            .await
            .send(WsMessage::Text(command.to_string()))
            .await;
        if let Err(e) = sent {
            self.responses.lock().await.remove(&id);
            return Err(PageError::Transport(format!("Failed to send command: {}", e)));
        }

        let reply = match tokio::time::timeout(COMMAND_TIMEOUT, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => return Err(PageError::Closed),
            Err(_) => {
                self.responses.lock().await.remove(&id);
                return Err(PageError::Transport(format!("{} timed out", method)));
            }
        };

        if let Some(error) = reply.get("error") {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown CDP error");
            return Err(PageError::Transport(format!("{}: {}", method, message)));
        }

        Ok(reply.get("result").cloned().unwrap_or(Value::Null))
    }
}

/// `(requestId, url)` of a `Fetch.requestPaused` event
fn paused_request(event: &Value) -> Option<(&str, &str)> {
    if event.get("method").and_then(|m| m.as_str()) != Some("Fetch.requestPaused") {
        return None;
    }
    let params = event.get("params")?;
    let request_id = params.get("requestId").and_then(|i| i.as_str())?;
    let url = params
        .pointer("/request/url")
        .and_then(|u| u.as_str())
        .unwrap_or_default();
    Some((request_id, url))
}

fn logo_response(request_id: &str) -> Value {
    json!({
        "requestId": request_id,
        "responseCode": 200,
        "responseHeaders": [
            { "name": "Content-Type", "value": "image/svg+xml" },
            { "name": "Cache-Control", "value": "no-store" }
        ],
        "body": base64::engine::general_purpose::STANDARD.encode(LOGO_SVG.as_bytes())
    })
}

async fn serve_logos(
    conn: Arc<Connection>,
    mut events: mpsc::UnboundedReceiver<Value>,
    branding: Branding,
) {
    while let Some(event) = events.recv().await {
        let Some((request_id, url)) = paused_request(&event) else {
            continue;
        };
        let result = if branding.is_logo_request(url) {
            tracing::debug!("Replacing logo {}", url);
            conn.send_command("Fetch.fulfillRequest", logo_response(request_id))
                .await
        } else {
            conn.send_command("Fetch.continueRequest", json!({ "requestId": request_id }))
                .await
        };
        match result {
            Ok(_) => {}
            Err(PageError::Closed) => break,
            Err(e) => tracing::debug!("Paused request {} not resumed: {}", request_id, e),
        }
    }
}

#[async_trait]
impl PageHandle for CdpPage {
    async fn run_script(&self, code: &str) -> std::result::Result<Value, PageError> {
        let result = self
            .send_command(
                "Runtime.evaluate",
                json!({
                    "expression": code,
                    "returnByValue": true,
                    "awaitPromise": true
                }),
            )
            .await?;
        Self::remote_value(result)
    }

    async fn call_function(
        &self,
        declaration: &str,
        args: Vec<Value>,
    ) -> std::result::Result<Value, PageError> {
        let object_id = self.global_object().await?;
        let arguments: Vec<Value> = args.into_iter().map(|v| json!({ "value": v })).collect();
        let result = self
            .send_command(
                "Runtime.callFunctionOn",
                json!({
                    "functionDeclaration": declaration,
                    "objectId": object_id,
                    "arguments": arguments,
                    "objectGroup": CALL_GROUP,
                    "returnByValue": true,
                    "awaitPromise": true
                }),
            )
            .await;
        if let Err(e) = self
            .send_command("Runtime.releaseObjectGroup", json!({ "objectGroup": CALL_GROUP }))
            .await
        {
            tracing::debug!("Failed to release {}: {}", CALL_GROUP, e);
        }
        Self::remote_value(result?)
    }

    async fn current_url(&self) -> std::result::Result<String, PageError> {
        let (current, entries) = self.history().await?;
        Ok(entries
            .get(current)
            .map(|(_, url)| url.clone())
            .unwrap_or_default())
    }

    async fn load(&self, url: &str) -> std::result::Result<(), PageError> {
        let result = self
            .send_command("Page.navigate", json!({ "url": url }))
            .await?;
        if let Some(error) = result.get("errorText").and_then(|e| e.as_str()) {
            tracing::warn!("Navigation to {} reported {}", url, error);
        }
        tracing::info!("Navigated to: {}", url);
        Ok(())
    }

    async fn can_go_back(&self) -> std::result::Result<bool, PageError> {
        let (current, _) = self.history().await?;
        Ok(current > 0)
    }

    async fn can_go_forward(&self) -> std::result::Result<bool, PageError> {
        let (current, entries) = self.history().await?;
        Ok(current + 1 < entries.len())
    }

    async fn go_back(&self) -> std::result::Result<(), PageError> {
        self.go_to_entry(-1).await
    }

    async fn go_forward(&self) -> std::result::Result<(), PageError> {
        self.go_to_entry(1).await
    }

    async fn close(&self) -> std::result::Result<(), PageError> {
        let result = self.send_command("Page.close", json!({})).await;
        let _ = self.conn.ws_tx.lock().await.close().await;
        tracing::info!("CDP page {} closed", self.target_id);
        match result {
            Ok(_) | Err(PageError::Closed) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

impl Drop for CdpPage {
    fn drop(&mut self) {
        self.reader.abort();
        if let Some(task) = self.interceptor.lock().take() {
            task.abort();
        }
    }
}

/// A Chrome instance reachable on a remote debugging port
pub struct CdpBrowser {
    port: u16,
    http: reqwest::Client,
    /// Chrome process, when we launched it
    chrome: Option<Child>,
    /// Logo interception for every page we hand out
    branding: Option<Branding>,
}

impl CdpBrowser {
    /// Launch Chrome with CDP enabled and wait until it answers
    pub async fn launch(config: &BrowserConfig) -> Result<Self> {
        let user_data_dir = Self::user_data_dir(config);

        let mut cmd = Command::new(&config.chrome_path);
        cmd.arg(format!("--user-data-dir={}", user_data_dir.display()));
        cmd.arg(format!("--remote-debugging-port={}", config.cdp_port));
        cmd.arg(format!("--user-agent={}", config.user_agent));

        if config.headless {
            cmd.arg("--headless=new");
            cmd.arg("--disable-gpu");
        }

        // Disable some features that might interfere
        cmd.arg("--no-first-run");
        cmd.arg("--no-default-browser-check");
        cmd.arg("--disable-sync");

        // Start about:blank to avoid loading a page
        cmd.arg("about:blank");

        let child = cmd.spawn().map_err(|e| {
            AstaError::Browser(format!(
                "Failed to launch Chrome at {:?}: {}",
                config.chrome_path, e
            ))
        })?;
        tracing::info!("Launched Chrome (pid {})", child.id());

        let browser = Self {
            port: config.cdp_port,
            http: reqwest::Client::new(),
            chrome: Some(child),
            branding: None,
        };
        browser.wait_ready().await?;
        Ok(browser)
    }

    /// Replace the search engine's logos on every page opened from now on.
    pub fn with_branding(mut self, branding: Branding) -> Self {
        self.branding = Some(branding);
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    async fn wait_ready(&self) -> Result<()> {
        const MAX_RETRIES: u32 = 30;
        let mut last_error = String::new();

        for retry in 1..=MAX_RETRIES {
            match self.http.get(self.endpoint("/json/version")).send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::info!("DevTools endpoint ready on port {}", self.port);
                    return Ok(());
                }
                Ok(response) => last_error = format!("HTTP error: {}", response.status()),
                Err(e) => last_error = format!("Connection error: {}", e),
            }
            tracing::debug!("Retry {}/{}: {}", retry, MAX_RETRIES, last_error);
            tokio::time::sleep(Duration::from_millis(500)).await;
        }

        Err(AstaError::Browser(format!(
            "Failed to reach Chrome after {} retries: {}",
            MAX_RETRIES, last_error
        )))
    }

    /// Open a new page target showing `url`
    pub async fn new_page(&self, url: &str) -> Result<CdpPage> {
        // Start blank so interception is in place before the first request
        let target: Value = self
            .http
            .put(self.endpoint(&new_target_path("about:blank")))
            .send()
            .await
            .map_err(|e| AstaError::Browser(format!("Failed to open target: {}", e)))?
            .json()
            .await
            .map_err(|e| AstaError::Browser(format!("Failed to parse target: {}", e)))?;
        let page = self.prepare(Self::connect_target(&target).await?).await;
        page.load(url)
            .await
            .map_err(|e| AstaError::Browser(format!("Failed to load {}: {}", url, e)))?;
        Ok(page)
    }

    /// Connect to the first existing page target
    pub async fn first_page(&self) -> Result<CdpPage> {
        let targets: Value = self
            .http
            .get(self.endpoint("/json/list"))
            .send()
            .await
            .map_err(|e| AstaError::Browser(format!("Failed to list targets: {}", e)))?
            .json()
            .await
            .map_err(|e| AstaError::Browser(format!("Failed to parse targets: {}", e)))?;

        let target = targets
            .as_array()
            .and_then(|arr| {
                arr.iter()
                    .find(|t| t.get("type").and_then(|v| v.as_str()) == Some("page"))
            })
            .ok_or_else(|| AstaError::Browser("No page target found".to_string()))?;
        let page = Self::connect_target(target).await?;
        Ok(self.prepare(page).await)
    }

    async fn prepare(&self, page: CdpPage) -> CdpPage {
        if let Some(branding) = &self.branding {
            if let Err(e) = page.intercept_logos(branding.clone()).await {
                tracing::warn!("Logo interception unavailable: {}", e);
            }
        }
        page
    }

    async fn connect_target(target: &Value) -> Result<CdpPage> {
        let id = target
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string();
        let ws_url = target
            .get("webSocketDebuggerUrl")
            .and_then(|v| v.as_str())
            .ok_or_else(|| AstaError::Browser("No webSocketDebuggerUrl in page target".to_string()))?;
        tracing::info!("Connecting to page target WebSocket: {}", ws_url);
        CdpPage::connect(id, ws_url).await
    }

    /// Kill Chrome if we started it
    pub fn shutdown(&mut self) {
        if let Some(mut child) = self.chrome.take() {
            if let Err(e) = child.kill() {
                tracing::warn!("Failed to stop Chrome: {}", e);
            }
            let _ = child.wait();
            tracing::info!("Chrome stopped");
        }
    }

    /// Profile directory used for `config`
    pub fn user_data_dir(config: &BrowserConfig) -> PathBuf {
        config
            .user_data_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("asta-profile"))
    }
}

/// `/json/new` unescapes its query once, so the target URL is escaped first.
fn new_target_path(url: &str) -> String {
    format!("/json/new?{}", utf8_percent_encode(url, NON_ALPHANUMERIC))
}

#[async_trait]
impl PageFactory for CdpBrowser {
    async fn open(&self, url: &str) -> Result<Arc<dyn PageHandle>> {
        let page = self.new_page(url).await?;
        Ok(Arc::new(page))
    }
}

impl Drop for CdpBrowser {
    fn drop(&mut self) {
        // Ensure Chrome is killed when the browser handle is dropped
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_value_extracts_value() {
        let result = json!({ "result": { "type": "number", "value": 2 } });
        assert_eq!(CdpPage::remote_value(result).unwrap(), json!(2));

        let undefined = json!({ "result": { "type": "undefined" } });
        assert_eq!(CdpPage::remote_value(undefined).unwrap(), Value::Null);
    }

    #[test]
    fn test_remote_value_reports_exception() {
        let result = json!({
            "result": { "type": "object", "subtype": "error" },
            "exceptionDetails": {
                "text": "Uncaught",
                "exception": { "description": "ReferenceError: foo is not defined" }
            }
        });
        assert_eq!(
            CdpPage::remote_value(result),
            Err(PageError::script("ReferenceError: foo is not defined"))
        );
    }

    #[test]
    fn test_new_target_path_keeps_query_intact() {
        let path = new_target_path("https://search.brave.com/search?q=rust%20%26%20tokio");
        assert_eq!(
            path,
            "/json/new?https%3A%2F%2Fsearch%2Ebrave%2Ecom%2Fsearch%3Fq%3Drust%2520%2526%2520tokio"
        );
        assert!(!path["/json/new?".len()..].contains('&'));
        assert_eq!(new_target_path("about:blank"), "/json/new?about%3Ablank");
    }

    #[test]
    fn test_paused_request_fields() {
        let event = json!({
            "method": "Fetch.requestPaused",
            "params": {
                "requestId": "interception-7",
                "request": { "url": "https://cdn.search.brave.com/brave-logo-light.svg" }
            }
        });
        assert_eq!(
            paused_request(&event),
            Some(("interception-7", "https://cdn.search.brave.com/brave-logo-light.svg"))
        );

        let other = json!({ "method": "Page.loadEventFired", "params": {} });
        assert_eq!(paused_request(&other), None);
    }

    #[test]
    fn test_logo_response_serves_svg() {
        let response = logo_response("interception-7");
        assert_eq!(response["requestId"], "interception-7");
        assert_eq!(response["responseCode"], 200);
        assert_eq!(response["responseHeaders"][0]["value"], "image/svg+xml");

        let body = base64::engine::general_purpose::STANDARD
            .decode(response["body"].as_str().unwrap())
            .unwrap();
        assert_eq!(String::from_utf8(body).unwrap(), LOGO_SVG);
    }

    #[test]
    fn test_user_data_dir_default() {
        let config = BrowserConfig::default();
        assert!(CdpBrowser::user_data_dir(&config).ends_with("asta-profile"));
    }
}
