//! Development server with live reload support.
//!
//! Built on `tiny_http` for static files and `tungstenite` for the reload
//! socket:
//!
//! - Static file serving from `[serve] root` (the theme directory by default)
//! - A reload client injected into every served HTML page
//! - Automatic `index.html` resolution and a plain directory listing
//! - Build notifications broadcast to every connected browser
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐   ┌──────────────────┐   ┌──────────────────────┐
//! │   HTTP Thread   │   │  Accept Thread   │   │ Client Thread (each) │
//! │  (tiny_http)    │   │  (reload port)   │──▶│ broadcast ──▶ socket │
//! └─────────────────┘   └──────────────────┘   └──────────▲───────────┘
//!                                                         │
//!                                LiveReload::{notify, reload} (watch tasks)
//! ```

use crate::{config::ThemeConfig, debug, log};
use anyhow::{Context, Result};
use serde::Serialize;
use std::{
    fs,
    io::{self, Cursor},
    net::{IpAddr, SocketAddr, TcpListener, TcpStream},
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};
use tiny_http::{Header, Request, Response, Server, StatusCode};
use tokio::sync::broadcast;
use tungstenite::Message;

/// Try binding to port, retry with incremented port if in use
const MAX_PORT_RETRIES: u16 = 10;

const ACCEPT_POLL: Duration = Duration::from_millis(100);

/// Reload client, `{port}` is replaced with the reload port.
const RELOAD_CLIENT: &str = r#"<script>
(() => {
  const ws = new WebSocket(`ws://${location.hostname}:{port}`);
  ws.onmessage = (event) => {
    const msg = JSON.parse(event.data);
    if (msg.type === "notify") {
      console.info("[themewright]", msg.message, `${msg.durationMs}ms`);
    } else if (msg.type === "reload" && msg.path && msg.path.endsWith(".css")) {
      for (const link of document.querySelectorAll('link[rel="stylesheet"]')) {
        const url = new URL(link.href);
        url.searchParams.set("t", Date.now());
        link.href = url.toString();
      }
    } else if (msg.type === "reload") {
      location.reload();
    }
  };
})();
</script>"#;

// ============================================================================
// Live Reload Channel
// ============================================================================

/// Payload sent to browsers as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ReloadMessage {
    Reload {
        path: Option<String>,
    },
    Notify {
        message: String,
        #[serde(rename = "durationMs")]
        duration_ms: u64,
    },
}

#[derive(Debug, Clone)]
enum Signal {
    Send(ReloadMessage),
    Close,
}

/// Fire-and-forget notifications to connected browsers.
#[derive(Debug, Clone)]
pub struct LiveReload {
    tx: broadcast::Sender<Signal>,
}

impl Default for LiveReload {
    fn default() -> Self {
        Self::new()
    }
}

impl LiveReload {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self { tx }
    }

    pub fn notify(&self, message: &str, duration: Duration) {
        self.send(Signal::Send(ReloadMessage::Notify {
            message: message.to_string(),
            duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        }));
    }

    /// Ask browsers to reload; a `.css` path swaps stylesheets in place.
    pub fn reload(&self, path: Option<&Path>) {
        self.send(Signal::Send(ReloadMessage::Reload {
            path: path.map(|p| p.to_string_lossy().replace('\\', "/")),
        }));
    }

    fn close_clients(&self) {
        self.send(Signal::Close);
    }

    fn send(&self, signal: Signal) {
        // No subscribers is normal: no browser connected yet
        let _ = self.tx.send(signal);
    }

    fn subscribe(&self) -> broadcast::Receiver<Signal> {
        self.tx.subscribe()
    }
}

// ============================================================================
// Server Lifecycle
// ============================================================================

/// A running dev server. Dropping it without [`DevServer::stop`] leaks the threads.
pub struct DevServer {
    addr: SocketAddr,
    http: Arc<Server>,
    http_thread: JoinHandle<()>,
    accept_thread: JoinHandle<()>,
    stopping: Arc<AtomicBool>,
    reload: LiveReload,
}

impl DevServer {
    /// Bind both ports and start serving.
    pub fn start(config: &ThemeConfig, reload: LiveReload) -> Result<Self> {
        let interface: IpAddr = config
            .serve
            .interface
            .parse()
            .with_context(|| format!("Invalid [serve.interface] `{}`", config.serve.interface))?;

        let (server, addr) = try_bind_port(interface, config.serve.port, MAX_PORT_RETRIES)?;
        let listener = TcpListener::bind((interface, config.serve.reload_port)).with_context(|| {
            format!("Failed to bind reload port {}", config.serve.reload_port)
        })?;
        listener.set_nonblocking(true)?;
        let reload_port = listener.local_addr()?.port();

        let http = Arc::new(server);
        let stopping = Arc::new(AtomicBool::new(false));

        let site = Site {
            root: config.serve.root.clone(),
            client: RELOAD_CLIENT.replace("{port}", &reload_port.to_string()),
        };
        let http_thread = {
            let http = Arc::clone(&http);
            thread::spawn(move || {
                for request in http.incoming_requests() {
                    if let Err(e) = site.handle(request) {
                        log!("serve"; "request error: {e}");
                    }
                }
            })
        };

        let accept_thread = {
            let stopping = Arc::clone(&stopping);
            let reload = reload.clone();
            thread::spawn(move || accept_clients(&listener, &stopping, &reload))
        };

        log!("serve"; "http://{addr}");
        Ok(Self {
            addr,
            http,
            http_thread,
            accept_thread,
            stopping,
            reload,
        })
    }

    pub const fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Close every connection and join the server threads. Blocking.
    pub fn stop(self) {
        self.stopping.store(true, Ordering::SeqCst);
        self.http.unblock();
        self.reload.close_clients();

        if self.http_thread.join().is_err() || self.accept_thread.join().is_err() {
            log!("error"; "dev server thread panicked");
        }
    }
}

/// Try to bind to a port, retrying with incremented port numbers if in use.
fn try_bind_port(interface: IpAddr, base_port: u16, max_retries: u16) -> Result<(Server, SocketAddr)> {
    let mut last_err = None;

    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        let addr = SocketAddr::new(interface, port);

        match Server::http(addr) {
            Ok(server) => {
                if offset > 0 {
                    log!("serve"; "port {} in use, using {} instead", base_port, port);
                }
                let addr = server.server_addr().to_ip().unwrap_or(addr);
                return Ok((server, addr));
            }
            Err(e) => last_err = Some(e),
        }
    }

    Err(anyhow::anyhow!(
        "Failed to bind after {} attempts (ports {}-{}): {}",
        max_retries,
        base_port,
        base_port.saturating_add(max_retries.saturating_sub(1)),
        last_err.map(|e| e.to_string()).unwrap_or_default()
    ))
}

// ============================================================================
// Reload Socket
// ============================================================================

fn accept_clients(listener: &TcpListener, stopping: &AtomicBool, reload: &LiveReload) {
    while !stopping.load(Ordering::SeqCst) {
        match listener.accept() {
            Ok((stream, peer)) => {
                debug!("serve"; "reload client {peer}");
                let rx = reload.subscribe();
                thread::spawn(move || {
                    if let Err(e) = serve_client(stream, rx) {
                        debug!("serve"; "reload client {peer} gone: {e}");
                    }
                });
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
            Err(e) => {
                log!("serve"; "reload socket error: {e}");
                thread::sleep(ACCEPT_POLL);
            }
        }
    }
}

fn serve_client(stream: TcpStream, mut rx: broadcast::Receiver<Signal>) -> Result<()> {
    stream.set_nonblocking(false)?;
    let mut socket = tungstenite::accept(stream).map_err(|e| anyhow::anyhow!("handshake: {e}"))?;

    loop {
        match rx.blocking_recv() {
            Ok(Signal::Send(message)) => {
                let json = serde_json::to_string(&message)?;
                socket.send(Message::text(json))?;
            }
            Ok(Signal::Close) | Err(broadcast::error::RecvError::Closed) => {
                let _ = socket.close(None);
                let _ = socket.flush();
                return Ok(());
            }
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
        }
    }
}

// ============================================================================
// Request Handling
// ============================================================================

struct Site {
    root: PathBuf,
    client: String,
}

impl Site {
    /// Request resolution order:
    /// 1. Exact file match → serve file (HTML gets the reload client)
    /// 2. Directory with index.html → serve index.html
    /// 3. Directory without index.html → generate listing
    /// 4. Nothing found → 404
    fn handle(&self, request: Request) -> Result<()> {
        let url_path = urlencoding::decode(request.url())
            .map(std::borrow::Cow::into_owned)
            .unwrap_or_default();

        // Strip query string (e.g., ?t=123456) before resolving path
        let path_without_query = url_path.split('?').next().unwrap_or(&url_path);
        let request_path = path_without_query.trim_matches('/');

        // No escaping the served root
        if request_path.split('/').any(|seg| seg == "..") {
            return serve_status(request, 403, "403 Forbidden");
        }
        let local_path = self.root.join(request_path);

        if local_path.is_file() {
            return self.serve_file(request, &local_path);
        }

        if local_path.is_dir() {
            let index_path = local_path.join("index.html");
            if index_path.is_file() {
                return self.serve_file(request, &index_path);
            }
            if let Ok(listing) = directory_listing(&local_path, request_path) {
                return self.serve_html(request, listing);
            }
        }

        serve_status(request, 404, "404 Not Found")
    }

    fn serve_file(&self, request: Request, path: &Path) -> Result<()> {
        let content = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let content_type = guess_content_type(path);

        if content_type.starts_with("text/html") {
            return self.serve_html(request, String::from_utf8_lossy(&content).into_owned());
        }

        let response = Response::from_data(content).with_header(header(content_type));
        request.respond(response)?;
        Ok(())
    }

    fn serve_html(&self, request: Request, content: String) -> Result<()> {
        let response = Response::from_string(inject_client(&content, &self.client))
            .with_header(header("text/html; charset=utf-8"));
        request.respond(response)?;
        Ok(())
    }
}

fn header(content_type: &'static str) -> Header {
    Header::from_bytes("Content-Type", content_type).expect("static content types are ASCII")
}

fn serve_status(request: Request, code: u16, body: &'static str) -> Result<()> {
    let response = Response::new(
        StatusCode(code),
        vec![header("text/plain")],
        Cursor::new(body),
        Some(body.len()),
        None,
    );
    request.respond(response)?;
    Ok(())
}

/// Insert the reload client before `</body>`, or append it.
fn inject_client(html: &str, client: &str) -> String {
    match html.rfind("</body>") {
        Some(pos) => format!("{}{client}{}", &html[..pos], &html[pos..]),
        None => format!("{html}{client}"),
    }
}

/// Guess MIME content type from file extension.
///
/// Returns `application/octet-stream` for unknown extensions.
fn guess_content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        // Web content
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "application/javascript; charset=utf-8",
        Some("json") => "application/json; charset=utf-8",
        Some("map") => "application/json; charset=utf-8",

        // Images
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("avif") => "image/avif",
        Some("ico") => "image/x-icon",

        // Fonts
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("otf") => "font/otf",

        Some("txt" | "log") => "text/plain; charset=utf-8",

        // Default binary
        _ => "application/octet-stream",
    }
}

/// Plain listing of visible entries, directories first.
fn directory_listing(dir: &Path, request_path: &str) -> io::Result<String> {
    let mut entries: Vec<(bool, String)> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| {
            let is_dir = entry.file_type().is_ok_and(|t| t.is_dir());
            (is_dir, entry.file_name().to_string_lossy().into_owned())
        })
        .filter(|(_, name)| !name.starts_with('.'))
        .collect();
    entries.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));

    let prefix = if request_path.is_empty() {
        String::new()
    } else {
        format!("/{request_path}")
    };

    let mut items: Vec<String> = Vec::with_capacity(entries.len() + 1);
    if !request_path.is_empty() {
        let parent = Path::new(request_path)
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        items.push(format!(r#"<li><a href="/{parent}">..</a></li>"#));
    }
    for (is_dir, name) in entries {
        let slash = if is_dir { "/" } else { "" };
        items.push(format!(
            r#"<li><a href="{prefix}/{href}">{name}{slash}</a></li>"#,
            href = urlencoding::encode(&name)
        ));
    }

    Ok(format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>/{request_path}</title></head>\n<body><h1>/{request_path}</h1><ul>\n{}\n</ul></body></html>",
        items.join("\n")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_inject_client() {
        let html = "<html><body><p>x</p></body></html>";
        let out = inject_client(html, "<script></script>");
        assert_eq!(out, "<html><body><p>x</p><script></script></body></html>");
        assert_eq!(inject_client("<p>", "<s>"), "<p><s>");
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type(Path::new("a.css")), "text/css; charset=utf-8");
        assert_eq!(guess_content_type(Path::new("a.woff2")), "font/woff2");
        assert_eq!(guess_content_type(Path::new("a.bin")), "application/octet-stream");
    }

    #[test]
    fn test_reload_message_json() {
        let json = serde_json::to_string(&ReloadMessage::Reload {
            path: Some("dist/css/main.css".into()),
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"reload","path":"dist/css/main.css"}"#);

        let json = serde_json::to_string(&ReloadMessage::Notify {
            message: "styles: main".into(),
            duration_ms: 12,
        })
        .unwrap();
        assert_eq!(json, r#"{"type":"notify","message":"styles: main","durationMs":12}"#);
    }

    #[test]
    fn test_live_reload_broadcast() {
        let reload = LiveReload::new();
        // no subscribers: silently dropped
        reload.reload(None);

        let mut rx = reload.subscribe();
        reload.notify("scripts: app", Duration::from_millis(40));
        reload.reload(Some(Path::new("dist/css/main.css")));

        assert!(matches!(
            rx.try_recv().unwrap(),
            Signal::Send(ReloadMessage::Notify { duration_ms: 40, .. })
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            Signal::Send(ReloadMessage::Reload { path: Some(_) })
        ));
    }

    #[test]
    fn test_directory_listing() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("parts")).unwrap();
        fs::write(dir.path().join("index.php"), "").unwrap();
        fs::write(dir.path().join(".hidden"), "").unwrap();

        let html = directory_listing(dir.path(), "").unwrap();
        assert!(html.contains(r#"<a href="/parts">parts/</a>"#));
        assert!(html.contains("index.php"));
        assert!(!html.contains(".hidden"));
        assert!(html.find("parts/").unwrap() < html.find("index.php").unwrap());
    }

    #[test]
    fn test_server_start_and_stop() {
        let dir = TempDir::new().unwrap();
        let mut config = ThemeConfig::default();
        config.serve.port = 0;
        config.serve.reload_port = 0;
        config.serve.root = dir.path().to_path_buf();

        let server = DevServer::start(&config, LiveReload::new()).unwrap();
        assert_ne!(server.addr().port(), 0);
        server.stop();
    }
}
