//! # 端到端测试
//!
//! 在随机端口上启动完整的中间件服务，通过原始 TCP 报文验证静态资源、挂载路径、
//! 压缩协商与错误处理。

use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use ssr_middleware::{
    chain::{Flow, Handler},
    error_page::RouteDescriptor,
    exception::HandlerError,
    middleware::{Collaborators, MiddlewareOptions},
    param::{CACHE_CONTROL_IMMUTABLE, CACHE_CONTROL_NO_CACHE},
    server, ExtensionMime, FsAssetStore, IdentityTranslator, PageRenderer, Request, Response,
    ShellRenderer, StackTranslator,
};

/// 构建目录：`client/app.js` 与 `client/style.css`
fn build_dir() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(dir.path().join("client")).unwrap();
    std::fs::write(dir.path().join("client/app.js"), "console.log('app');\n".repeat(64)).unwrap();
    std::fs::write(dir.path().join("client/style.css"), "body { margin: 0 }").unwrap();
    dir
}

fn collaborators(dir: &Path) -> Collaborators {
    Collaborators {
        store: Arc::new(FsAssetStore::new(dir)),
        mime: Arc::new(ExtensionMime),
        build_dir: dir.to_path_buf(),
        server_routes: None,
        pages: None,
        renderer: Some(Arc::new(ShellRenderer::default())),
        translator: Arc::new(IdentityTranslator),
        announce: None,
    }
}

/// 在 127.0.0.1 的随机端口上启动服务，返回端口号
async fn spawn_server(app: Handler, base_path: Option<&str>) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let base_path = base_path.map(str::to_string);
    tokio::spawn(server::serve(listener, app, base_path));
    port
}

async fn send_request(port: u16, request: &str) -> Vec<u8> {
    let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();

    let mut buffer = vec![];
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut buffer))
        .await
        .unwrap()
        .unwrap();
    buffer
}

fn get(path: &str) -> String {
    format!("GET {} HTTP/1.1\r\nHost: localhost\r\nUser-Agent: it\r\n\r\n", path)
}

struct Parsed {
    status: u16,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Parsed {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }
}

fn parse_response(raw: &[u8]) -> Parsed {
    let split = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("response has no header terminator");
    let head = String::from_utf8_lossy(&raw[..split]).to_string();
    let mut lines = head.split("\r\n");

    let status = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse().ok())
        .unwrap_or(0);
    let headers = lines
        .filter_map(|line| line.split_once(": "))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

    Parsed {
        status,
        headers,
        body: raw[split + 4..].to_vec(),
    }
}

#[tokio::test]
async fn test_client_asset_in_production() {
    let dir = build_dir();
    let app = ssr_middleware::middleware(MiddlewareOptions::default(), collaborators(dir.path()));
    let port = spawn_server(app, None).await;

    let res = parse_response(&send_request(port, &get("/client/app.js")).await);

    assert_eq!(res.status, 200);
    assert_eq!(res.header("Content-Type"), Some("text/javascript;charset=utf-8"));
    assert_eq!(res.header("Cache-Control"), Some(CACHE_CONTROL_IMMUTABLE));
    assert_eq!(res.body, std::fs::read(dir.path().join("client/app.js")).unwrap());
    assert_eq!(res.header("Server"), Some("ssr-middleware"));
    assert!(res.header("Date").is_some());
}

#[tokio::test]
async fn test_client_asset_in_development() {
    let dir = build_dir();
    let options = MiddlewareOptions {
        dev: true,
        ..Default::default()
    };
    let app = ssr_middleware::middleware(options, collaborators(dir.path()));
    let port = spawn_server(app, None).await;

    let res = parse_response(&send_request(port, &get("/client/app.js")).await);
    assert_eq!(res.status, 200);
    assert_eq!(res.header("Cache-Control"), Some(CACHE_CONTROL_NO_CACHE));

    // 开发模式不缓存，文件修改立即可见
    std::fs::write(dir.path().join("client/app.js"), "changed").unwrap();
    let res = parse_response(&send_request(port, &get("/client/app.js")).await);
    assert_eq!(res.text(), "changed");
}

#[tokio::test]
async fn test_production_cache_survives_file_changes() {
    let dir = build_dir();
    let app = ssr_middleware::middleware(MiddlewareOptions::default(), collaborators(dir.path()));
    let port = spawn_server(app, None).await;

    let first = parse_response(&send_request(port, &get("/client/style.css")).await);
    std::fs::write(dir.path().join("client/style.css"), "changed").unwrap();
    let second = parse_response(&send_request(port, &get("/client/style.css")).await);

    assert_eq!(first.body, second.body);
    assert_eq!(second.text(), "body { margin: 0 }");
}

#[tokio::test]
async fn test_gzip_negotiation_and_head() {
    let dir = build_dir();
    let app = ssr_middleware::middleware(MiddlewareOptions::default(), collaborators(dir.path()));
    let port = spawn_server(app, None).await;

    let request = "GET /client/app.js HTTP/1.1\r\nHost: localhost\r\nAccept-Encoding: gzip\r\n\r\n";
    let res = parse_response(&send_request(port, request).await);
    assert_eq!(res.header("Content-Encoding"), Some("gzip"));
    let mut decoded = String::new();
    flate2::read::GzDecoder::new(&res.body[..])
        .read_to_string(&mut decoded)
        .unwrap();
    assert_eq!(decoded, "console.log('app');\n".repeat(64));

    let request = "HEAD /client/style.css HTTP/1.1\r\nHost: localhost\r\n\r\n";
    let res = parse_response(&send_request(port, request).await);
    assert_eq!(res.status, 200);
    assert_eq!(res.header("Content-Length"), Some("18"));
    assert!(res.body.is_empty());
}

#[tokio::test]
async fn test_unclaimed_and_missing_paths_are_404() {
    let dir = build_dir();
    let app = ssr_middleware::middleware(MiddlewareOptions::default(), collaborators(dir.path()));
    let port = spawn_server(app, None).await;

    for path in ["/about", "/client/missing.js", "/client/"] {
        let res = parse_response(&send_request(port, &get(path)).await);
        assert_eq!(res.status, 404, "{}", path);
    }
}

#[tokio::test]
async fn test_mounted_under_base_path() {
    let dir = build_dir();
    let announced: Arc<std::sync::Mutex<Vec<String>>> = Default::default();
    let sink = Arc::clone(&announced);
    let mut parts = collaborators(dir.path());
    parts.announce = Some(Arc::new(move |base: &str| {
        sink.lock().unwrap().push(base.to_string());
    }));
    let app = ssr_middleware::middleware(MiddlewareOptions::default(), parts);
    let port = spawn_server(app, Some("/app")).await;

    let res = parse_response(&send_request(port, &get("/app/client/style.css")).await);
    assert_eq!(res.status, 200);
    assert_eq!(res.text(), "body { margin: 0 }");

    let res = parse_response(&send_request(port, &get("/client/style.css")).await);
    assert_eq!(res.status, 404);

    parse_response(&send_request(port, &get("/app/client/app.js")).await);
    assert_eq!(*announced.lock().unwrap(), vec!["/app".to_string()]);
}

/// 总是失败的渲染器，用于触发兜底输出
struct BrokenRenderer;

#[async_trait]
impl PageRenderer for BrokenRenderer {
    async fn render(
        &self,
        _route: &RouteDescriptor,
        _req: &mut Request,
        _res: &mut Response,
        _error: Option<&HandlerError>,
    ) -> Result<(), HandlerError> {
        Err(HandlerError::new("renderer exploded"))
    }
}

struct SuffixTranslator;

impl StackTranslator for SuffixTranslator {
    fn translate(&self, raw_stack: &str) -> String {
        raw_stack.replace("bundle.js:1:200", "src/routes/blog.svelte:12:3")
    }
}

fn failing_route(status: u16) -> Option<Handler> {
    Some(Handler::from_fn(move |req, _| match req.path() {
        "/blog" => Flow::Error(
            HandlerError::new("no such post")
                .with_status(status)
                .with_stack("at load (bundle.js:1:200)"),
        ),
        _ => Flow::Next,
    }))
}

#[tokio::test]
async fn test_error_fallback_in_production() {
    let dir = build_dir();
    let mut parts = collaborators(dir.path());
    parts.server_routes = failing_route(404);
    parts.renderer = Some(Arc::new(BrokenRenderer));
    let app = ssr_middleware::middleware(MiddlewareOptions::default(), parts);
    let port = spawn_server(app, None).await;

    let res = parse_response(&send_request(port, &get("/blog")).await);
    assert_eq!(res.status, 404);
    assert_eq!(res.text(), "Not found");
}

#[tokio::test]
async fn test_error_fallback_in_development_shows_translated_stack() {
    let dir = build_dir();
    let mut parts = collaborators(dir.path());
    parts.server_routes = failing_route(500);
    parts.renderer = Some(Arc::new(BrokenRenderer));
    parts.translator = Arc::new(SuffixTranslator);
    let options = MiddlewareOptions {
        dev: true,
        ..Default::default()
    };
    let app = ssr_middleware::middleware(options, parts);
    let port = spawn_server(app, None).await;

    let res = parse_response(&send_request(port, &get("/blog")).await);
    assert_eq!(res.status, 500);
    assert_eq!(res.header("Content-Type"), Some("text/plain"));
    assert!(res.text().contains("no such post"));
    assert!(res.text().contains("src/routes/blog.svelte:12:3"));
    assert!(!res.text().contains("bundle.js"));
}

#[tokio::test]
async fn test_uncaught_error_without_bail_out() {
    let dir = build_dir();
    let mut parts = collaborators(dir.path());
    parts.server_routes = failing_route(503);
    parts.renderer = None;
    let options = MiddlewareOptions {
        catch_errors: false,
        ..Default::default()
    };
    let app = ssr_middleware::middleware(options, parts);
    let port = spawn_server(app, None).await;

    let res = parse_response(&send_request(port, &get("/blog")).await);
    assert_eq!(res.status, 503);
    assert!(!res.text().contains("no such post"));
}

#[tokio::test]
async fn test_malformed_request_is_400() {
    let dir = build_dir();
    let app = ssr_middleware::middleware(MiddlewareOptions::default(), collaborators(dir.path()));
    let port = spawn_server(app, None).await;

    let res = parse_response(&send_request(port, "GARBAGE\r\n\r\n").await);
    assert_eq!(res.status, 400);
}

/// 客户端在收到响应前断开，写入失败只记录日志，服务继续处理后续连接
#[tokio::test]
async fn test_client_disconnect_before_response() {
    let dir = build_dir();
    let app = ssr_middleware::middleware(MiddlewareOptions::default(), collaborators(dir.path()));
    let port = spawn_server(app, None).await;

    for request in ["GARBAGE\r\n\r\n".to_string(), get("/client/app.js")] {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream.write_all(request.as_bytes()).await.unwrap();
        drop(stream);
    }

    let res = parse_response(&send_request(port, &get("/client/style.css")).await);
    assert_eq!(res.status, 200);
    assert_eq!(res.text(), "body { margin: 0 }");
}
