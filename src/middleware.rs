//! # 中间件装配
//!
//! 按固定顺序把各个处理器组合为对外暴露的单一入口：
//! 1. 请求准备（计算 `base_url` 与 `path`，首次请求时公布挂载路径）；
//! 2. `/service-worker.js` 及其 `.map`（仅当构建目录中存在时注册）；
//! 3. `/client/` 前缀下的静态资源；
//! 4. 服务端路由与页面处理器（由调用方提供）；
//! 5. 错误页渲染与兜底处理器。

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};

use crate::{
    assets::{AssetMode, AssetSelector, AssetStore, MimeResolver, StaticAssets},
    bail::BailOut,
    chain::{compose, ErrorMiddleware, Flow, Handler, Middleware},
    error_page::{ErrorPage, PageRenderer, StackTranslator},
    exception::HandlerError,
    ignore::IgnoreSpec,
    param::*,
    request::{strip_query, Request},
    response::Response,
};

/// 会话数据提供函数，结果随页面一起序列化
pub type SessionFn = Arc<dyn Fn(&Request, &Response) -> serde_json::Value + Send + Sync>;

/// 挂载路径公布回调
pub type Announcer = Arc<dyn Fn(&str) + Send + Sync>;

/// 未提供会话函数时使用，始终返回 `null`
pub fn noop_session() -> SessionFn {
    Arc::new(|_, _| serde_json::Value::Null)
}

/// 由会话函数构建页面处理器
pub trait PageHandlerFactory: Send + Sync {
    fn build(&self, session: SessionFn) -> Handler;
}

/// 请求准备处理器
pub struct Prepare {
    announce: Option<Announcer>,
    announced: AtomicBool,
}

impl Prepare {
    pub fn new(announce: Option<Announcer>) -> Self {
        Self {
            announce,
            announced: AtomicBool::new(false),
        }
    }

    pub fn into_handler(self) -> Handler {
        Handler::normal(self)
    }
}

/// 由挂载前的原始目标与相对目标推出挂载前缀。
///
/// `url` 为 `/` 而原始目标不以 `/` 结尾时（如 `/app`），先补上斜杠再截取。
pub fn base_url_of(original_url: Option<&str>, url: &str) -> String {
    let mut original = original_url.unwrap_or(url).to_string();
    if url == "/" && !original.ends_with('/') {
        original.push('/');
    }
    let end = original.len().saturating_sub(url.len());
    original.get(..end).unwrap_or_default().to_string()
}

#[async_trait]
impl Middleware for Prepare {
    async fn handle(&self, req: &mut Request, _res: &mut Response) -> Flow {
        if req.base_url().is_none() {
            let base_url = base_url_of(req.original_url(), req.url());
            req.set_base_url(base_url);
        }
        if !req.has_path() {
            let path = strip_query(req.url()).to_string();
            req.set_path(path);
        }

        if let Some(announce) = &self.announce {
            if !self.announced.swap(true, Ordering::SeqCst) {
                let base_url = req.base_url().unwrap_or_default();
                info!("[ID{}]公布挂载路径: '{}'", req.id(), base_url);
                announce(base_url);
            }
        }
        Flow::Next
    }
}

/// 只在错误模式下介入的错误页；无错误时放行给后续处理器。
struct OnError(ErrorPage);

#[async_trait]
impl ErrorMiddleware for OnError {
    async fn handle(
        &self,
        error: Option<HandlerError>,
        req: &mut Request,
        res: &mut Response,
    ) -> Flow {
        match error {
            Some(e) => self.0.handle(Some(e), req, res).await,
            None => Flow::Next,
        }
    }
}

pub struct MiddlewareOptions {
    pub session: Option<SessionFn>,
    pub ignore: Option<IgnoreSpec>,
    pub catch_errors: bool,
    /// 诊断模式：资源不缓存，错误输出包含详情
    pub dev: bool,
    pub error_component: String,
}

impl Default for MiddlewareOptions {
    fn default() -> Self {
        Self {
            session: None,
            ignore: None,
            catch_errors: true,
            dev: false,
            error_component: "_error".to_string(),
        }
    }
}

/// 装配所需的外部协作者
pub struct Collaborators {
    pub store: Arc<dyn AssetStore>,
    pub mime: Arc<dyn MimeResolver>,
    /// 用于在装配时探测 service worker 文件是否存在
    pub build_dir: PathBuf,
    pub server_routes: Option<Handler>,
    pub pages: Option<Arc<dyn PageHandlerFactory>>,
    pub renderer: Option<Arc<dyn PageRenderer>>,
    pub translator: Arc<dyn StackTranslator>,
    pub announce: Option<Announcer>,
}

/// 装配完整的中间件入口。
pub fn middleware(options: MiddlewareOptions, collaborators: Collaborators) -> Handler {
    let Collaborators {
        store,
        mime,
        build_dir,
        server_routes,
        pages,
        renderer,
        translator,
        announce,
    } = collaborators;
    let mode = match options.dev {
        true => AssetMode::Uncached,
        false => AssetMode::Cached,
    };

    let mut handlers = vec![Prepare::new(announce).into_handler()];

    for worker_file in [SERVICE_WORKER, SERVICE_WORKER_MAP] {
        if build_dir.join(worker_file.trim_start_matches('/')).is_file() {
            debug!("注册{}", worker_file);
            handlers.push(
                StaticAssets::new(
                    AssetSelector::exact(worker_file),
                    CACHE_CONTROL_NO_STORE,
                    mode,
                    Arc::clone(&store),
                    Arc::clone(&mime),
                )
                .into_handler(),
            );
        }
    }

    let client_cache_control = match options.dev {
        true => CACHE_CONTROL_NO_CACHE,
        false => CACHE_CONTROL_IMMUTABLE,
    };
    handlers.push(
        StaticAssets::new(
            AssetSelector::prefix(CLIENT_PREFIX),
            client_cache_control,
            mode,
            store,
            mime,
        )
        .into_handler(),
    );

    handlers.extend(server_routes);

    if let Some(pages) = pages {
        let session = options.session.unwrap_or_else(noop_session);
        handlers.push(pages.build(session));
    }

    if let Some(renderer) = renderer {
        let page = ErrorPage::new(renderer, translator, &options.error_component, options.dev);
        handlers.push(Handler::error_capable(OnError(page)));
    }

    if options.catch_errors {
        handlers.push(BailOut::new(options.dev).into_handler());
    }

    debug!("中间件装配完成，共{}个处理器", handlers.len());
    compose(options.ignore, handlers)
}
