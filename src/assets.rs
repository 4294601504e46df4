//! # 静态资源服务
//!
//! 为匹配前缀或精确路径的请求返回构建目录中的文件内容。
//!
//! - 缓存模式：每个规范化路径只读取一次后端存储，结果在进程生命周期内复用；
//! - 非缓存模式：每次请求都重新读取，便于开发时快速迭代。
//!
//! 资源不存在时请求被放行给后续处理器（动态路由可能拥有同一路径），
//! 其他读取失败则让处理器链进入错误模式。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, warn};

#[cfg(test)]
use mockall::automock;

use crate::{
    cache::AssetCache,
    chain::{Flow, Handler, Middleware},
    exception::{AssetError, HandlerError},
    param::{DEFAULT_MIME, MIME_TYPES},
    request::Request,
    response::Response,
    util::{decode_path, normalize_path},
};

/// 资源存储。`NotFound` 必须与其他失败区分开。
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AssetStore: Send + Sync {
    async fn read(&self, path: &str) -> Result<Bytes, AssetError>;
}

/// 以构建目录为根的文件系统存储
pub struct FsAssetStore {
    root: PathBuf,
}

impl FsAssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 将规范化后的请求路径映射到根目录下的物理路径
    pub fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

#[async_trait]
impl AssetStore for FsAssetStore {
    async fn read(&self, path: &str) -> Result<Bytes, AssetError> {
        let full_path = self.resolve(path);
        match tokio::fs::read(&full_path).await {
            Ok(data) => Ok(Bytes::from(data)),
            // 目录没有可读取的文件内容，按不存在处理
            Err(_) if full_path.is_dir() => Err(AssetError::NotFound(path.to_string())),
            Err(e) => Err(AssetError::from_io(path, e)),
        }
    }
}

/// MIME 类型解析
pub trait MimeResolver: Send + Sync {
    fn lookup(&self, path: &str) -> Option<&str>;
}

/// 按扩展名查询内置映射表
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtensionMime;

impl MimeResolver for ExtensionMime {
    fn lookup(&self, path: &str) -> Option<&str> {
        let file_name = path.rsplit('/').next()?;
        let (_, extension) = file_name.rsplit_once('.')?;
        MIME_TYPES
            .get(extension.to_lowercase().as_str())
            .copied()
    }
}

/// 资源匹配条件：精确路径或路径前缀，任一满足即匹配。
#[derive(Debug, Clone, Default)]
pub struct AssetSelector {
    pub prefix: Option<String>,
    pub exact_path: Option<String>,
}

impl AssetSelector {
    pub fn prefix(prefix: &str) -> Self {
        Self {
            prefix: Some(prefix.to_string()),
            exact_path: None,
        }
    }

    pub fn exact(path: &str) -> Self {
        Self {
            prefix: None,
            exact_path: Some(path.to_string()),
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        self.exact_path.as_deref().map_or(false, |p| p == path)
            || self
                .prefix
                .as_deref()
                .map_or(false, |p| path.starts_with(p))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetMode {
    /// 首次读取后常驻内存
    Cached,
    /// 每次请求重新读取
    Uncached,
}

/// 静态资源处理器（普通处理器）
pub struct StaticAssets {
    selector: AssetSelector,
    cache_control: String,
    store: Arc<dyn AssetStore>,
    mime: Arc<dyn MimeResolver>,
    cache: Option<AssetCache>,
}

impl StaticAssets {
    pub fn new(
        selector: AssetSelector,
        cache_control: &str,
        mode: AssetMode,
        store: Arc<dyn AssetStore>,
        mime: Arc<dyn MimeResolver>,
    ) -> Self {
        Self {
            selector,
            cache_control: cache_control.to_string(),
            store,
            mime,
            cache: match mode {
                AssetMode::Cached => Some(AssetCache::new()),
                AssetMode::Uncached => None,
            },
        }
    }

    pub fn into_handler(self) -> Handler {
        Handler::normal(self)
    }

    pub fn cache(&self) -> Option<&AssetCache> {
        self.cache.as_ref()
    }

    async fn read(&self, file: &str) -> Result<Bytes, AssetError> {
        match &self.cache {
            Some(cache) => cache.get_or_load(file, || self.store.read(file)).await,
            None => self.store.read(file).await,
        }
    }
}

#[async_trait]
impl Middleware for StaticAssets {
    async fn handle(&self, req: &mut Request, res: &mut Response) -> Flow {
        let id = req.id();
        let path = req.path().to_string();
        if !self.selector.matches(&path) {
            return Flow::Next;
        }

        let mime = self.mime.lookup(&path).unwrap_or(DEFAULT_MIME).to_string();

        let file = match decode_path(&path) {
            Ok(decoded) => normalize_path(&decoded),
            Err(e) => {
                warn!("[ID{}]无法解码请求路径{}", id, path);
                return Flow::Error(e.into());
            }
        };

        let data = match self.read(&file).await {
            Ok(data) => data,
            Err(e) if e.is_not_found() => {
                debug!("[ID{}]资源{}不存在，交给后续处理器", id, file);
                return Flow::Next;
            }
            Err(e) => {
                warn!("[ID{}]读取资源{}失败: {}", id, file, e);
                return Flow::Error(e.into());
            }
        };
        debug!("[ID{}]返回静态资源{}，{} bytes，{}", id, file, data.len(), mime);

        let written = res
            .set_header("Content-Type", &mime)
            .and_then(|_| res.set_header("Cache-Control", &self.cache_control))
            .and_then(|_| res.end(&data));
        match written {
            Ok(()) => Flow::Done,
            Err(e) => Flow::Error(HandlerError::from(e)),
        }
    }
}
