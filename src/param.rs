// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # 协议参数与常量模块
//!
//! 该模块定义了中间件与 HTTP 前端共用的常量和数据结构，包括：
//! - 常见的 HTTP 状态码及其原因短语（Reason Phrase）。
//! - 静态资源使用的 `Cache-Control` 策略与固定路径。
//! - 扩展名到 MIME 类型的映射表，供默认的 MIME 解析器使用。
//! - HTTP 方法、版本及编码格式的强类型枚举。

use std::collections::HashMap;
use lazy_static::lazy_static;

/// 服务器名称标识，用于 HTTP 响应头的 `Server` 字段
pub const SERVER_NAME: &str = "ssr-middleware";

/// HTTP 协议规定的换行符（Carriage Return Line Feed）
pub const CRLF: &str = "\r\n";

/// 客户端构建产物的 URL 前缀
pub const CLIENT_PREFIX: &str = "/client/";

/// Service Worker 脚本及其 sourcemap 的固定路径
pub const SERVICE_WORKER: &str = "/service-worker.js";
pub const SERVICE_WORKER_MAP: &str = "/service-worker.js.map";

/// Service Worker 不允许被任何一层缓存
pub const CACHE_CONTROL_NO_STORE: &str = "no-cache, no-store, must-revalidate";
/// 生产模式下带哈希的客户端资源可永久缓存
pub const CACHE_CONTROL_IMMUTABLE: &str = "max-age=31536000, immutable";
/// 开发模式下客户端资源每次都需要重新校验
pub const CACHE_CONTROL_NO_CACHE: &str = "no-cache";

/// 错误值缺失时使用的占位文本
pub const UNKNOWN_ERROR: &str = "Unknown error";

/// 兜底的 MIME 类型
pub const DEFAULT_MIME: &str = "application/octet-stream";

/// 处理器链与 HTTP 前端可能产生的状态码及其原因短语（RFC 9110）
const REASON_PHRASES: &[(u16, &str)] = &[
    (200, "OK"),
    (201, "Created"),
    (204, "No Content"),
    (301, "Moved Permanently"),
    (302, "Found"),
    (303, "See Other"),
    (304, "Not Modified"),
    (307, "Temporary Redirect"),
    (308, "Permanent Redirect"),
    (400, "Bad Request"),
    (401, "Unauthorized"),
    (403, "Forbidden"),
    (404, "Not Found"),
    (405, "Method Not Allowed"),
    (406, "Not Acceptable"),
    (408, "Request Timeout"),
    (410, "Gone"),
    (413, "Content Too Large"),
    (414, "URI Too Long"),
    (415, "Unsupported Media Type"),
    (422, "Unprocessable Content"),
    (429, "Too Many Requests"),
    (500, "Internal Server Error"),
    (501, "Not Implemented"),
    (502, "Bad Gateway"),
    (503, "Service Unavailable"),
    (504, "Gateway Timeout"),
    (505, "HTTP Version Not Supported"),
];

/// 前端构建目录中常见的文件类型
const ASSET_MIME_TYPES: &[(&str, &str)] = &[
    // 脚本与样式
    ("js", "text/javascript;charset=utf-8"),
    ("mjs", "text/javascript;charset=utf-8"),
    ("css", "text/css;charset=utf-8"),
    ("map", "application/json"),
    ("json", "application/json"),
    ("wasm", "application/wasm"),
    // 文档
    ("html", "text/html;charset=utf-8"),
    ("htm", "text/html;charset=utf-8"),
    ("txt", "text/plain"),
    ("xml", "text/xml"),
    ("webmanifest", "application/manifest+json"),
    // 图片
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("avif", "image/avif"),
    ("svg", "image/svg+xml"),
    ("ico", "image/x-icon"),
    ("bmp", "image/bmp"),
    // 字体
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("ttf", "font/ttf"),
    ("otf", "font/otf"),
    ("eot", "application/vnd.ms-fontobject"),
    // 音视频
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
    // 其他
    ("pdf", "application/pdf"),
    ("zip", "application/zip"),
    ("gz", "application/gzip"),
];

lazy_static! {
    pub static ref STATUS_CODES: HashMap<u16, &'static str> =
        REASON_PHRASES.iter().copied().collect();

    /// 由 [`ExtensionMime`](crate::assets::ExtensionMime) 查询，结果写入静态资源响应的 `Content-Type`。
    pub static ref MIME_TYPES: HashMap<&'static str, &'static str> =
        ASSET_MIME_TYPES.iter().copied().collect();
}

/// 支持的 HTTP 协议版本
#[derive(Debug, Clone, Copy)]
pub enum HttpVersion {
    /// HTTP/1.1 版本
    V1_1,
}

/// 标准 HTTP 请求方法
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HttpRequestMethod {
    /// 获取资源
    Get,
    /// 获取资源的元数据（不包含响应体）
    Head,
    /// 查询服务器支持的选项
    Options,
    /// 提交数据或执行操作
    Post,
}

/// 支持的内容编码（压缩）格式
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HttpEncoding {
    /// GNU zip 压缩
    Gzip,
    /// zlib 压缩
    Deflate,
    /// Brotli 压缩
    Br,
}

use std::fmt;

impl fmt::Display for HttpVersion {
    /// 将枚举格式化为 HTTP 报文中的版本字符串
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpVersion::V1_1 => write!(f, "1.1"),
        }
    }
}

impl fmt::Display for HttpRequestMethod {
    /// 将枚举格式化为 HTTP 标准大写方法名
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpRequestMethod::Get => write!(f, "GET"),
            HttpRequestMethod::Head => write!(f, "HEAD"),
            HttpRequestMethod::Options => write!(f, "OPTIONS"),
            HttpRequestMethod::Post => write!(f, "POST"),
        }
    }
}

impl fmt::Display for HttpEncoding {
    /// 将枚举格式化为 `Content-Encoding` 头所使用的标识符
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            HttpEncoding::Gzip => write!(f, "gzip"),
            HttpEncoding::Deflate => write!(f, "deflate"),
            HttpEncoding::Br => write!(f, "br"),
        }
    }
}