// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # HTTP 请求模块
//!
//! 负责将 TCP 流中读取的原始字节解析为 `Request`，并承载处理器链在请求生命周期内
//! 逐步补全的路由信息：
//! 1. 请求行（方法、请求目标、版本）的解析。
//! 2. 常用标头（`User-Agent`、`Accept`、`Accept-Encoding`）的提取。
//! 3. 挂载信息：`original_url`（挂载前的完整目标）、`base_url`（挂载前缀）与 `path`（去掉查询串的路径），
//!    后两者由请求准备处理器在进入链时计算。

use crate::{exception::Exception, param::*};
use log::error;

/// 一个 HTTP 请求的元数据。
#[derive(Debug, Clone)]
pub struct Request {
    /// 全局请求 ID，用于日志追踪
    id: u128,
    method: HttpRequestMethod,
    /// 相对挂载点的请求目标（包含查询字符串）
    url: String,
    /// 挂载前的原始请求目标；未经过挂载时为 `None`
    original_url: Option<String>,
    /// 挂载前缀，由请求准备处理器计算
    base_url: Option<String>,
    /// 不含查询字符串的路径，由请求准备处理器计算
    path: Option<String>,
    version: HttpVersion,
    user_agent: String,
    /// 客户端支持的压缩编码列表（按解析顺序排列）
    accept_encoding: Vec<HttpEncoding>,
    accept: Option<String>,
}

impl Request {
    /// 以给定方法和请求目标构造请求，其余字段取默认值。
    pub fn new(method: HttpRequestMethod, url: &str) -> Self {
        Self {
            id: 0,
            method,
            url: url.to_string(),
            original_url: None,
            base_url: None,
            path: None,
            version: HttpVersion::V1_1,
            user_agent: String::new(),
            accept_encoding: vec![],
            accept: None,
        }
    }

    /// 从原始字节缓冲区尝试构建 `Request` 实例。
    ///
    /// # 逻辑步骤
    /// 1. 验证编码：确保请求数据是合法的 UTF-8 字符串。
    /// 2. 解析请求行：提取方法、请求目标和协议版本。
    /// 3. 迭代解析标头：识别 `User-Agent`、`Accept` 与 `Accept-Encoding`。
    ///
    /// # 错误处理
    /// 如果请求格式不符合 HTTP 规范或使用了不支持的方法/版本，将返回相应的 `Exception`。
    pub fn try_from(buffer: &[u8], id: u128) -> Result<Self, Exception> {
        let request_string = match std::str::from_utf8(buffer) {
            Ok(string) => string.trim_end_matches('\0'),
            Err(_) => {
                error!("[ID{}]无法解析HTTP请求", id);
                return Err(Exception::RequestIsNotUtf8);
            }
        };

        let request_lines: Vec<&str> = request_string.split(CRLF).collect();

        // 请求行，例如 "GET /client/app.js HTTP/1.1"
        let first_line_parts: Vec<&str> = request_lines[0].split(' ').collect();

        if first_line_parts.len() < 3 {
            error!("[ID{}]HTTP请求行格式不正确：{}", id, request_lines[0]);
            return Err(Exception::MalformedRequest);
        }

        let method_str = first_line_parts[0].to_uppercase();
        let method = match method_str.as_str() {
            "GET" => HttpRequestMethod::Get,
            "HEAD" => HttpRequestMethod::Head,
            "OPTIONS" => HttpRequestMethod::Options,
            "POST" => HttpRequestMethod::Post,
            _ => {
                error!("[ID{}]不支持的HTTP请求方法：{}", id, &method_str);
                return Err(Exception::UnSupportedRequestMethod);
            }
        };

        let version_str = first_line_parts[first_line_parts.len() - 1].to_uppercase();
        let version = match version_str.as_str() {
            "HTTP/1.1" => HttpVersion::V1_1,
            _ => {
                error!("[ID{}]不支持的HTTP协议版本：{}", id, &version_str);
                return Err(Exception::UnsupportedHttpVersion);
            }
        };

        // 请求目标中可能夹带空格，虽然不规范但通过 join 尝试恢复
        let url = if first_line_parts.len() == 3 {
            first_line_parts[1].to_string()
        } else {
            first_line_parts[1..first_line_parts.len() - 1].join(" ")
        };

        let mut user_agent = String::new();
        let mut accept_encoding = vec![];
        let mut accept = None;
        for line in request_lines.iter().skip(1) {
            if line.is_empty() {
                break;
            }
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            match name.trim().to_lowercase().as_str() {
                "user-agent" => user_agent = value.to_string(),
                "accept" => accept = Some(value.to_string()),
                // 只要包含关键词即视为支持
                "accept-encoding" => {
                    if value.contains("gzip") {
                        accept_encoding.push(HttpEncoding::Gzip);
                    }
                    if value.contains("deflate") {
                        accept_encoding.push(HttpEncoding::Deflate);
                    }
                    if value.contains("br") {
                        accept_encoding.push(HttpEncoding::Br);
                    }
                }
                _ => {}
            }
        }

        Ok(Self {
            id,
            method,
            url,
            original_url: None,
            base_url: None,
            path: None,
            version,
            user_agent,
            accept_encoding,
            accept,
        })
    }

    /// 将请求挂载到 `mount` 前缀之下：记录原始目标，并把 `url` 改写为相对挂载点的形式。
    ///
    /// 请求目标不以该前缀开头时不做任何修改，返回 `false`。
    pub fn mount(&mut self, mount: &str) -> bool {
        let mount = mount.trim_end_matches('/');
        if mount.is_empty() {
            return false;
        }
        let Some(rest) = self.url.strip_prefix(mount) else {
            return false;
        };
        if !(rest.is_empty() || rest.starts_with('/') || rest.starts_with('?')) {
            return false;
        }
        let rest = if rest.starts_with('/') {
            rest.to_string()
        } else {
            format!("/{}", rest)
        };
        self.original_url = Some(std::mem::replace(&mut self.url, rest));
        true
    }
}

// --- Getter / Setter ---

impl Request {
    pub fn id(&self) -> u128 {
        self.id
    }

    pub fn version(&self) -> &HttpVersion {
        &self.version
    }

    /// 相对挂载点的请求目标（含查询参数）
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn original_url(&self) -> Option<&str> {
        self.original_url.as_deref()
    }

    pub fn base_url(&self) -> Option<&str> {
        self.base_url.as_deref()
    }

    pub fn set_base_url(&mut self, base_url: String) {
        self.base_url = Some(base_url);
    }

    /// 不含查询字符串的路径。准备处理器运行之前回退为从 `url` 现算。
    pub fn path(&self) -> &str {
        match &self.path {
            Some(p) => p,
            None => strip_query(&self.url),
        }
    }

    pub fn has_path(&self) -> bool {
        self.path.is_some()
    }

    pub fn set_path(&mut self, path: String) {
        self.path = Some(path);
    }

    pub fn method(&self) -> HttpRequestMethod {
        self.method
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    pub fn accept_encoding(&self) -> &[HttpEncoding] {
        &self.accept_encoding
    }

    pub fn accept(&self) -> Option<&str> {
        self.accept.as_deref()
    }
}

/// 去掉请求目标中 `?` 之后的查询字符串。
pub fn strip_query(url: &str) -> &str {
    match url.find('?') {
        Some(i) => &url[..i],
        None => url,
    }
}
