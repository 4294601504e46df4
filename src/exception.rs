// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # Exception 模块
//!
//! 该模块定义了请求处理生命周期中可能出现的各类错误。
//!
//! ## 错误分层
//! - [`Exception`]：协议解析与响应状态机层面的错误，由 HTTP 前端和 [`Response`](crate::Response) 产生。
//! - [`AssetError`]：资源存储的读取结果。`NotFound` 与其他 I/O 失败严格区分，
//!   静态资源处理器据此决定是放行给后续处理器还是进入错误模式。
//! - [`HandlerError`]：在处理器链中流转的错误值。携带可选的 HTTP 状态码与调用栈文本，
//!   由错误页渲染管线和兜底处理器最终消费。

use std::io;

use thiserror::Error;

use crate::param::UNKNOWN_ERROR;

/// 协议与响应状态相关的异常类型。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Exception {
    /// 客户端发送的请求字节流无法解析为合法的 UTF-8 字符串。
    #[error("Request bytes can't be parsed in UTF-8")]
    RequestIsNotUtf8,
    /// 请求行缺失或格式错误。
    #[error("Malformed request line")]
    MalformedRequest,
    /// 客户端使用了服务器暂不支持的 HTTP 方法。
    #[error("Unsupported request method")]
    UnSupportedRequestMethod,
    /// 客户端使用了服务器不支持的 HTTP 协议版本。
    #[error("Unsupported HTTP version")]
    UnsupportedHttpVersion,
    /// 请求路径无法被百分号解码为合法的 UTF-8。对应 `400 Bad Request`。
    #[error("Invalid path (400)")]
    InvalidPath,
    /// 响应已经开始输出，此时不允许再修改响应头。
    #[error("Cannot set headers after they are sent")]
    HeadersAlreadySent,
    /// 响应已经结束，不允许继续写入。
    #[error("Write after end")]
    WriteAfterEnd,
}

impl Exception {
    /// 该异常转化为 HTTP 响应时应使用的状态码。
    pub fn status_code(&self) -> u16 {
        match self {
            Exception::RequestIsNotUtf8
            | Exception::MalformedRequest
            | Exception::UnsupportedHttpVersion
            | Exception::InvalidPath => 400,
            Exception::UnSupportedRequestMethod => 405,
            Exception::HeadersAlreadySent | Exception::WriteAfterEnd => 500,
        }
    }
}

/// 资源存储的读取错误。
#[derive(Debug, Error)]
pub enum AssetError {
    /// 资源不存在。静态资源处理器遇到它时放行请求，不视为错误。
    #[error("Asset not found: {0}")]
    NotFound(String),
    /// 其他任何读取失败（权限、设备错误等），会使处理器链进入错误模式。
    #[error("Failed to read asset {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl AssetError {
    /// 将 `std::io::Error` 按照是否为“不存在”进行分类。
    pub fn from_io(path: &str, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => AssetError::NotFound(path.to_string()),
            _ => AssetError::Io {
                path: path.to_string(),
                source,
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, AssetError::NotFound(_))
    }
}

/// 在处理器链中传播的错误值。
///
/// `Display` 输出即错误的字符串形式，错误页在诊断模式下会把它与调用栈一起展示给客户端。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct HandlerError {
    message: String,
    status: Option<u16>,
    stack: Option<String>,
}

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
            stack: None,
        }
    }

    /// 错误值缺失时的占位错误。
    pub fn unknown() -> Self {
        Self::new(UNKNOWN_ERROR)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// 错误自身携带的 HTTP 状态码。
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn stack(&self) -> Option<&str> {
        self.stack.as_deref()
    }

    /// 用转换后的调用栈替换原始调用栈。
    pub fn set_stack(&mut self, stack: String) {
        self.stack = Some(stack);
    }
}

impl From<Exception> for HandlerError {
    fn from(e: Exception) -> Self {
        HandlerError::new(e.to_string()).with_status(e.status_code())
    }
}

impl From<AssetError> for HandlerError {
    fn from(e: AssetError) -> Self {
        match e {
            AssetError::NotFound(_) => HandlerError::new(e.to_string()).with_status(404),
            AssetError::Io { .. } => HandlerError::new(e.to_string()),
        }
    }
}

impl From<io::Error> for HandlerError {
    fn from(e: io::Error) -> Self {
        HandlerError::new(e.to_string())
    }
}
