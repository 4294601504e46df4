//! # HTTP 响应模块
//!
//! `Response` 是处理器链中被逐步写入的可变响应对象，同时负责最终序列化为 HTTP/1.1 报文。
//!
//! ## 状态约束
//! - `headers_sent`：一旦开始写入响应体（`write` 或 `end`），响应头即视为已发送，之后任何改写响应头的操作都会被拒绝。
//! - `finished`：`end` 之后响应关闭，再次写入返回 [`Exception::WriteAfterEnd`]。

use crate::{exception::Exception, param::*, util::HtmlBuilder};

use brotli::enc::{self, backward_references::BrotliEncoderParams};
use bytes::BytesMut;
use chrono::prelude::*;
use flate2::{
    write::{DeflateEncoder, GzEncoder},
    Compression,
};
use log::{debug, error};

use std::io::{self, Write};

#[derive(Debug, Clone)]
pub struct Response {
    version: HttpVersion,
    status_code: u16,
    information: String,
    /// 按插入顺序保存的响应头，名称大小写不敏感
    headers: Vec<(String, String)>,
    body: BytesMut,
    headers_sent: bool,
    finished: bool,
    date: DateTime<Utc>,
}

impl Default for Response {
    fn default() -> Self {
        Self::new()
    }
}

impl Response {
    pub fn new() -> Self {
        Self {
            version: HttpVersion::V1_1,
            status_code: 200,
            information: "OK".to_string(),
            headers: vec![],
            body: BytesMut::new(),
            headers_sent: false,
            finished: false,
            date: Utc::now(),
        }
    }

    /// 构造一个完整的状态码页面，用于链外的最终兜底。
    pub fn status_page(code: u16, note: Option<&str>) -> Self {
        let html = HtmlBuilder::from_status_code(code, note).build();
        let mut response = Self::new();
        response.status_code = code;
        response.information = reason_phrase(code).to_string();
        response
            .headers
            .push(("Content-Type".to_string(), "text/html;charset=utf-8".to_string()));
        response.body.extend_from_slice(html.as_bytes());
        response.headers_sent = true;
        response.finished = true;
        response
    }

    /// 设置状态码。响应头已发送时拒绝修改。
    pub fn set_status(&mut self, code: u16) -> Result<(), Exception> {
        if self.headers_sent {
            return Err(Exception::HeadersAlreadySent);
        }
        self.status_code = code;
        self.information = reason_phrase(code).to_string();
        Ok(())
    }

    /// 设置（或替换）响应头。响应头已发送时拒绝修改。
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), Exception> {
        if self.headers_sent {
            return Err(Exception::HeadersAlreadySent);
        }
        match self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            Some(entry) => entry.1 = value.to_string(),
            None => self.headers.push((name.to_string(), value.to_string())),
        }
        Ok(())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("Content-Type")
    }

    /// 写入一段响应体，并将响应标记为已开始输出。
    pub fn write(&mut self, chunk: &[u8]) -> Result<(), Exception> {
        if self.finished {
            return Err(Exception::WriteAfterEnd);
        }
        self.headers_sent = true;
        self.body.extend_from_slice(chunk);
        Ok(())
    }

    /// 写入最后一段响应体（可为空）并结束响应。
    pub fn end(&mut self, chunk: &[u8]) -> Result<(), Exception> {
        self.write(chunk)?;
        self.finished = true;
        Ok(())
    }

    pub fn headers_sent(&self) -> bool {
        self.headers_sent
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    pub fn information(&self) -> &str {
        &self.information
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// 序列化为 HTTP/1.1 报文。
    ///
    /// 根据客户端的 `Accept-Encoding` 决定是否压缩响应体，已压缩的媒体类型直接跳过；
    /// `head_only` 为真时只输出报文头，但 `Content-Length` 仍然反映完整响应体的长度。
    pub fn as_bytes(&self, accept_encoding: &[HttpEncoding], head_only: bool) -> Vec<u8> {
        let skip_compression = self.content_type().map_or(false, should_skip_compression);
        let mut content_encoding = match self.body.is_empty() || skip_compression {
            true => None,
            false => decide_encoding(accept_encoding),
        };
        let content = match compress(self.body.to_vec(), content_encoding) {
            Ok(c) => c,
            Err(e) => {
                error!("压缩响应体失败: {}，返回未压缩内容", e);
                content_encoding = None;
                self.body.to_vec()
            }
        };

        let version: &str = match self.version {
            HttpVersion::V1_1 => "HTTP/1.1",
        };
        let mut header = format!(
            "{} {} {}{}",
            version, self.status_code, self.information, CRLF
        );
        for (name, value) in &self.headers {
            header.push_str(&format!("{}: {}{}", name, value, CRLF));
        }
        if let Some(e) = content_encoding {
            header.push_str(&format!("Content-Encoding: {}{}", e, CRLF));
        }
        header.push_str(&format!("Content-Length: {}{}", content.len(), CRLF));
        header.push_str(&format!("Date: {}{}", format_date(&self.date), CRLF));
        header.push_str(&format!("Server: {}{}", SERVER_NAME, CRLF));
        header.push_str(CRLF);

        match head_only {
            true => header.into_bytes(),
            false => [header.as_bytes(), &content].concat(),
        }
    }
}

fn reason_phrase(code: u16) -> &'static str {
    STATUS_CODES.get(&code).copied().unwrap_or("Unknown")
}

fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc2822()
}

fn compress(data: Vec<u8>, mode: Option<HttpEncoding>) -> io::Result<Vec<u8>> {
    let original_size = data.len();
    let result = match mode {
        Some(HttpEncoding::Gzip) => {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&data)?;
            encoder.finish()
        }
        Some(HttpEncoding::Deflate) => {
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&data)?;
            encoder.finish()
        }
        Some(HttpEncoding::Br) => {
            let params = BrotliEncoderParams::default();
            let mut output = Vec::new();
            enc::BrotliCompress(&mut io::Cursor::new(data), &mut output, &params)?;
            Ok(output)
        }
        None => Ok(data),
    };

    if let (Some(mode), Ok(compressed)) = (mode, &result) {
        debug!(
            "压缩完成: {}, 原始大小: {} bytes, 压缩后: {} bytes",
            mode,
            original_size,
            compressed.len()
        );
    }

    result
}

fn should_skip_compression(mime_type: &str) -> bool {
    let skip_types = [
        "image/jpeg",
        "image/jpg",
        "image/png",
        "image/gif",
        "image/webp",
        "image/bmp",
        "image/x-icon",
        "video/",
        "audio/",
        "application/zip",
        "application/x-rar",
        "application/x-7z-compressed",
        "application/gzip",
        "application/x-gzip",
        "font/woff",
        "font/woff2",
        "application/vnd.ms-fontobject",
    ];

    skip_types
        .iter()
        .any(|&skip_type| mime_type.starts_with(skip_type))
}

// Brotli 压缩耗时较高，仅在客户端不支持 gzip 与 deflate 时使用
fn decide_encoding(accept_encoding: &[HttpEncoding]) -> Option<HttpEncoding> {
    if accept_encoding.contains(&HttpEncoding::Gzip) {
        Some(HttpEncoding::Gzip)
    } else if accept_encoding.contains(&HttpEncoding::Deflate) {
        Some(HttpEncoding::Deflate)
    } else if accept_encoding.contains(&HttpEncoding::Br) {
        Some(HttpEncoding::Br)
    } else {
        None
    }
}
