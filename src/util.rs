use percent_encoding::percent_decode_str;

use crate::{exception::Exception, param::STATUS_CODES};

pub struct HtmlBuilder {
    title: String,
    css: String,
    body: String,
}

impl HtmlBuilder {
    /// 状态码页面。`note` 会被转义后放入正文，缺省时使用标准原因短语。
    pub fn from_status_code(code: u16, note: Option<&str>) -> Self {
        let title = format!("{}", code);
        let css = r"
            body {
                width: 35em;
                margin: 0 auto;
                font-family: Tahoma, Verdana, Arial, sans-serif;
            }
            "
        .to_string();
        let description = match note {
            Some(n) => escape_html(n),
            None => STATUS_CODES.get(&code).copied().unwrap_or("Unknown").to_string(),
        };
        let body = format!(
            r"
            <h1>{}</h1>
            <p>{}</p>
            ",
            code, description
        );
        Self { title, css, body }
    }

    /// 在正文末尾追加一段预格式化文本（内容会被转义）。
    pub fn with_pre(mut self, text: &str) -> Self {
        self.body
            .push_str(&format!("<pre>{}</pre>", escape_html(text)));
        self
    }

    pub fn build(&self) -> String {
        format!(
            r##"<!DOCTYPE html>
            <html>
                <head>
                    <meta charset="utf-8">
                    <title>{}</title>
                    <style>{}</style>
                </head>
                <body>
                {}
                </body>
            </html>"##,
            self.title, self.css, self.body
        )
    }
}

/// HTML 转义：`"` `'` `&` `<` `>` 各自替换为对应实体，单次从左到右扫描。
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}

/// 百分号解码请求路径。解码结果不是合法 UTF-8 时返回 `InvalidPath`。
pub fn decode_path(path: &str) -> Result<String, Exception> {
    percent_decode_str(path)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| Exception::InvalidPath)
}

/// POSIX 风格的路径规范化：合并重复的 `/`，消解 `.` 与 `..`。
///
/// 绝对路径中的 `..` 不会越过根目录；保留结尾的 `/`。
pub fn normalize_path(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let absolute = path.starts_with('/');
    let trailing = path.ends_with('/');

    let mut segments: Vec<&str> = vec![];
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ => {
                    if !absolute {
                        segments.push("..");
                    }
                }
            },
            s => segments.push(s),
        }
    }

    let mut normalized = segments.join("/");
    if absolute {
        normalized.insert(0, '/');
    }
    if normalized.is_empty() {
        normalized.push('.');
    }
    if trailing && !normalized.ends_with('/') {
        normalized.push('/');
    }
    normalized
}
