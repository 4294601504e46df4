//! # 错误页渲染管线
//!
//! 作为可处理错误的处理器挂在链上，是常见情况下错误的最终消费者：
//! 1. 缺失的错误值替换为 `Unknown error` 占位；
//! 2. 调用栈经过栈映射转换为源码位置；
//! 3. 写入运维日志；
//! 4. 状态码取自错误本身，缺省为 500；
//! 5. 先尝试通过页面渲染器渲染错误组件，失败时退回到纯文本/HTML 兜底输出。
//!
//! 兜底输出在生产模式下只给出通用文本；诊断模式下给出错误文本与调用栈，
//! 若响应是 HTML 且已经开始输出（渲染中途失败），文本会先被转义再注入。

use std::sync::Arc;

use async_trait::async_trait;
use log::{error, warn};
use regex::Regex;

use crate::{
    chain::{ErrorMiddleware, Flow, Handler},
    exception::HandlerError,
    request::Request,
    response::Response,
    util::{escape_html, HtmlBuilder},
};

/// 路由中的一段组件
#[derive(Debug, Clone, PartialEq)]
pub struct RoutePart {
    pub name: Option<String>,
    pub component: String,
}

/// 交给页面渲染器的路由描述
#[derive(Debug, Clone)]
pub struct RouteDescriptor {
    pub pattern: Option<Regex>,
    pub parts: Vec<RoutePart>,
}

impl RouteDescriptor {
    /// 只包含错误组件的合成路由
    pub fn error_route(component: &str) -> Self {
        Self {
            pattern: None,
            parts: vec![RoutePart {
                name: None,
                component: component.to_string(),
            }],
        }
    }
}

/// 页面渲染器。成功时必须自行结束响应。
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn render(
        &self,
        route: &RouteDescriptor,
        req: &mut Request,
        res: &mut Response,
        error: Option<&HandlerError>,
    ) -> Result<(), HandlerError>;
}

/// 调用栈映射
pub trait StackTranslator: Send + Sync {
    fn translate(&self, raw_stack: &str) -> String;
}

/// 不做任何转换
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityTranslator;

impl StackTranslator for IdentityTranslator {
    fn translate(&self, raw_stack: &str) -> String {
        raw_stack.to_string()
    }
}

/// 最简单的页面渲染器：把错误组件渲染为一张状态码页面。
#[derive(Debug, Default, Clone)]
pub struct ShellRenderer {
    /// 是否在页面中展示调用栈
    pub show_stack: bool,
}

#[async_trait]
impl PageRenderer for ShellRenderer {
    async fn render(
        &self,
        route: &RouteDescriptor,
        _req: &mut Request,
        res: &mut Response,
        error: Option<&HandlerError>,
    ) -> Result<(), HandlerError> {
        let component = route
            .parts
            .last()
            .map(|p| p.component.as_str())
            .ok_or_else(|| HandlerError::new("route has no component"))?;
        let mut page = HtmlBuilder::from_status_code(res.status_code(), error.map(|e| e.message()));
        if let Some(stack) = error.and_then(|e| e.stack()).filter(|_| self.show_stack) {
            page = page.with_pre(stack);
        }
        let html = page.build().replace(
            "<body>",
            &format!("<body data-component=\"{}\">", escape_html(component)),
        );
        res.set_header("Content-Type", "text/html;charset=utf-8")?;
        res.end(html.as_bytes())?;
        Ok(())
    }
}

/// 错误页处理器
pub struct ErrorPage {
    renderer: Arc<dyn PageRenderer>,
    translator: Arc<dyn StackTranslator>,
    route: RouteDescriptor,
    dev: bool,
}

impl ErrorPage {
    pub fn new(
        renderer: Arc<dyn PageRenderer>,
        translator: Arc<dyn StackTranslator>,
        error_component: &str,
        dev: bool,
    ) -> Self {
        Self {
            renderer,
            translator,
            route: RouteDescriptor::error_route(error_component),
            dev,
        }
    }

    pub fn into_handler(self) -> Handler {
        Handler::error_capable(self)
    }

    /// 富渲染失败后的兜底输出，保证响应被结束。
    fn render_plain(&self, err: &HandlerError, res: &mut Response) {
        if !self.dev {
            // 输出开始后状态码已无法修改，文案以错误自身的状态为准
            let body = match err.status().unwrap_or(500) {
                404 => "Not found",
                _ => "Internal server error",
            };
            finish(res, body.as_bytes());
            return;
        }

        let mut text = err.to_string();
        if let Some(stack) = err.stack() {
            text.push('\n');
            text.push_str(stack);
        }

        let sends_html = res
            .content_type()
            .map_or(true, |t| t.to_lowercase().contains("text/html"));
        let needs_html = sends_html && res.headers_sent();

        if needs_html {
            text = escape_html(&text);
        } else if let Err(e) = res.set_header("Content-Type", "text/plain") {
            warn!("兜底输出无法设置Content-Type: {}", e);
        }

        finish(res, text.as_bytes());
    }
}

fn finish(res: &mut Response, body: &[u8]) {
    if let Err(e) = res.end(body) {
        warn!("兜底输出无法写入: {}", e);
    }
}

#[async_trait]
impl ErrorMiddleware for ErrorPage {
    async fn handle(
        &self,
        error: Option<HandlerError>,
        req: &mut Request,
        res: &mut Response,
    ) -> Flow {
        let mut err = error.unwrap_or_else(HandlerError::unknown);

        if let Some(stack) = err.stack() {
            let translated = self.translator.translate(stack);
            err.set_stack(translated);
        }

        match err.stack() {
            Some(stack) => error!("[ID{}]{}\n{}", req.id(), err, stack),
            None => error!("[ID{}]{}", req.id(), err),
        }

        if let Err(e) = res.set_status(err.status().unwrap_or(500)) {
            warn!("[ID{}]响应已开始输出，状态码保持为{}: {}", req.id(), res.status_code(), e);
        }

        match self
            .renderer
            .render(&self.route, req, res, Some(&err))
            .await
        {
            Ok(()) if res.is_finished() => {}
            Ok(()) => {
                warn!("[ID{}]错误页渲染器未结束响应，改用兜底输出", req.id());
                self.render_plain(&err, res);
            }
            Err(render_err) => {
                warn!("[ID{}]错误页渲染失败: {}", req.id(), render_err);
                self.render_plain(&err, res);
            }
        }

        Flow::Done
    }
}
