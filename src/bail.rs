//! # 兜底错误处理器
//!
//! 挂在整条链末尾，只有在前面没有任何可处理错误的处理器结束响应时才会生效。
//! 诊断模式下输出转义后的错误文本，生产模式下只输出通用信息。

use async_trait::async_trait;
use log::{debug, error};

use crate::{
    chain::{ErrorMiddleware, Flow, Handler},
    exception::HandlerError,
    request::Request,
    response::Response,
    util::escape_html,
};

#[derive(Debug, Clone, Copy)]
pub struct BailOut {
    dev: bool,
}

impl BailOut {
    pub fn new(dev: bool) -> Self {
        Self { dev }
    }

    pub fn into_handler(self) -> Handler {
        Handler::error_capable(self)
    }
}

#[async_trait]
impl ErrorMiddleware for BailOut {
    async fn handle(
        &self,
        error: Option<HandlerError>,
        req: &mut Request,
        res: &mut Response,
    ) -> Flow {
        let Some(err) = error else {
            debug!("[ID{}]兜底处理器未收到错误，交还调用方", req.id());
            return Flow::Next;
        };
        error!("[ID{}]未处理的错误: {}", req.id(), err);

        // 已经开始输出的响应不能再改写，避免重复结束
        if res.headers_sent() {
            return Flow::Done;
        }

        let message = match self.dev {
            true => escape_html(&err.to_string()),
            false => "Internal server error".to_string(),
        };
        let body = format!("<pre>{}</pre>", message);
        if let Err(e) = res.set_status(500).and_then(|_| res.end(body.as_bytes())) {
            error!("[ID{}]兜底输出失败: {}", req.id(), e);
        }
        Flow::Done
    }
}
