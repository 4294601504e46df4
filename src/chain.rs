//! # 处理器链
//!
//! 将一组有序的处理器组合为单一入口，并在分发时根据每个处理器的元数标记决定它是否参与错误处理。
//!
//! ## 分发协议
//! 每个处理器通过返回 [`Flow`] 表达它对后续链路的决定：
//! - `Flow::Next`：正常继续；
//! - `Flow::Error(e)`：带着错误继续，之后的链路进入错误模式；
//! - `Flow::Done`：请求已被处理完毕，分发到此为止。
//!
//! 错误模式下，只有 [`Handler::ErrorCapable`] 会被调用，[`Handler::Normal`] 一律被跳过，
//! 错误原样向后传播，直到某个可处理错误的处理器返回 `Flow::Next` 将其清除，或链路走到尽头。
//! 链本身在组合后不可变，每个请求只持有自己的游标与当前错误。

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, trace};

use crate::{
    exception::HandlerError,
    ignore::{should_ignore, IgnoreSpec},
    request::Request,
    response::Response,
};

/// 处理器对后续链路的决定
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Next,
    Error(HandlerError),
    Done,
}

impl Flow {
    /// 由可选错误构造继续信号
    pub fn from_error(error: Option<HandlerError>) -> Self {
        match error {
            Some(e) => Flow::Error(e),
            None => Flow::Next,
        }
    }
}

impl From<Result<(), HandlerError>> for Flow {
    fn from(result: Result<(), HandlerError>) -> Self {
        match result {
            Ok(()) => Flow::Next,
            Err(e) => Flow::Error(e),
        }
    }
}

/// 只在无错误路径上运行的普通处理器
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, req: &mut Request, res: &mut Response) -> Flow;
}

/// 无论是否存在错误都会被调用的处理器
#[async_trait]
pub trait ErrorMiddleware: Send + Sync {
    async fn handle(
        &self,
        error: Option<HandlerError>,
        req: &mut Request,
        res: &mut Response,
    ) -> Flow;
}

/// 元数标记
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Normal,
    ErrorCapable,
}

/// 带显式元数标记的处理器，标记在注册时确定。
#[derive(Clone)]
pub enum Handler {
    Normal(Arc<dyn Middleware>),
    ErrorCapable(Arc<dyn ErrorMiddleware>),
}

impl Handler {
    pub fn normal<M: Middleware + 'static>(middleware: M) -> Self {
        Handler::Normal(Arc::new(middleware))
    }

    pub fn error_capable<M: ErrorMiddleware + 'static>(middleware: M) -> Self {
        Handler::ErrorCapable(Arc::new(middleware))
    }

    /// 用同步闭包构造普通处理器
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(&mut Request, &mut Response) -> Flow + Send + Sync + 'static,
    {
        Handler::normal(FnMiddleware(f))
    }

    /// 用同步闭包构造可处理错误的处理器
    pub fn from_error_fn<F>(f: F) -> Self
    where
        F: Fn(Option<HandlerError>, &mut Request, &mut Response) -> Flow + Send + Sync + 'static,
    {
        Handler::error_capable(ErrorFnMiddleware(f))
    }

    pub fn arity(&self) -> Arity {
        match self {
            Handler::Normal(_) => Arity::Normal,
            Handler::ErrorCapable(_) => Arity::ErrorCapable,
        }
    }

    /// 以链中一环的身份调用：普通处理器在错误模式下被跳过，错误原样返回。
    pub async fn call(
        &self,
        error: Option<HandlerError>,
        req: &mut Request,
        res: &mut Response,
    ) -> Flow {
        match (self, error) {
            (Handler::ErrorCapable(h), error) => h.handle(error, req, res).await,
            (Handler::Normal(h), None) => h.handle(req, res).await,
            (Handler::Normal(_), Some(e)) => Flow::Error(e),
        }
    }
}

struct FnMiddleware<F>(F);

#[async_trait]
impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(&mut Request, &mut Response) -> Flow + Send + Sync,
{
    async fn handle(&self, req: &mut Request, res: &mut Response) -> Flow {
        (self.0)(req, res)
    }
}

struct ErrorFnMiddleware<F>(F);

#[async_trait]
impl<F> ErrorMiddleware for ErrorFnMiddleware<F>
where
    F: Fn(Option<HandlerError>, &mut Request, &mut Response) -> Flow + Send + Sync,
{
    async fn handle(
        &self,
        error: Option<HandlerError>,
        req: &mut Request,
        res: &mut Response,
    ) -> Flow {
        (self.0)(error, req, res)
    }
}

/// 单个请求在链上的遍历状态
#[derive(Debug, Default)]
struct DispatchState {
    cursor: usize,
    error: Option<HandlerError>,
}

/// 组合后的不可变处理器序列
pub struct Chain {
    ignore: Option<IgnoreSpec>,
    handlers: Arc<[Handler]>,
}

impl Chain {
    pub fn new(ignore: Option<IgnoreSpec>, handlers: Vec<Handler>) -> Self {
        Self {
            ignore,
            handlers: handlers.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// 从游标 0 开始，按声明顺序遍历整条链。
    ///
    /// 返回值即交还给调用方的继续信号：链走到尽头时为 `Next` 或带着残留错误的 `Error`，
    /// 中途有处理器结束请求时为 `Done`。
    pub async fn dispatch(
        &self,
        error: Option<HandlerError>,
        req: &mut Request,
        res: &mut Response,
    ) -> Flow {
        let mut state = DispatchState {
            cursor: 0,
            error,
        };

        while let Some(handler) = self.handlers.get(state.cursor) {
            if state.error.is_some() && handler.arity() == Arity::Normal {
                trace!("[ID{}]错误模式下跳过第{}个处理器", req.id(), state.cursor);
            }
            match handler.call(state.error.take(), req, res).await {
                Flow::Next => {}
                Flow::Error(e) => state.error = Some(e),
                Flow::Done => return Flow::Done,
            }
            state.cursor += 1;
        }

        Flow::from_error(state.error)
    }
}

#[async_trait]
impl ErrorMiddleware for Chain {
    async fn handle(
        &self,
        error: Option<HandlerError>,
        req: &mut Request,
        res: &mut Response,
    ) -> Flow {
        if let Some(ignore) = &self.ignore {
            if should_ignore(req.path(), ignore) {
                debug!("[ID{}]路径{}命中忽略规则，跳过整条处理器链", req.id(), req.path());
                // 跳过的是链，不是错误：外部传入的错误继续交给调用方
                return Flow::from_error(error);
            }
        }
        self.dispatch(error, req, res).await
    }
}

/// 将处理器序列组合为一个入口处理器。
///
/// 组合结果本身可处理错误，因此可以作为另一条链中的一环继续嵌套。
pub fn compose(ignore: Option<IgnoreSpec>, handlers: Vec<Handler>) -> Handler {
    Handler::error_capable(Chain::new(ignore, handlers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::HttpRequestMethod;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn request(path: &str) -> Request {
        Request::new(HttpRequestMethod::Get, path)
    }

    fn recording(log: &Log, name: &'static str, flow: Flow) -> Handler {
        let log = Arc::clone(log);
        Handler::from_fn(move |_, _| {
            log.lock().unwrap().push(name.to_string());
            flow.clone()
        })
    }

    fn recording_error(log: &Log, name: &'static str, clear: bool) -> Handler {
        let log = Arc::clone(log);
        Handler::from_error_fn(move |err, _, _| {
            let seen = err.as_ref().map_or("-".to_string(), |e| e.to_string());
            log.lock().unwrap().push(format!("{}({})", name, seen));
            match clear {
                true => Flow::Next,
                false => Flow::from_error(err),
            }
        })
    }

    fn entries(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_handlers_run_in_order() {
        let log: Log = Default::default();
        let chain = Chain::new(
            None,
            vec![
                recording(&log, "a", Flow::Next),
                recording(&log, "b", Flow::Next),
                recording(&log, "c", Flow::Next),
            ],
        );

        let flow = chain
            .dispatch(None, &mut request("/"), &mut Response::new())
            .await;

        assert_eq!(flow, Flow::Next);
        assert_eq!(entries(&log), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_error_skips_normal_handlers() {
        let log: Log = Default::default();
        let chain = Chain::new(
            None,
            vec![
                recording(&log, "a", Flow::Error(HandlerError::new("boom"))),
                recording(&log, "b", Flow::Next),
                recording_error(&log, "e1", false),
                recording(&log, "c", Flow::Next),
                recording_error(&log, "e2", true),
                recording(&log, "d", Flow::Next),
                recording_error(&log, "e3", false),
            ],
        );

        let flow = chain
            .dispatch(None, &mut request("/"), &mut Response::new())
            .await;

        assert_eq!(flow, Flow::Next);
        assert_eq!(
            entries(&log),
            vec!["a", "e1(boom)", "e2(boom)", "d", "e3(-)"]
        );
    }

    #[tokio::test]
    async fn test_unconsumed_error_returns_to_caller() {
        let log: Log = Default::default();
        let chain = Chain::new(
            None,
            vec![
                recording(&log, "a", Flow::Error(HandlerError::new("lost"))),
                recording(&log, "b", Flow::Next),
            ],
        );

        let flow = chain
            .dispatch(None, &mut request("/"), &mut Response::new())
            .await;

        assert_eq!(flow, Flow::Error(HandlerError::new("lost")));
        assert_eq!(entries(&log), vec!["a"]);
    }

    #[tokio::test]
    async fn test_done_stops_dispatch() {
        let log: Log = Default::default();
        let chain = Chain::new(
            None,
            vec![
                recording(&log, "a", Flow::Done),
                recording(&log, "b", Flow::Next),
                recording_error(&log, "e", true),
            ],
        );

        let flow = chain
            .dispatch(None, &mut request("/"), &mut Response::new())
            .await;

        assert_eq!(flow, Flow::Done);
        assert_eq!(entries(&log), vec!["a"]);
    }

    #[tokio::test]
    async fn test_incoming_error_is_dispatched() {
        let log: Log = Default::default();
        let chain = Chain::new(
            None,
            vec![recording(&log, "a", Flow::Next), recording_error(&log, "e", true)],
        );

        let flow = chain
            .dispatch(
                Some(HandlerError::new("upstream")),
                &mut request("/"),
                &mut Response::new(),
            )
            .await;

        assert_eq!(flow, Flow::Next);
        assert_eq!(entries(&log), vec!["e(upstream)"]);
    }

    #[tokio::test]
    async fn test_empty_chain_passes_through() {
        let chain = Chain::new(None, vec![]);
        assert!(chain.is_empty());
        let flow = chain
            .dispatch(None, &mut request("/"), &mut Response::new())
            .await;
        assert_eq!(flow, Flow::Next);
    }

    #[tokio::test]
    async fn test_ignored_path_skips_every_handler() {
        let log: Log = Default::default();
        let composed = compose(
            Some(IgnoreSpec::from(vec!["api", "/health"])),
            vec![
                recording(&log, "a", Flow::Done),
                recording_error(&log, "e", false),
            ],
        );

        let flow = composed
            .call(None, &mut request("/api/users?x=1"), &mut Response::new())
            .await;
        assert_eq!(flow, Flow::Next);
        assert!(entries(&log).is_empty());

        let flow = composed
            .call(None, &mut request("/client/app.js"), &mut Response::new())
            .await;
        assert_eq!(flow, Flow::Done);
        assert_eq!(entries(&log), vec!["a"]);
    }

    #[tokio::test]
    async fn test_nested_chain_receives_errors() {
        let log: Log = Default::default();
        let inner = compose(
            None,
            vec![recording(&log, "inner", Flow::Next), recording_error(&log, "inner_e", true)],
        );
        let outer = Chain::new(
            None,
            vec![
                recording(&log, "a", Flow::Error(HandlerError::new("x"))),
                inner,
                recording(&log, "b", Flow::Next),
            ],
        );

        let flow = outer
            .dispatch(None, &mut request("/"), &mut Response::new())
            .await;

        assert_eq!(flow, Flow::Next);
        assert_eq!(entries(&log), vec!["a", "inner_e(x)", "b"]);
    }

    #[test]
    fn test_arity_tags() {
        assert_eq!(Handler::from_fn(|_, _| Flow::Next).arity(), Arity::Normal);
        assert_eq!(
            Handler::from_error_fn(|_, _, _| Flow::Next).arity(),
            Arity::ErrorCapable
        );
        assert_eq!(compose(None, vec![]).arity(), Arity::ErrorCapable);
    }

    #[test]
    fn test_flow_from_result() {
        assert_eq!(Flow::from(Ok(())), Flow::Next);
        assert_eq!(
            Flow::from(Err(HandlerError::new("e"))),
            Flow::Error(HandlerError::new("e"))
        );
    }
}
