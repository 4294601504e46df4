//! # HTTP 前端
//!
//! 基于 Tokio 的 TCP 服务：每个连接一个任务，读取并解析请求后交给组合好的处理器链，
//! 再根据链返回的继续信号完成最终响应并写回套接字。

use std::time::Instant;

use log::{debug, error, info, warn};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
};

use crate::{
    chain::{Flow, Handler},
    param::HttpRequestMethod,
    request::Request,
    response::Response,
};

const READ_BUFFER_SIZE: usize = 8192;

/// 链外的最终处理。
///
/// - `Done` 或已结束的响应原样发送；
/// - 已开始输出但未结束的响应直接结束；
/// - `Next` 说明没有任何处理器认领该请求，返回 404；
/// - `Error` 说明错误穿出了整条链，记录日志后返回通用状态页。
pub fn finalize(flow: Flow, id: u128, mut res: Response) -> Response {
    if let Flow::Error(e) = &flow {
        error!("[ID{}]错误未被处理器链消费: {}", id, e);
    }
    if matches!(flow, Flow::Done) || res.is_finished() {
        return res;
    }
    if res.headers_sent() {
        warn!("[ID{}]响应已开始输出但未结束，直接结束", id);
        if let Err(e) = res.end(&[]) {
            error!("[ID{}]结束响应失败: {}", id, e);
        }
        return res;
    }
    match flow {
        Flow::Error(e) => Response::status_page(e.status().unwrap_or(500), None),
        _ => {
            debug!("[ID{}]没有处理器认领该请求，返回404", id);
            Response::status_page(404, None)
        }
    }
}

/// 在挂载点下运行处理器链，得到最终响应。
pub async fn respond(app: &Handler, req: &mut Request, base_path: Option<&str>) -> Response {
    if let Some(base) = base_path {
        if !req.mount(base) {
            debug!("[ID{}]请求目标{}不在挂载点{}之下", req.id(), req.url(), base);
            return Response::status_page(404, None);
        }
    }
    let mut res = Response::new();
    let flow = app.call(None, req, &mut res).await;
    finalize(flow, req.id(), res)
}

/// # 连接处理器
///
/// 负责单个 TCP 流的生命周期：读取解析请求、运行处理器链、发送响应。
pub async fn handle_connection(
    stream: &mut TcpStream,
    id: u128,
    app: &Handler,
    base_path: Option<&str>,
) {
    let mut buffer = vec![0; READ_BUFFER_SIZE];

    let n = match stream.read(&mut buffer).await {
        Ok(0) => return,
        Ok(n) => n,
        Err(e) => {
            error!("[ID{}]读取TCPStream时遇到错误: {}", id, e);
            return;
        }
    };
    debug!("[ID{}]HTTP请求接收完毕", id);

    let start_time = Instant::now();

    let mut request = match Request::try_from(&buffer[..n], id) {
        Ok(req) => req,
        Err(e) => {
            warn!("[ID{}]解析HTTP请求失败: {}", id, e);
            let response = Response::status_page(e.status_code(), None);
            if let Err(e) = stream.write_all(&response.as_bytes(&[], false)).await {
                error!("[ID{}]发送错误响应失败: {}", id, e);
            }
            return;
        }
    };
    debug!("[ID{}]成功解析HTTP请求", id);

    let response = respond(app, &mut request, base_path).await;

    debug!(
        "[ID{}]HTTP响应构建完成，服务端用时{}ms。",
        id,
        start_time.elapsed().as_millis()
    );
    info!(
        "[ID{}] {}, {}, {}, {}, {}, {}",
        id,
        request.version(),
        request.original_url().unwrap_or(request.url()),
        request.method(),
        response.status_code(),
        response.information(),
        request.user_agent(),
    );

    let head_only = request.method() == HttpRequestMethod::Head;
    let response_bytes = response.as_bytes(request.accept_encoding(), head_only);
    debug!("[ID{}]发送响应，长度: {}", id, response_bytes.len());
    if let Err(e) = stream.write_all(&response_bytes).await {
        error!("[ID{}]发送响应失败: {}", id, e);
        return;
    }
    if let Err(e) = stream.flush().await {
        error!("[ID{}]刷新TCPStream失败: {}", id, e);
    }
}

/// 主循环：持续接收新连接并分发给独立任务处理。
pub async fn serve(listener: TcpListener, app: Handler, base_path: Option<String>) {
    let mut id: u128 = 0;
    loop {
        let (mut stream, addr) = match listener.accept().await {
            Ok(conn) => conn,
            Err(e) => {
                error!("接受连接失败: {}", e);
                continue;
            }
        };
        debug!("[ID{}]TCP连接已建立: {}", id, addr);

        let app = app.clone();
        let base_path = base_path.clone();
        tokio::spawn(async move {
            handle_connection(&mut stream, id, &app, base_path.as_deref()).await;
        });
        id += 1;
    }
}
