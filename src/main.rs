// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

//! # SSR 中间件服务
//!
//! 读取配置、装配处理器链并启动 Tokio 监听循环。
//! 处理器链包括：
//! - 请求准备与挂载路径公布
//! - service worker 与 `/client/` 静态资源（生产模式下常驻缓存）
//! - 错误页渲染与兜底处理

use ssr_middleware::{
    middleware, server, Collaborators, Config, ExtensionMime, FsAssetStore, IdentityTranslator,
    MiddlewareOptions, ShellRenderer,
};

use log::{error, info};
use tokio::{net::TcpListener, runtime::Builder};

use std::{
    net::{Ipv4Addr, SocketAddrV4},
    path::PathBuf,
    sync::Arc,
};

/// # 程序入口点
///
/// 初始化日志与配置，构建运行时后在其上运行服务。
fn main() {
    // 1. 初始化日志系统：通过外部 YAML 配置级别与输出目的地
    log4rs::init_file("config/log4rs.yaml", Default::default()).unwrap();

    // 2. 环境配置加载
    let config = match Config::from_toml("config/development.toml") {
        Ok(c) => c,
        Err(e) => {
            error!("无法读取配置文件: {}，使用默认配置", e);
            Config::new()
        }
    };
    info!("配置文件已载入");
    info!("build dir: {}，dev: {}", config.build_dir(), config.dev());

    // 3. 按配置的工作线程数构建运行时
    let runtime = Builder::new_multi_thread()
        .worker_threads(config.worker_threads())
        .enable_all()
        .build()
        .unwrap();

    runtime.block_on(run(config));
}

async fn run(config: Config) {
    let ignore = match config.ignore_spec() {
        Ok(spec) => spec,
        Err(e) => {
            error!("忽略规则中的正则表达式无效: {}", e);
            panic!("忽略规则中的正则表达式无效: {}", e);
        }
    };

    let build_dir = PathBuf::from(config.build_dir());
    let announce: Option<Arc<dyn Fn(&str) + Send + Sync>> = match config.announce_basepath() {
        true => Some(Arc::new(|basepath: &str| {
            println!(
                "{}",
                serde_json::json!({ "event": "basepath", "basepath": basepath })
            );
        })),
        false => None,
    };

    let app = middleware(
        MiddlewareOptions {
            session: None,
            ignore,
            catch_errors: config.catch_errors(),
            dev: config.dev(),
            error_component: config.error_component().to_string(),
        },
        Collaborators {
            store: Arc::new(FsAssetStore::new(&build_dir)),
            mime: Arc::new(ExtensionMime),
            build_dir,
            server_routes: None,
            pages: None,
            renderer: Some(Arc::new(ShellRenderer {
                show_stack: config.dev(),
            })),
            translator: Arc::new(IdentityTranslator),
            announce,
        },
    );

    // 支持全地址监听 (0.0.0.0) 或本地回环监听 (127.0.0.1)
    let port: u16 = config.port();
    let address = match config.local() {
        true => Ipv4Addr::new(127, 0, 0, 1),
        false => Ipv4Addr::new(0, 0, 0, 0),
    };
    info!("服务端将在{}:{}上监听Socket连接", address, port);
    let socket = SocketAddrV4::new(address, port);

    let listener = match TcpListener::bind(socket).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("无法绑定端口：{}，错误：{}", port, e);
            panic!("无法绑定端口：{}，错误：{}", port, e);
        }
    };
    info!("端口{}绑定完成", port);

    server::serve(listener, app, config.base_path().map(str::to_string)).await;
}
