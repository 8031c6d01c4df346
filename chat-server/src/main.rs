//! 聊天监听端
//!
//! 基于 Tokio 的单连接 TCP 服务器，标准输入的每一行作为一条消息发出。

use std::io::BufRead;
use std::thread;

use anyhow::Result;
use chat_server::ListenerEndpoint;
use clap::Parser;
use protocol::{ChatEvent, SendError, DEFAULT_PORT};
use tokio::sync::mpsc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "chat-server")]
#[command(about = "Accept one chat peer and exchange messages with it")]
struct Args {
    /// 监听端口
    #[arg(short, long, env = "CHAT_PORT", default_value_t = DEFAULT_PORT)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("chat_server=info".parse()?)
                .add_directive("protocol=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let (event_tx, mut event_rx) = mpsc::channel::<ChatEvent>(64);

    // 端口被占用时直接退出
    let endpoint = ListenerEndpoint::start(args.port, event_tx).await?;

    let printer = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            print_event(&event);
        }
    });

    let mut session = tokio::select! {
        result = endpoint.accept_once() => result?,
        _ = tokio::signal::ctrl_c() => return Ok(()),
    };

    let mut lines = stdin_lines();
    loop {
        tokio::select! {
            line = lines.recv() => {
                let Some(line) = line else { break };
                if line.trim() == "/quit" {
                    break;
                }
                match session.send(&line).await {
                    Ok(msg) => println!("You: {}", msg.body()),
                    Err(SendError::Validation(_)) => {}
                    Err(e) => {
                        warn!("Failed to send: {}", e);
                        println!("Error sending message.");
                    }
                }
            }
            _ = session.closed() => break,
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    if !session.is_closed() {
        session.close().await;
    }
    let _ = printer.await;

    Ok(())
}

/// 在独立线程中阻塞读取标准输入，逐行转发到 tokio 通道
fn stdin_lines() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.blocking_send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn print_event(event: &ChatEvent) {
    match event {
        ChatEvent::Listening { addr } => {
            println!("Server address: {}", addr);
            println!("Waiting for a connection...");
        }
        ChatEvent::Connected { .. } => println!("Client connected!"),
        ChatEvent::MessageReceived(msg) => println!("{}", msg),
        ChatEvent::Disconnected { .. } => println!("Client disconnected."),
        _ => {}
    }
}
