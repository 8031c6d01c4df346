//! 聊天拨号端
//!
//! 命令行客户端: 标准输入的每一行作为一条消息发出，`/clear` 清空记录，`/quit` 退出。

use std::io::BufRead;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use chat_client::{Dialer, DialerConfig, Transcript};
use clap::Parser;
use protocol::{ChatEvent, Command, DEFAULT_SERVER_ADDR, RETRY_DELAY_SECS};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "chat-client")]
#[command(about = "Connect to a chat server, retrying until it is reachable")]
struct Args {
    /// 服务器地址
    #[arg(short, long, env = "CHAT_ADDR", default_value = DEFAULT_SERVER_ADDR)]
    addr: String,

    /// 用户名，为空时使用 Anonymous
    #[arg(short, long, env = "CHAT_USERNAME")]
    username: Option<String>,

    /// 重连间隔（秒）
    #[arg(long, default_value_t = RETRY_DELAY_SECS)]
    retry_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("chat_client=info".parse()?)
                .add_directive("protocol=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let config = DialerConfig::new(args.addr, args.username.as_deref())
        .with_retry_delay(Duration::from_secs(args.retry_secs));

    let (event_tx, mut event_rx) = mpsc::channel::<ChatEvent>(64);
    let (cmd_tx, cmd_rx) = mpsc::channel::<Command>(32);

    let dialer = Dialer::tcp(config, event_tx);
    let mut transcript = Transcript::new(dialer.username());
    for line in transcript.lines() {
        println!("{}", line.text);
    }

    let dialer_task = tokio::spawn(dialer.run(cmd_rx));

    let mut lines = stdin_lines();
    loop {
        tokio::select! {
            line = lines.recv() => {
                let Some(line) = line else { break };
                if line.trim() == "/quit" {
                    break;
                }
                let cmd = if line.trim() == "/clear" {
                    Command::ClearHistory
                } else {
                    Command::SendMessage(line)
                };
                cmd_tx.send(cmd).await?;
            }
            event = event_rx.recv() => {
                let Some(event) = event else { break };
                if event == ChatEvent::HistoryCleared {
                    // 清屏
                    print!("\x1B[2J\x1B[H");
                }
                if let Some(line) = transcript.apply(&event) {
                    println!("{}", line.text);
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    // 关闭命令通道即停止拨号循环
    drop(cmd_tx);
    drop(event_rx);
    let _ = dialer_task.await;

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
