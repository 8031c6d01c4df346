//! 面向调用方的事件与命令
//!
//! 端点通过 `mpsc` 通道向展示层推送 `ChatEvent`，展示层以 `Command` 驱动端点。

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::message::Message;

/// 端点发送给调用方的事件
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// 监听端已绑定
    Listening { addr: SocketAddr },
    /// 连接建立
    Connected { peer: Option<SocketAddr> },
    /// 收到对端消息
    MessageReceived(Message),
    /// 本端消息已发出（用于本地回显）
    MessageSent(Message),
    /// 连接断开或拨号失败；`retry_in` 为下次重连前的等待时间
    Disconnected {
        reason: String,
        retry_in: Option<Duration>,
    },
    /// 输入未通过校验，未发生网络 IO
    ValidationFailed(ValidationError),
    /// 当前无连接，消息未发出
    SendFailed { reason: String },
    /// 清空历史记录
    HistoryCleared,
}

/// 调用方发送给端点的命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// 发送聊天消息
    SendMessage(String),
    /// 清空本地历史（无网络影响）
    ClearHistory,
}
