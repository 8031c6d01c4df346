//! 错误类型定义

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 协议错误类型
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 监听端口绑定失败
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// 拨号失败
    #[error("Failed to connect to {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// 帧大小超限
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// 帧内容不是合法的 UTF-8
    #[error("Invalid UTF-8 payload: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// 连接超时
    #[error("Connection timeout")]
    ConnectionTimeout,

    /// 连接已关闭（对端 EOF）
    #[error("Connection closed")]
    ConnectionClosed,
}

impl ProtocolError {
    /// 是否为对端正常关闭
    pub fn is_eof(&self) -> bool {
        matches!(self, ProtocolError::ConnectionClosed)
    }
}

/// 输入校验错误，在任何网络 IO 之前返回
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValidationError {
    /// 消息为空或只含空白
    #[error("Message is empty")]
    Empty,

    /// 消息过长
    #[error("Message too long! ({len} characters, max: {max})")]
    TooLong { len: usize, max: usize },
}

/// 发送消息失败
#[derive(Error, Debug)]
pub enum SendError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// 协议操作结果类型
pub type Result<T> = std::result::Result<T, ProtocolError>;
