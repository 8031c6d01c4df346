//! 拨号端
//!
//! 连接固定地址，失败后按固定间隔重试，连接成功后收发消息。

mod client;
mod transcript;

pub use client::{send_chat, ConnectionState, Dialer, DialerConfig};
pub use transcript::{Transcript, TranscriptLine};
