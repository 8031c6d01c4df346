//! 双端聊天共享协议库
//!
//! 包含:
//! - 消息类型定义 (Message)
//! - 传输层抽象 (Transport / Connector / TransportListener)
//! - 帧编解码 (Codec)
//! - 连接封装 (Connection / FrameSender)
//! - 调用方事件与命令 (ChatEvent / Command)

mod codec;
mod connection;
mod constants;
mod error;
mod event;
mod message;
mod transport;

pub use codec::{FrameReader, FrameWriter};
pub use connection::{Connection, FrameSender};
pub use constants::*;
pub use error::{ProtocolError, Result, SendError, ValidationError};
pub use event::{ChatEvent, Command};
pub use message::{normalize_username, validate_client_body, Message};
pub use transport::{
    Connector, TcpConnector, TcpListener, TcpTransport, Transport, TransportConfig,
    TransportListener,
};
