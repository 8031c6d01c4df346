//! 协议常量定义

use std::time::Duration;

/// 监听端默认端口
pub const DEFAULT_PORT: u16 = 5000;

/// 拨号端默认目标地址
pub const DEFAULT_SERVER_ADDR: &str = "127.0.0.1:5000";

/// 客户端单条消息最大字符数
pub const MAX_MESSAGE_CHARS: usize = 200;

/// 帧负载最大字节数（长度头为 u16）
pub const MAX_FRAME_SIZE: usize = u16::MAX as usize;

/// 帧头大小: 2 字节长度
pub const FRAME_HEADER_SIZE: usize = 2;

/// 监听端发出消息的发送者名称
pub const SERVER_SENDER: &str = "Server";

/// 未设置用户名时的默认名称
pub const DEFAULT_USERNAME: &str = "Anonymous";

/// 时间戳格式 HH:MM:SS
pub const TIMESTAMP_FORMAT: &str = "%H:%M:%S";

/// 重连间隔（秒）
pub const RETRY_DELAY_SECS: u64 = 3;

/// 连接超时（秒）
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// 重连间隔 Duration
pub const RETRY_DELAY: Duration = Duration::from_secs(RETRY_DELAY_SECS);

/// 连接超时 Duration
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(CONNECT_TIMEOUT_SECS);
