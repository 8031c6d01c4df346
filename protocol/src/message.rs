//! 消息类型定义
//!
//! 线上文本格式:
//! - 客户端: `<username> [<HH:MM:SS>]: <body>`
//! - 服务端: `Server: <body>`

use std::fmt;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::{DEFAULT_USERNAME, MAX_MESSAGE_CHARS, SERVER_SENDER, TIMESTAMP_FORMAT};

/// 一条聊天消息（不可变）
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Message {
    sender: String,
    timestamp: Option<String>,
    body: String,
}

impl Message {
    /// 构造客户端消息，时间戳精确到秒
    pub fn compose(username: &str, body: &str, at: NaiveTime) -> Result<Self, ValidationError> {
        let body = validate_client_body(body)?;
        Ok(Self {
            sender: username.to_string(),
            timestamp: Some(at.format(TIMESTAMP_FORMAT).to_string()),
            body: body.to_string(),
        })
    }

    /// 构造服务端消息（无时间戳，长度只受帧大小限制）
    pub fn from_server(body: &str) -> Result<Self, ValidationError> {
        let body = body.trim();
        if body.is_empty() {
            return Err(ValidationError::Empty);
        }
        Ok(Self {
            sender: SERVER_SENDER.to_string(),
            timestamp: None,
            body: body.to_string(),
        })
    }

    /// 从收到的帧文本还原消息
    ///
    /// 不会失败: 无法识别发送者的文本整体作为消息体。
    /// 优先按最左侧合法的 ` [HH:MM:SS]: ` 拆分，用户名中可以含有 `": "`。
    /// 对任意输入 `Message::parse(t).to_string() == t`。
    pub fn parse(text: &str) -> Self {
        if let Some((sender, ts, body)) = find_timestamped(text) {
            return Self {
                sender: sender.to_string(),
                timestamp: Some(ts.to_string()),
                body: body.to_string(),
            };
        }
        match text.split_once(": ") {
            Some((sender, body)) if !sender.is_empty() => Self {
                sender: sender.to_string(),
                timestamp: None,
                body: body.to_string(),
            },
            _ => Self {
                sender: String::new(),
                timestamp: None,
                body: text.to_string(),
            },
        }
    }

    pub fn sender(&self) -> &str {
        &self.sender
    }

    pub fn timestamp(&self) -> Option<&str> {
        self.timestamp.as_deref()
    }

    pub fn body(&self) -> &str {
        &self.body
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.timestamp {
            Some(ts) => write!(f, "{} [{}]: {}", self.sender, ts, self.body),
            None if self.sender.is_empty() => f.write_str(&self.body),
            None => write!(f, "{}: {}", self.sender, self.body),
        }
    }
}

/// 查找 `<sender> [HH:MM:SS]: <body>`，返回 (发送者, 时间戳, 消息体)
fn find_timestamped(text: &str) -> Option<(&str, &str, &str)> {
    text.match_indices("]: ").find_map(|(end, _)| {
        let (sender, ts) = text[..end].rsplit_once(" [")?;
        (!sender.is_empty() && is_timestamp(ts)).then(|| (sender, ts, &text[end + 3..]))
    })
}

fn is_timestamp(ts: &str) -> bool {
    NaiveTime::parse_from_str(ts, TIMESTAMP_FORMAT)
        .map(|t| t.format(TIMESTAMP_FORMAT).to_string() == ts)
        .unwrap_or(false)
}

/// 校验客户端消息体，返回去除首尾空白后的内容
pub fn validate_client_body(body: &str) -> Result<&str, ValidationError> {
    let body = body.trim();
    if body.is_empty() {
        return Err(ValidationError::Empty);
    }
    let len = body.chars().count();
    if len > MAX_MESSAGE_CHARS {
        return Err(ValidationError::TooLong {
            len,
            max: MAX_MESSAGE_CHARS,
        });
    }
    Ok(body)
}

/// 规范化用户名，空或未设置时使用 "Anonymous"
pub fn normalize_username(raw: Option<&str>) -> String {
    match raw.map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => DEFAULT_USERNAME.to_string(),
    }
}
