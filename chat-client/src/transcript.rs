//! 聊天记录
//!
//! 展示层一侧的历史模型: 把 `ChatEvent` 转成可显示的行，并响应清空请求。

use std::collections::VecDeque;

use protocol::{ChatEvent, ValidationError, MAX_MESSAGE_CHARS};

/// 消息历史上限
const MAX_MESSAGES: usize = 1000;

/// 一行聊天记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptLine {
    pub text: String,
    pub is_system: bool,
}

/// 聊天记录（使用 VecDeque 提高删除效率）
#[derive(Debug)]
pub struct Transcript {
    lines: VecDeque<TranscriptLine>,
    status: String,
}

impl Transcript {
    pub fn new(username: &str) -> Self {
        let mut transcript = Self {
            lines: VecDeque::new(),
            status: "Connecting to the server...".to_string(),
        };
        transcript.push_system(format!("Your username: {}", username));
        transcript
    }

    /// 应用一个事件，返回新增的行
    pub fn apply(&mut self, event: &ChatEvent) -> Option<&TranscriptLine> {
        match event {
            ChatEvent::Listening { addr } => {
                self.push_system(format!("Server address: {}", addr));
            }
            ChatEvent::Connected { .. } => {
                self.status = "Connected to the server".to_string();
                self.push_system("Connected to the server!".to_string());
            }
            ChatEvent::MessageReceived(msg) => {
                self.push(msg.to_string(), false);
            }
            ChatEvent::MessageSent(msg) => {
                let text = match msg.timestamp() {
                    Some(ts) => format!("You [{}]: {}", ts, msg.body()),
                    None => format!("You: {}", msg.body()),
                };
                self.push(text, false);
            }
            ChatEvent::Disconnected { retry_in: Some(_), .. } => {
                self.status = "Retrying connection...".to_string();
                self.push_system("Unable to connect to the server. Retrying...".to_string());
            }
            ChatEvent::Disconnected { retry_in: None, .. } => {
                self.status = "Disconnected".to_string();
                self.push_system("Client disconnected.".to_string());
            }
            ChatEvent::ValidationFailed(ValidationError::TooLong { .. }) => {
                self.push_system(format!(
                    "Message too long! (Max: {} characters)",
                    MAX_MESSAGE_CHARS
                ));
            }
            // 空消息静默忽略
            ChatEvent::ValidationFailed(ValidationError::Empty) => return None,
            ChatEvent::SendFailed { .. } => {
                self.push_system("Error sending message.".to_string());
            }
            ChatEvent::HistoryCleared => {
                self.lines.clear();
                return None;
            }
        }
        self.lines.back()
    }

    pub fn lines(&self) -> impl Iterator<Item = &TranscriptLine> {
        self.lines.iter()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// 状态栏文字
    pub fn status(&self) -> &str {
        &self.status
    }

    fn push(&mut self, text: String, is_system: bool) {
        // 限制消息历史数量（VecDeque::pop_front 是 O(1)）
        if self.lines.len() >= MAX_MESSAGES {
            self.lines.pop_front();
        }
        self.lines.push_back(TranscriptLine { text, is_system });
    }

    fn push_system(&mut self, text: String) {
        self.push(text, true);
    }
}
