//! 帧编解码
//!
//! 帧格式:
//! ```text
//! ┌────────────────┬────────────────────────────────┐
//! │  Length (2B)   │         Payload (UTF-8)        │
//! │    u16 BE      │         消息文本                │
//! └────────────────┴────────────────────────────────┘
//! ```
//!
//! 一次写入对应对端的一次读取，不依赖换行符或结束符。

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::error::{ProtocolError, Result};
use crate::{FRAME_HEADER_SIZE, MAX_FRAME_SIZE};

fn map_read_err(e: std::io::Error) -> ProtocolError {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
        ProtocolError::ConnectionClosed
    } else {
        ProtocolError::Io(e)
    }
}

/// 帧读取器
pub struct FrameReader<R> {
    reader: R,
    buffer: Vec<u8>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// 创建新的帧读取器
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buffer: Vec::new(),
        }
    }

    /// 读取并解码一帧文本
    pub async fn read_frame(&mut self) -> Result<String> {
        // 读取帧头
        let mut header = [0u8; FRAME_HEADER_SIZE];
        self.reader
            .read_exact(&mut header)
            .await
            .map_err(map_read_err)?;

        // 解析长度（大端序）
        let length = u16::from_be_bytes(header) as usize;

        // 读取消息体（仅在需要时扩容）
        if self.buffer.len() < length {
            self.buffer.resize(length, 0);
        }
        self.reader
            .read_exact(&mut self.buffer[..length])
            .await
            .map_err(map_read_err)?;

        trace!(length, "frame received");
        let text = String::from_utf8(self.buffer[..length].to_vec())?;
        Ok(text)
    }

    /// 接收消息（read_frame 的别名）
    pub async fn recv(&mut self) -> Result<String> {
        self.read_frame().await
    }
}

/// 帧写入器
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    /// 创建新的帧写入器
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// 编码并写入一帧文本
    ///
    /// 超出帧大小时不写入任何字节。
    pub async fn write_frame(&mut self, text: &str) -> Result<()> {
        let payload = text.as_bytes();

        // 检查大小
        if payload.len() > MAX_FRAME_SIZE {
            return Err(ProtocolError::FrameTooLarge {
                size: payload.len(),
                max: MAX_FRAME_SIZE,
            });
        }

        // 帧头和消息体合并为一次写入
        let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
        frame.extend_from_slice(&(payload.len() as u16).to_be_bytes());
        frame.extend_from_slice(payload);

        self.writer.write_all(&frame).await?;
        self.writer.flush().await?;

        trace!(length = payload.len(), "frame sent");
        Ok(())
    }

    /// 关闭写入方向，对端读取将得到 EOF
    pub async fn shutdown(&mut self) -> Result<()> {
        self.writer.shutdown().await?;
        Ok(())
    }
}
