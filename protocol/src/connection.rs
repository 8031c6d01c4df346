//! 连接封装
//!
//! 将传输层和编解码封装在一起，提供文本帧收发接口。

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;

use crate::codec::{FrameReader, FrameWriter};
use crate::error::Result;
use crate::transport::Transport;

/// 连接封装
///
/// # Type Parameters
/// * `R` - 读取端类型
/// * `W` - 写入端类型
pub struct Connection<R, W> {
    reader: FrameReader<R>,
    writer: FrameWriter<W>,
}

impl<R: AsyncRead + Unpin, W: AsyncWrite + Unpin> Connection<R, W> {
    /// 从传输层创建连接
    pub fn new<T: Transport<Reader = R, Writer = W>>(transport: T) -> Self {
        let (reader, writer) = transport.split();
        Self::from_parts(reader, writer)
    }

    /// 从读写端直接创建连接
    pub fn from_parts(reader: R, writer: W) -> Self {
        Self {
            reader: FrameReader::new(reader),
            writer: FrameWriter::new(writer),
        }
    }

    /// 分离为读取端和写入端
    ///
    /// 用于需要并发读写的场景
    pub fn split(self) -> (FrameReader<R>, FrameWriter<W>) {
        (self.reader, self.writer)
    }

    /// 分离为读取端和可共享的发送端
    pub fn split_shared(self) -> (FrameReader<R>, FrameSender<W>) {
        (self.reader, FrameSender::new(self.writer))
    }

    /// 接收一帧文本
    pub async fn recv(&mut self) -> Result<String> {
        self.reader.read_frame().await
    }

    /// 发送一帧文本
    pub async fn send(&mut self, text: &str) -> Result<()> {
        self.writer.write_frame(text).await
    }
}

/// 可克隆的发送端
///
/// 多处同时发送时由互斥锁串行化，帧之间不会交错。
pub struct FrameSender<W> {
    inner: Arc<Mutex<FrameWriter<W>>>,
}

impl<W> Clone for FrameSender<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W: AsyncWrite + Unpin> FrameSender<W> {
    pub fn new(writer: FrameWriter<W>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(writer)),
        }
    }

    /// 发送一帧文本
    pub async fn send(&self, text: &str) -> Result<()> {
        self.inner.lock().await.write_frame(text).await
    }

    /// 关闭写入方向
    pub async fn shutdown(&self) -> Result<()> {
        self.inner.lock().await.shutdown().await
    }
}
