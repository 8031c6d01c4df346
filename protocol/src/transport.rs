//! 传输层抽象
//!
//! `Transport` 描述一条已建立的双向字节流，`Connector` 是拨号端的
//! 拨号入口，`TransportListener` 是监听端的接入入口。
//! 拨号端通过 `Connector` 注入，测试中可替换为会失败的替身。

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{ProtocolError, Result};
use crate::CONNECT_TIMEOUT;

/// 传输层配置
#[derive(Clone, Debug)]
pub struct TransportConfig {
    /// 连接超时时间
    pub connect_timeout: Duration,
    /// 是否禁用 Nagle 算法（TCP nodelay）
    pub nodelay: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout: CONNECT_TIMEOUT,
            nodelay: true, // 聊天应用建议开启，减少延迟
        }
    }
}

/// 已建立连接的传输层抽象
pub trait Transport: Send + Sized + 'static {
    /// 读取端类型
    type Reader: AsyncRead + Unpin + Send + 'static;
    /// 写入端类型
    type Writer: AsyncWrite + Unpin + Send + 'static;

    /// 对端地址（仅用于展示）
    fn peer_addr(&self) -> Option<SocketAddr>;

    /// 分离读写端
    ///
    /// 读写两端互不共享游标，读阻塞时写入不受影响。
    fn split(self) -> (Self::Reader, Self::Writer);
}

/// 拨号器抽象（客户端使用）
pub trait Connector: Send + Sync {
    /// 拨号成功得到的传输类型
    type Transport: Transport;

    /// 建立连接
    ///
    /// # Arguments
    /// * `addr` - 服务器地址，格式为 "host:port"
    fn connect(&self, addr: &str) -> impl Future<Output = Result<Self::Transport>> + Send;
}

/// 传输层监听器抽象 trait（服务端使用）
pub trait TransportListener: Send + Sync + Sized {
    /// 对应的传输类型
    type Transport: Transport;

    /// 绑定地址并开始监听
    ///
    /// # Arguments
    /// * `addr` - 监听地址，格式为 "host:port"
    fn bind(addr: &str) -> impl Future<Output = Result<Self>> + Send;

    /// 接受新连接
    fn accept(&self) -> impl Future<Output = Result<Self::Transport>> + Send;

    /// 本地绑定地址
    fn local_addr(&self) -> Result<SocketAddr>;
}

// ============================================================================
// TCP 实现
// ============================================================================

/// TCP 传输实现
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
}

impl Transport for TcpTransport {
    type Reader = OwnedReadHalf;
    type Writer = OwnedWriteHalf;

    fn peer_addr(&self) -> Option<SocketAddr> {
        self.stream.peer_addr().ok()
    }

    fn split(self) -> (Self::Reader, Self::Writer) {
        self.stream.into_split()
    }
}

impl TcpTransport {
    /// 带超时拨号
    pub async fn connect(addr: &str, config: &TransportConfig) -> Result<Self> {
        let stream = timeout(config.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ProtocolError::ConnectionTimeout)?
            .map_err(|source| ProtocolError::Dial {
                addr: addr.to_string(),
                source,
            })?;

        stream.set_nodelay(config.nodelay)?;
        Ok(Self { stream })
    }

    /// 从已有的 TcpStream 创建（服务端 accept 后使用）
    pub fn from_stream(stream: TcpStream) -> Result<Self> {
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }
}

/// TCP 拨号器
#[derive(Clone, Debug, Default)]
pub struct TcpConnector {
    config: TransportConfig,
}

impl TcpConnector {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }
}

impl Connector for TcpConnector {
    type Transport = TcpTransport;

    async fn connect(&self, addr: &str) -> Result<TcpTransport> {
        debug!("Dialing {}", addr);
        TcpTransport::connect(addr, &self.config).await
    }
}

/// TCP 监听器实现
pub struct TcpListener {
    listener: tokio::net::TcpListener,
}

impl TransportListener for TcpListener {
    type Transport = TcpTransport;

    async fn bind(addr: &str) -> Result<Self> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| ProtocolError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        Ok(Self { listener })
    }

    async fn accept(&self) -> Result<TcpTransport> {
        let (stream, _addr) = self.listener.accept().await.map_err(ProtocolError::Io)?;
        TcpTransport::from_stream(stream)
    }

    fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tcp_listener_bind() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        assert!(addr.port() > 0);
    }

    #[tokio::test]
    async fn test_bind_port_in_use() {
        let first = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = first.local_addr().unwrap().to_string();

        let result = TcpListener::bind(&addr).await;
        assert!(matches!(result, Err(ProtocolError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_tcp_connect_and_accept() {
        // 启动监听
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // 客户端连接
        let client_handle = tokio::spawn(async move {
            TcpConnector::default().connect(&addr.to_string()).await
        });

        // 服务端接受
        let server_transport = listener.accept().await.unwrap();
        let client_transport = client_handle.await.unwrap().unwrap();

        assert_eq!(client_transport.peer_addr(), Some(addr));
        assert!(server_transport.peer_addr().is_some());
    }

    #[tokio::test]
    async fn test_dial_refused() {
        // 先占用再释放，得到一个无人监听的端口
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().to_string()
        };

        let result = TcpConnector::default().connect(&addr).await;
        assert!(matches!(result, Err(ProtocolError::Dial { .. })));
    }
}
