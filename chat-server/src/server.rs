//! 监听端实现
//!
//! 绑定端口后只接受一个连接，连接断开后不再重新接受。

use std::net::SocketAddr;

use protocol::{
    ChatEvent, Connection, FrameReader, FrameSender, Message, ProtocolError, SendError,
    TcpListener, Transport, TransportListener,
};
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 监听端
pub struct ListenerEndpoint<L = TcpListener> {
    listener: L,
    local_addr: SocketAddr,
    events: mpsc::Sender<ChatEvent>,
}

impl ListenerEndpoint<TcpListener> {
    /// 在所有网卡的指定端口上监听
    pub async fn start(port: u16, events: mpsc::Sender<ChatEvent>) -> protocol::Result<Self> {
        Self::bind(&format!("0.0.0.0:{}", port), events).await
    }

    /// 绑定指定地址，端口被占用时返回 `ProtocolError::Bind`
    pub async fn bind(addr: &str, events: mpsc::Sender<ChatEvent>) -> protocol::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Self::from_listener(listener, events).await
    }
}

impl<L: TransportListener> ListenerEndpoint<L> {
    /// 使用已绑定的监听器
    pub async fn from_listener(
        listener: L,
        events: mpsc::Sender<ChatEvent>,
    ) -> protocol::Result<Self> {
        let local_addr = listener.local_addr()?;
        info!("Server listening on {}", local_addr);

        let _ = events.send(ChatEvent::Listening { addr: local_addr }).await;

        Ok(Self {
            listener,
            local_addr,
            events,
        })
    }

    /// 本地绑定地址（仅用于展示）
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// 等待唯一的一个连接
    ///
    /// 消耗监听端，保证整个生命周期内至多接受一个连接。
    pub async fn accept_once(self) -> protocol::Result<ListenerSession<L::Transport>> {
        let transport = self.listener.accept().await?;
        let peer = transport.peer_addr();
        info!("Client connected from {:?}", peer);

        let (reader, sender) = Connection::new(transport).split_shared();
        let _ = self.events.send(ChatEvent::Connected { peer }).await;

        let recv_task = tokio::spawn(receive_loop(reader, self.events));

        Ok(ListenerSession {
            sender,
            recv_task: Some(recv_task),
        })
    }
}

/// 已建立的会话
///
/// 后台任务持续接收消息并推送 `MessageReceived`，
/// 首次接收失败时推送一次 `Disconnected` 后结束。
pub struct ListenerSession<T: Transport> {
    sender: FrameSender<T::Writer>,
    /// 接收循环结束并被等待后置为 None
    recv_task: Option<JoinHandle<()>>,
}

impl<T: Transport> ListenerSession<T> {
    /// 发送服务端消息，格式为 `Server: <body>`
    pub async fn send(&self, body: &str) -> Result<Message, SendError> {
        let msg = Message::from_server(body)?;
        self.sender.send(&msg.to_string()).await?;
        debug!("Sent: {}", msg);
        Ok(msg)
    }

    /// 接收循环是否已结束
    pub fn is_closed(&self) -> bool {
        self.recv_task
            .as_ref()
            .map_or(true, JoinHandle::is_finished)
    }

    /// 等待接收循环结束（对端断开或读取出错），可重复调用
    pub async fn closed(&mut self) {
        if let Some(task) = self.recv_task.as_mut() {
            let _ = task.await;
            self.recv_task = None;
        }
    }

    /// 主动关闭: 关闭写入方向并停止接收循环
    pub async fn close(self) {
        if let Err(e) = self.sender.shutdown().await {
            debug!("Shutdown error: {}", e);
        }
        if let Some(task) = self.recv_task {
            task.abort();
        }
    }
}

/// 接收循环
async fn receive_loop<R: AsyncRead + Unpin>(
    mut reader: FrameReader<R>,
    events: mpsc::Sender<ChatEvent>,
) {
    loop {
        match reader.recv().await {
            Ok(text) => {
                debug!("Received: {}", text);
                let _ = events
                    .send(ChatEvent::MessageReceived(Message::parse(&text)))
                    .await;
            }
            Err(e) => {
                match &e {
                    ProtocolError::ConnectionClosed => info!("Client disconnected"),
                    other => warn!("Receive error: {}", other),
                }
                let _ = events
                    .send(ChatEvent::Disconnected {
                        reason: e.to_string(),
                        retry_in: None,
                    })
                    .await;
                return;
            }
        }
    }
}
