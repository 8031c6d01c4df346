//! 拨号端核心实现
//!
//! 状态机:
//! ```text
//! Disconnected ──(启动/重连计时到期)──> Connecting
//! Connecting   ──(拨号成功)──────────> Connected
//! Connecting   ──(拨号失败)──────────> Disconnected
//! Connected    ──(读写失败)──────────> Disconnected
//! ```
//! 命令通道关闭即为外部取消，`run` 随之返回。

use std::time::Duration;

use chrono::{Local, NaiveTime};
use protocol::{
    normalize_username, validate_client_body, ChatEvent, Command, Connection, Connector,
    FrameReader, FrameWriter, Message, ProtocolError, SendError, TcpConnector, Transport,
    TransportConfig, CONNECT_TIMEOUT, DEFAULT_SERVER_ADDR, DEFAULT_USERNAME, RETRY_DELAY,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

/// 拨号端连接状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

/// 拨号端配置
#[derive(Clone, Debug)]
pub struct DialerConfig {
    /// 服务器地址 "host:port"
    pub addr: String,
    /// 用户名，启动后不再改变
    pub username: String,
    /// 重连间隔（固定，非指数退避）
    pub retry_delay: Duration,
    /// 单次拨号超时
    pub connect_timeout: Duration,
    /// 本地时钟，用于消息时间戳
    pub clock: fn() -> NaiveTime,
}

impl Default for DialerConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_SERVER_ADDR.to_string(),
            username: DEFAULT_USERNAME.to_string(),
            retry_delay: RETRY_DELAY,
            connect_timeout: CONNECT_TIMEOUT,
            clock: local_time,
        }
    }
}

impl DialerConfig {
    pub fn new(addr: impl Into<String>, username: Option<&str>) -> Self {
        Self {
            addr: addr.into(),
            username: normalize_username(username),
            ..Self::default()
        }
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_clock(mut self, clock: fn() -> NaiveTime) -> Self {
        self.clock = clock;
        self
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            connect_timeout: self.connect_timeout,
            nodelay: true,
        }
    }
}

fn local_time() -> NaiveTime {
    Local::now().time()
}

/// 会话结束原因
enum SessionEnd {
    /// 读写失败
    Lost(String),
    /// 命令通道关闭
    Shutdown,
}

/// 拨号端
pub struct Dialer<C = TcpConnector> {
    config: DialerConfig,
    connector: C,
    events: mpsc::Sender<ChatEvent>,
    state: watch::Sender<ConnectionState>,
}

impl Dialer<TcpConnector> {
    /// 使用 TCP 拨号器创建
    pub fn tcp(config: DialerConfig, events: mpsc::Sender<ChatEvent>) -> Self {
        let connector = TcpConnector::new(config.transport_config());
        Self::new(config, connector, events)
    }
}

impl<C: Connector> Dialer<C> {
    pub fn new(config: DialerConfig, connector: C, events: mpsc::Sender<ChatEvent>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            connector,
            events,
            state,
        }
    }

    /// 订阅连接状态
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn username(&self) -> &str {
        &self.config.username
    }

    /// 运行拨号循环，直到命令通道关闭
    pub async fn run(self, mut commands: mpsc::Receiver<Command>) {
        info!("Dialing {} as {}", self.config.addr, self.config.username);

        loop {
            self.set_state(ConnectionState::Connecting);

            let reason = match self.dial(&mut commands).await {
                None => break,
                Some(Ok(transport)) => {
                    let peer = transport.peer_addr();
                    info!("Connected to {}", self.config.addr);
                    self.set_state(ConnectionState::Connected);
                    self.emit(ChatEvent::Connected { peer }).await;

                    match self.run_session(transport, &mut commands).await {
                        SessionEnd::Lost(reason) => reason,
                        SessionEnd::Shutdown => break,
                    }
                }
                Some(Err(e)) => {
                    warn!("Unable to connect to {}: {}", self.config.addr, e);
                    e.to_string()
                }
            };

            self.set_state(ConnectionState::Disconnected);
            self.emit(ChatEvent::Disconnected {
                reason,
                retry_in: Some(self.config.retry_delay),
            })
            .await;

            if !self.wait_retry(&mut commands).await {
                break;
            }
        }

        self.set_state(ConnectionState::Disconnected);
        info!("Dialer stopped");
    }

    /// 拨号，期间仍处理命令；命令通道关闭时返回 None
    async fn dial(
        &self,
        commands: &mut mpsc::Receiver<Command>,
    ) -> Option<protocol::Result<C::Transport>> {
        let connect = self.connector.connect(&self.config.addr);
        tokio::pin!(connect);

        loop {
            tokio::select! {
                result = &mut connect => return Some(result),
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.handle_offline(cmd).await,
                    None => return None,
                },
            }
        }
    }

    /// 等待重连间隔，期间仍处理命令；命令通道关闭时返回 false
    async fn wait_retry(&self, commands: &mut mpsc::Receiver<Command>) -> bool {
        let deadline = Instant::now() + self.config.retry_delay;
        debug!("Retrying in {:?}", self.config.retry_delay);

        loop {
            tokio::select! {
                _ = sleep_until(deadline) => return true,
                cmd = commands.recv() => match cmd {
                    Some(cmd) => self.handle_offline(cmd).await,
                    None => return false,
                },
            }
        }
    }

    /// 已连接时的会话循环
    ///
    /// 接收在独立任务中进行，发送在当前任务中串行执行，两者互不阻塞。
    async fn run_session(
        &self,
        transport: C::Transport,
        commands: &mut mpsc::Receiver<Command>,
    ) -> SessionEnd {
        let (reader, mut writer) = Connection::new(transport).split();
        let mut recv_task = tokio::spawn(receive_loop(reader, self.events.clone()));

        loop {
            tokio::select! {
                result = &mut recv_task => {
                    let reason = match result {
                        Ok(e) => e.to_string(),
                        Err(e) => e.to_string(),
                    };
                    return SessionEnd::Lost(reason);
                }
                cmd = commands.recv() => match cmd {
                    Some(Command::SendMessage(text)) => {
                        let at = (self.config.clock)();
                        match send_chat(&mut writer, &self.config.username, &text, at).await {
                            Ok(msg) => self.emit(ChatEvent::MessageSent(msg)).await,
                            Err(SendError::Validation(e)) => {
                                self.emit(ChatEvent::ValidationFailed(e)).await
                            }
                            Err(SendError::Protocol(e @ ProtocolError::FrameTooLarge { .. })) => {
                                self.emit(ChatEvent::SendFailed { reason: e.to_string() }).await
                            }
                            Err(SendError::Protocol(e)) => {
                                warn!("Failed to send chat: {}", e);
                                recv_task.abort();
                                return SessionEnd::Lost(e.to_string());
                            }
                        }
                    }
                    Some(Command::ClearHistory) => self.emit(ChatEvent::HistoryCleared).await,
                    None => {
                        recv_task.abort();
                        return SessionEnd::Shutdown;
                    }
                },
            }
        }
    }

    /// 未连接时处理命令
    async fn handle_offline(&self, cmd: Command) {
        match cmd {
            Command::SendMessage(text) => match validate_client_body(&text) {
                Ok(_) => {
                    self.emit(ChatEvent::SendFailed {
                        reason: "Not connected to the server".to_string(),
                    })
                    .await
                }
                Err(e) => self.emit(ChatEvent::ValidationFailed(e)).await,
            },
            Command::ClearHistory => self.emit(ChatEvent::HistoryCleared).await,
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    async fn emit(&self, event: ChatEvent) {
        let _ = self.events.send(event).await;
    }
}

/// 校验并发送一条聊天消息
///
/// 校验失败时不写入任何字节。
pub async fn send_chat<W: AsyncWrite + Unpin>(
    writer: &mut FrameWriter<W>,
    username: &str,
    body: &str,
    at: NaiveTime,
) -> Result<Message, SendError> {
    let msg = Message::compose(username, body, at)?;
    writer.write_frame(&msg.to_string()).await?;
    debug!("Sent: {}", msg);
    Ok(msg)
}

/// 接收循环，返回导致结束的错误
async fn receive_loop<R: AsyncRead + Unpin>(
    mut reader: FrameReader<R>,
    events: mpsc::Sender<ChatEvent>,
) -> ProtocolError {
    loop {
        match reader.recv().await {
            Ok(text) => {
                debug!("Received: {}", text);
                let _ = events
                    .send(ChatEvent::MessageReceived(Message::parse(&text)))
                    .await;
            }
            Err(e) => {
                if e.is_eof() {
                    info!("Server closed connection");
                } else {
                    warn!("Receive error: {}", e);
                }
                return e;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use protocol::{
        TcpListener, TcpTransport, TransportListener, ValidationError, MAX_MESSAGE_CHARS,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::task::JoinHandle;

    const DELAY: Duration = Duration::from_millis(50);

    fn noon() -> NaiveTime {
        NaiveTime::from_hms_opt(12, 0, 0).unwrap()
    }

    /// 前 N 次拨号失败，之后走真实 TCP
    struct FlakyConnector {
        failures: usize,
        attempts: Arc<AtomicUsize>,
        inner: TcpConnector,
    }

    impl Connector for FlakyConnector {
        type Transport = TcpTransport;

        async fn connect(&self, addr: &str) -> protocol::Result<TcpTransport> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures {
                return Err(ProtocolError::Dial {
                    addr: addr.to_string(),
                    source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
                });
            }
            self.inner.connect(addr).await
        }
    }

    struct Harness {
        commands: mpsc::Sender<Command>,
        events: mpsc::Receiver<ChatEvent>,
        state: watch::Receiver<ConnectionState>,
        task: JoinHandle<()>,
    }

    fn spawn_dialer<C: Connector + 'static>(addr: &str, connector: C) -> Harness {
        let (event_tx, events) = mpsc::channel(64);
        let (commands, cmd_rx) = mpsc::channel(16);
        let config = DialerConfig::new(addr, Some("alice"))
            .with_retry_delay(DELAY)
            .with_clock(noon);
        let dialer = Dialer::new(config, connector, event_tx);
        let state = dialer.state();
        let task = tokio::spawn(dialer.run(cmd_rx));
        Harness {
            commands,
            events,
            state,
            task,
        }
    }

    async fn next_event(rx: &mut mpsc::Receiver<ChatEvent>) -> ChatEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("event channel closed")
    }

    async fn unused_addr() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().to_string()
    }

    #[tokio::test]
    async fn test_send_chat_format() {
        let mut buffer = Vec::new();
        let msg = send_chat(&mut FrameWriter::new(&mut buffer), "alice", "hello", noon())
            .await
            .unwrap();
        assert_eq!(msg.to_string(), "alice [12:00:00]: hello");

        let mut expected = vec![0x00, 23];
        expected.extend_from_slice(b"alice [12:00:00]: hello");
        assert_eq!(buffer, expected);
    }

    #[tokio::test]
    async fn test_send_chat_too_long_writes_nothing() {
        let mut buffer = Vec::new();
        let body = "a".repeat(MAX_MESSAGE_CHARS + 1);
        let result = send_chat(&mut FrameWriter::new(&mut buffer), "alice", &body, noon()).await;

        assert!(matches!(
            result,
            Err(SendError::Validation(ValidationError::TooLong { len: 201, max: 200 }))
        ));
        assert!(buffer.is_empty());
    }

    #[tokio::test]
    async fn test_send_chat_empty_writes_nothing() {
        for body in ["", "   ", "\t\n"] {
            let mut buffer = Vec::new();
            let result = send_chat(&mut FrameWriter::new(&mut buffer), "alice", body, noon()).await;
            assert!(matches!(
                result,
                Err(SendError::Validation(ValidationError::Empty))
            ));
            assert!(buffer.is_empty());
        }
    }

    #[tokio::test]
    async fn test_retries_until_connect_succeeds() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let attempts = Arc::new(AtomicUsize::new(0));
        let connector = FlakyConnector {
            failures: 2,
            attempts: Arc::clone(&attempts),
            inner: TcpConnector::default(),
        };

        let started = std::time::Instant::now();
        let mut h = spawn_dialer(&addr, connector);
        let _server_side = listener.accept().await.unwrap();

        for _ in 0..2 {
            assert!(matches!(
                next_event(&mut h.events).await,
                ChatEvent::Disconnected { retry_in: Some(DELAY), .. }
            ));
        }
        assert!(matches!(
            next_event(&mut h.events).await,
            ChatEvent::Connected { peer: Some(_) }
        ));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() >= DELAY * 2);
        assert_eq!(*h.state.borrow(), ConnectionState::Connected);

        drop(h.commands);
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn test_session_loss_emits_one_disconnect_then_reconnects() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let mut h = spawn_dialer(&addr, TcpConnector::default());

        let first = listener.accept().await.unwrap();
        assert!(matches!(next_event(&mut h.events).await, ChatEvent::Connected { .. }));

        // 服务端断开，拨号端读取得到 EOF
        drop(first);
        match next_event(&mut h.events).await {
            ChatEvent::Disconnected { reason, retry_in } => {
                assert_eq!(reason, ProtocolError::ConnectionClosed.to_string());
                assert_eq!(retry_in, Some(DELAY));
            }
            other => panic!("Unexpected event: {:?}", other),
        }

        // 重连后下一条事件即为 Connected，没有重复的 Disconnected
        let _second = listener.accept().await.unwrap();
        assert!(matches!(next_event(&mut h.events).await, ChatEvent::Connected { .. }));

        drop(h.commands);
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn test_send_and_receive_while_connected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let mut h = spawn_dialer(&addr, TcpConnector::default());

        let mut server = Connection::new(listener.accept().await.unwrap());
        assert!(matches!(next_event(&mut h.events).await, ChatEvent::Connected { .. }));

        // 接收任务阻塞等待时，发送照常完成
        h.commands
            .send(Command::SendMessage(" hello ".to_string()))
            .await
            .unwrap();
        match next_event(&mut h.events).await {
            ChatEvent::MessageSent(msg) => {
                assert_eq!(msg.to_string(), "alice [12:00:00]: hello")
            }
            other => panic!("Unexpected event: {:?}", other),
        }
        assert_eq!(server.recv().await.unwrap(), "alice [12:00:00]: hello");

        server.send("Server: hi alice").await.unwrap();
        match next_event(&mut h.events).await {
            ChatEvent::MessageReceived(msg) => {
                assert_eq!(msg.sender(), "Server");
                assert_eq!(msg.body(), "hi alice");
            }
            other => panic!("Unexpected event: {:?}", other),
        }

        drop(h.commands);
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn test_validation_failure_while_connected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let mut h = spawn_dialer(&addr, TcpConnector::default());

        let mut server = Connection::new(listener.accept().await.unwrap());
        assert!(matches!(next_event(&mut h.events).await, ChatEvent::Connected { .. }));

        h.commands
            .send(Command::SendMessage("x".repeat(201)))
            .await
            .unwrap();
        assert!(matches!(
            next_event(&mut h.events).await,
            ChatEvent::ValidationFailed(ValidationError::TooLong { .. })
        ));

        h.commands
            .send(Command::SendMessage("ok".to_string()))
            .await
            .unwrap();
        assert!(matches!(next_event(&mut h.events).await, ChatEvent::MessageSent(_)));

        // 被拒绝的消息没有产生任何帧
        assert_eq!(server.recv().await.unwrap(), "alice [12:00:00]: ok");

        drop(h.commands);
        h.task.await.unwrap();
    }

    #[tokio::test]
    async fn test_commands_while_disconnected() {
        let addr = unused_addr().await;
        let mut h = spawn_dialer(&addr, TcpConnector::default());

        assert!(matches!(
            next_event(&mut h.events).await,
            ChatEvent::Disconnected { retry_in: Some(_), .. }
        ));

        h.commands.send(Command::ClearHistory).await.unwrap();
        h.commands
            .send(Command::SendMessage("hello".to_string()))
            .await
            .unwrap();
        h.commands
            .send(Command::SendMessage(String::new()))
            .await
            .unwrap();

        let mut seen = Vec::new();
        while seen.len() < 3 {
            match next_event(&mut h.events).await {
                ChatEvent::Disconnected { .. } => {}
                other => seen.push(other),
            }
        }
        assert_eq!(seen[0], ChatEvent::HistoryCleared);
        assert!(matches!(seen[1], ChatEvent::SendFailed { .. }));
        assert_eq!(seen[2], ChatEvent::ValidationFailed(ValidationError::Empty));

        drop(h.commands);
        h.task.await.unwrap();
        assert_eq!(*h.state.borrow(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_closing_commands_stops_dialer() {
        let addr = unused_addr().await;
        let h = spawn_dialer(&addr, TcpConnector::default());

        drop(h.commands);
        tokio::time::timeout(Duration::from_secs(5), h.task)
            .await
            .expect("dialer did not stop")
            .unwrap();
    }
}
