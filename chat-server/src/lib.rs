//! 监听端
//!
//! 绑定固定端口，只接受一个对端连接并与之收发消息。

mod server;

pub use server::{ListenerEndpoint, ListenerSession};
