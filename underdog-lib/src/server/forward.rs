//! Request forwarding between shards.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::error::{Result, UnderdogError};
use crate::protocol::Command;

/// Sends `command` to the shard at `addr` and returns its complete reply.
///
/// The peer answers once and closes the connection, so the reply is everything read
/// up to EOF. An empty reply is an error.
pub async fn exchange(
    addr: SocketAddr,
    command: &Command,
    connect_timeout: Duration,
    reply_timeout: Duration,
) -> Result<Bytes> {
    let mut upstream = match timeout(connect_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => return Err(UnderdogError::Proxy(format!("connect to {addr} failed: {e}"))),
        Err(_) => return Err(UnderdogError::Proxy(format!("connect to {addr} timed out"))),
    };
    debug!(%addr, "proxy connected");

    let reply = timeout(reply_timeout, async {
        upstream.write_all(command.to_line().as_bytes()).await?;
        let mut buf = BytesMut::with_capacity(64);
        while upstream.read_buf(&mut buf).await? > 0 {}
        Ok::<_, std::io::Error>(buf)
    })
    .await
    .map_err(|_| UnderdogError::Proxy(format!("no reply from {addr} in time")))??;

    if reply.is_empty() {
        return Err(UnderdogError::Proxy(format!("{addr} closed without replying")));
    }
    Ok(reply.freeze())
}
