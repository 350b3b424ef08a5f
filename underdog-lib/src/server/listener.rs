use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr};

use tokio::net::TcpListener;
use tracing::{debug, info};

use crate::error::{Result, UnderdogError};

/// Binds the first free port of `base_port..base_port + instances`.
///
/// Shards are started without being told their position: each one takes the lowest
/// port not yet claimed by a sibling.
pub async fn bind_first_free(
    ip: IpAddr,
    base_port: u16,
    instances: u16,
) -> Result<(TcpListener, u16)> {
    for offset in 0..instances {
        let port = base_port + offset;
        match TcpListener::bind(SocketAddr::new(ip, port)).await {
            Ok(listener) => {
                info!(%ip, port, shard = offset, "shard listening");
                return Ok((listener, port));
            }
            Err(e) if e.kind() == ErrorKind::AddrInUse => {
                debug!(port, "port already in use, trying next one");
            }
            Err(e) => return Err(UnderdogError::Io(e)),
        }
    }
    Err(UnderdogError::NoFreePort { base_port, instances })
}
