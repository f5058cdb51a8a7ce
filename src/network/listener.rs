//! Control listener socket

use socket2::{Domain, Protocol, Socket, Type};
use std::net::SocketAddr;
use tokio::net::TcpListener;

use crate::error::NetworkError;

/// Bind the control listener.
///
/// `SO_REUSEADDR` is set so a restarted backend can rebind while old
/// connections linger in TIME_WAIT.
pub fn bind_control_listener(addr: SocketAddr) -> Result<TcpListener, NetworkError> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
        .map_err(|e| NetworkError::BindFailed(format!("socket: {}", e)))?;

    socket
        .set_reuse_address(true)
        .map_err(|e| NetworkError::BindFailed(format!("SO_REUSEADDR: {}", e)))?;
    socket
        .set_nonblocking(true)
        .map_err(|e| NetworkError::BindFailed(format!("nonblocking: {}", e)))?;
    socket
        .bind(&addr.into())
        .map_err(|e| NetworkError::BindFailed(format!("{}: {}", addr, e)))?;
    socket
        .listen(1024)
        .map_err(|e| NetworkError::BindFailed(format!("listen: {}", e)))?;

    TcpListener::from_std(socket.into()).map_err(|e| NetworkError::BindFailed(e.to_string()))
}
