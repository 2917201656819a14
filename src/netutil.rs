use std::{io, io::ErrorKind, net::TcpListener};

use socket2::{Domain, Socket, Type};

/// Builds a listening socket the way both listeners need it: SO_REUSEADDR,
/// an explicit backlog, and bound to `bind_address:port` (§4.6, §6). A
/// `port` of `0` asks the OS for an ephemeral port.
pub fn bind_listener(bind_address: &str, port: u16, backlog: i32) -> io::Result<TcpListener> {
  let addr: std::net::SocketAddr = format!("{bind_address}:{port}")
    .parse()
    .map_err(|e| io::Error::new(ErrorKind::InvalidInput, format!("invalid bind address: {e}")))?;
  let socket = Socket::new(Domain::for_address(addr), Type::STREAM, None)?;
  socket.set_reuse_address(true)?;
  socket.bind(&addr.into())?;
  socket.listen(backlog)?;
  Ok(socket.into())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn bind_listener_reports_assigned_ephemeral_port() {
    let listener = bind_listener("127.0.0.1", 0, 16).unwrap();
    assert_ne!(listener.local_addr().unwrap().port(), 0);
  }
}
