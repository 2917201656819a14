use std::io::{self, ErrorKind, Read, Write};

/// Reads exactly one byte, retrying on `Interrupted` (§4.4's "read
/// discipline"). Returns `Ok(None)` on clean end-of-stream, `Ok(Some(byte))`
/// otherwise. A configured read timeout surfaces as `Err` with
/// `ErrorKind::WouldBlock`/`TimedOut`, which the caller treats as the
/// inactivity-timeout transition to CLOSING.
pub fn read_one_byte<R: Read>(reader: &mut R) -> io::Result<Option<u8>> {
  let mut buf = [0u8; 1];
  loop {
    match reader.read(&mut buf) {
      Ok(0) => return Ok(None),
      Ok(_) => return Ok(Some(buf[0])),
      Err(e) if e.kind() == ErrorKind::Interrupted => continue,
      Err(e) => return Err(e),
    }
  }
}

/// Writes the whole buffer, retrying short writes and `Interrupted`
/// (§4.5's "write discipline"). A `write` returning `Ok(0)` is treated as a
/// fatal error, matching the spec's "a return of 0 ... terminates the
/// session".
pub fn write_all_retry<W: Write>(writer: &mut W, mut buf: &[u8]) -> io::Result<()> {
  while !buf.is_empty() {
    match writer.write(buf) {
      Ok(0) => {
        return Err(io::Error::new(
          ErrorKind::WriteZero,
          "write returned 0 bytes",
        ))
      }
      Ok(n) => buf = &buf[n..],
      Err(e) if e.kind() == ErrorKind::Interrupted => continue,
      Err(e) => return Err(e),
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use std::io::Cursor;

  use super::*;

  #[test]
  fn read_one_byte_returns_bytes_then_none() {
    let mut cursor = Cursor::new(vec![b'h', b'i']);
    assert_eq!(read_one_byte(&mut cursor).unwrap(), Some(b'h'));
    assert_eq!(read_one_byte(&mut cursor).unwrap(), Some(b'i'));
    assert_eq!(read_one_byte(&mut cursor).unwrap(), None);
  }

  #[test]
  fn write_all_retry_writes_everything() {
    let mut out = Vec::new();
    write_all_retry(&mut out, b"hello\0").unwrap();
    assert_eq!(out, b"hello\0");
  }
}
