//! UNIX stream control socket: accept, handle exactly one command, close
//! (§4.5 step 6). Clients open a fresh connection per command, matching the
//! wire protocol's request/response framing over `unix:`.

use std::fs;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};

use crate::control::DispatchContext;
use crate::error::Result;

const READ_BUF: usize = 4096;

pub struct UnixControl {
    listener: mio::net::UnixListener,
    path: PathBuf,
}

impl UnixControl {
    pub fn bind(path: &Path) -> Result<Self> {
        match fs::remove_file(path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let std_listener = std::os::unix::net::UnixListener::bind(path)?;
        std_listener.set_nonblocking(true)?;
        Ok(Self {
            listener: mio::net::UnixListener::from_std(std_listener),
            path: path.to_path_buf(),
        })
    }

    pub fn listener_mut(&mut self) -> &mut mio::net::UnixListener {
        &mut self.listener
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn unlink(&self) {
        let _ = fs::remove_file(&self.path);
    }

    pub fn service(&mut self, ctx: &mut DispatchContext<'_>) -> Result<()> {
        loop {
            let (mut stream, _peer) = match self.listener.accept() {
                Ok(pair) => pair,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };

            let mut buf = [0u8; READ_BUF];
            let n = match stream.read(&mut buf) {
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => continue,
                Err(_) => continue,
            };
            if n == 0 {
                continue;
            }

            let raw = String::from_utf8_lossy(&buf[..n]);
            let response = crate::control::dispatch(ctx, &raw, false);
            let _ = stream.write_all(response.as_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[test]
    fn binds_and_unlinks_socket_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ctl.sock");
        let control = UnixControl::bind(&path).unwrap();
        assert!(path.exists());
        control.unlink();
        assert!(!path.exists());
    }

    #[test]
    fn services_one_command_per_connection() {
        use std::os::unix::net::UnixStream;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ctl.sock");
        let mut control = UnixControl::bind(&path).unwrap();

        let mut table = crate::session::SessionTable::new();
        let mut allocator = crate::net::ports::PortAllocator::new(35700, 35720, None).unwrap();
        let poll = mio::Poll::new().unwrap();
        let mut ctx = DispatchContext {
            table: &mut table,
            allocator: &mut allocator,
            registry: poll.registry(),
            bind_ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            max_ttl: 60,
        };

        let mut client = UnixStream::connect(&path).unwrap();
        client.write_all(b"V").unwrap();

        std::thread::sleep(std::time::Duration::from_millis(20));
        control.service(&mut ctx).unwrap();

        let mut response = String::new();
        client.set_read_timeout(Some(std::time::Duration::from_millis(200))).unwrap();
        client.read_to_string(&mut response).ok();
        assert_eq!(response.trim(), "20040107");
    }
}
