// Copyright (c) 2021 Marco Boneberger
// Licensed under the EUPL-1.2-or-later

//! Contains the TCP connection shared by the Modbus client and the URScript driver.
extern crate nix;

use std::io::{ErrorKind, Read, Write};
use std::net::TcpStream as StdTcpStream;
use std::net::{SocketAddr, ToSocketAddrs};
use std::os::unix::io::AsRawFd;
use std::time::{Duration, Instant};

use mio::net::TcpStream;
use mio::{Events, Interest, Poll, Token};

use nix::sys::socket::setsockopt;
use nix::sys::socket::sockopt::{KeepAlive, TcpKeepCount, TcpKeepIdle, TcpKeepInterval};

use crate::exception::{create_network_exception, SentryException, SentryResult};

const CLIENT: Token = Token(1);

/// A non-blocking TCP connection with timed reads and writes.
pub(crate) struct Network {
    tcp_socket: TcpStream,
    peer: SocketAddr,
    timeout: Duration,
    poll: Poll,
    events: Events,
}

impl Network {
    /// Connects to `address:port`.
    /// # Errors
    /// * [`NetworkException`](`crate::exception::SentryException::NetworkException`) if the
    /// address cannot be resolved or the connection is refused.
    pub fn new(address: &str, port: u16, timeout: Duration) -> SentryResult<Network> {
        let address_str: String = format!("{}:{}", address, port);
        let peer = address_str
            .to_socket_addrs()
            .map_err(create_network_exception)?
            .next()
            .ok_or_else(|| {
                create_network_exception(format!("ursentry: cannot resolve {}", address_str))
            })?;
        let std_socket =
            StdTcpStream::connect_timeout(&peer, timeout).map_err(create_network_exception)?;
        std_socket
            .set_nodelay(true)
            .map_err(create_network_exception)?;
        std_socket
            .set_nonblocking(true)
            .map_err(create_network_exception)?;
        let mut tcp_socket = TcpStream::from_std(std_socket);
        let fd = tcp_socket.as_raw_fd();

        setsockopt(fd, KeepAlive, &true).map_err(create_network_exception)?;
        setsockopt(fd, TcpKeepIdle, &1).map_err(create_network_exception)?;
        setsockopt(fd, TcpKeepCount, &3).map_err(create_network_exception)?;
        setsockopt(fd, TcpKeepInterval, &1).map_err(create_network_exception)?;

        let poll = Poll::new().map_err(create_network_exception)?;
        poll.registry()
            .register(
                &mut tcp_socket,
                CLIENT,
                Interest::READABLE | Interest::WRITABLE,
            )
            .map_err(create_network_exception)?;
        Ok(Network {
            tcp_socket,
            peer,
            timeout,
            poll,
            events: Events::with_capacity(16),
        })
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Writes all bytes or fails after the timeout.
    pub fn tcp_send(&mut self, bytes: &[u8]) -> SentryResult<()> {
        let deadline = Instant::now() + self.timeout;
        let mut written = 0;
        while written < bytes.len() {
            match self.tcp_socket.write(&bytes[written..]) {
                Ok(0) => return Err(self.closed()),
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => self.wait(deadline)?,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(create_network_exception(e)),
            }
        }
        Ok(())
    }

    /// Blocks until exactly `len` bytes have been received or the timeout elapsed.
    pub fn tcp_blocking_receive(&mut self, len: usize) -> SentryResult<Vec<u8>> {
        let deadline = Instant::now() + self.timeout;
        let mut buffer = vec![0_u8; len];
        let mut received = 0;
        while received < len {
            match self.tcp_socket.read(&mut buffer[received..]) {
                Ok(0) => return Err(self.closed()),
                Ok(n) => received += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => self.wait(deadline)?,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(create_network_exception(e)),
            }
        }
        Ok(buffer)
    }

    /// Discards everything the peer has sent so far without blocking.
    /// # Return
    /// Number of discarded bytes.
    pub fn drain(&mut self) -> SentryResult<usize> {
        let mut buffer = [0_u8; 4096];
        let mut discarded = 0;
        loop {
            match self.tcp_socket.read(&mut buffer) {
                Ok(0) => return Err(self.closed()),
                Ok(n) => discarded += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(discarded),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(create_network_exception(e)),
            }
        }
    }

    fn wait(&mut self, deadline: Instant) -> SentryResult<()> {
        let now = Instant::now();
        if now >= deadline {
            return Err(create_network_exception(format!(
                "ursentry: timeout while talking to {}",
                self.peer
            )));
        }
        self.poll
            .poll(&mut self.events, Some(deadline - now))
            .map_err(create_network_exception)?;
        Ok(())
    }

    fn closed(&self) -> SentryException {
        create_network_exception(format!("ursentry: {} closed the connection", self.peer))
    }
}

#[cfg(test)]
mod tests {
    use crate::network::Network;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::time::Duration;

    #[test]
    fn send_and_receive() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = std::thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut buffer = [0_u8; 4];
            socket.read_exact(&mut buffer).unwrap();
            socket.write_all(&[buffer[3], buffer[2]]).unwrap();
            socket.write_all(&[buffer[1], buffer[0]]).unwrap();
        });
        let mut network = Network::new("127.0.0.1", port, Duration::from_secs(1)).unwrap();
        network.tcp_send(&[1, 2, 3, 4]).unwrap();
        assert_eq!(network.tcp_blocking_receive(4).unwrap(), vec![4, 3, 2, 1]);
        server.join().unwrap();
    }

    #[test]
    fn receive_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let mut network = Network::new("127.0.0.1", port, Duration::from_millis(50)).unwrap();
        let (_socket, _) = listener.accept().unwrap();
        assert!(network.tcp_blocking_receive(1).is_err());
        assert_eq!(network.drain().unwrap(), 0);
    }

    #[test]
    fn connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        assert!(Network::new("127.0.0.1", port, Duration::from_millis(100)).is_err());
    }
}
