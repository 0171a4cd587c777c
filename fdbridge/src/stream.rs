// Copyright 2026 the fdbridge authors. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! Stream transport over a unix or TCP socket.

use crate::constant;
use crate::error::Error;
use crate::portmap;
use crate::transport::{Endpoint, Transport};
use crate::wire;
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::os::unix::net::UnixStream;
use std::time::Duration;

/// Default timeout for connect and for each call.
pub const TIMEOUT: Duration = Duration::from_secs(10);

/// A set of options for the connection.
#[derive(Debug, Clone)]
pub struct Options {
    pub connect_timeout: Option<Duration>,
    pub read_timeout: Option<Duration>,
    pub write_timeout: Option<Duration>,
    endpoint: Endpoint,
}

impl Options {
    pub fn new(endpoint: Endpoint) -> Options {
        Options {
            connect_timeout: Some(TIMEOUT),
            read_timeout: None,
            write_timeout: None,
            endpoint,
        }
    }

    /// Options for the endpoint `RPC_TRANSPORT` selects.
    pub fn from_env() -> Options {
        Options::new(Endpoint::from_env())
    }
}

enum Channel {
    Unix(UnixStream),
    Tcp(TcpStream),
}

/// A connected session endpoint. Owned by exactly one caller; a failed call
/// leaves it broken and it must be dropped.
pub struct Stream {
    channel: Channel,
}

impl Stream {
    pub fn connect(options: &Options) -> Result<Stream, Error> {
        let channel = match &options.endpoint {
            Endpoint::Unix(path) => {
                let stream = UnixStream::connect(path)
                    .map_err(|e| Error::Connect(format!("{}: {}", path.display(), e)))?;
                stream.set_read_timeout(options.read_timeout)?;
                stream.set_write_timeout(options.write_timeout)?;
                Channel::Unix(stream)
            }
            Endpoint::Tcp(host) => {
                let port = resolve_port(host);
                let stream = connect_tcp(host, port, options.connect_timeout)?;
                stream.set_read_timeout(options.read_timeout)?;
                stream.set_write_timeout(options.write_timeout)?;
                stream.set_nodelay(true)?;
                Channel::Tcp(stream)
            }
        };

        Ok(Stream { channel })
    }
}

/// Ask the host's portmapper where the server registered; fall back to the
/// compiled-in port when the service is absent or has no mapping.
fn resolve_port(host: &str) -> u16 {
    match portmap::getport(host, constant::PROGRAM, constant::VERSION) {
        Ok(port) => port,
        Err(e) => {
            log::debug!("portmap lookup failed ({}), using port {}", e, constant::TCP_PORT);
            constant::TCP_PORT
        }
    }
}

fn connect_tcp(host: &str, port: u16, timeout: Option<Duration>) -> Result<TcpStream, Error> {
    let address = (host, port);

    match timeout {
        Some(timeout) => {
            let resolved: Vec<SocketAddr> = address
                .to_socket_addrs()
                .map_err(|e| Error::Connect(e.to_string()))?
                .collect();

            let mut last = Error::Connect(format!("no address for {}:{}", host, port));
            for addr in resolved {
                match TcpStream::connect_timeout(&addr, timeout) {
                    Ok(stream) => return Ok(stream),
                    Err(e) => last = Error::Connect(e.to_string()),
                }
            }
            Err(last)
        }
        None => TcpStream::connect(address).map_err(|e| Error::Connect(e.to_string())),
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.channel {
            Channel::Unix(s) => s.read(buf),
            Channel::Tcp(s) => s.read(buf),
        }
    }
}

impl Write for Stream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &mut self.channel {
            Channel::Unix(s) => s.write(buf),
            Channel::Tcp(s) => s.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.channel {
            Channel::Unix(s) => s.flush(),
            Channel::Tcp(s) => s.flush(),
        }
    }
}

impl Transport for Stream {
    fn roundtrip(&mut self, request: &[u8]) -> Result<Vec<u8>, Error> {
        wire::write_record(self, request)?;
        wire::read_record(self, constant::MAX_RECORD)
    }
}
