// Copyright 2026 the fdbridge authors. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! Minimal portmapper client (RFC 1833, version 2) over TCP.
//!
//! The server registers its TCP endpoint here when a portmapper is running
//! and the client resolves the port through it. Every failure is soft: the
//! callers fall back to the compiled-in port.

use crate::constant;
use crate::error::Error;
use crate::proto::{AcceptStatus, ReplyHeader};
use crate::wire;
use std::io::Read;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(1);

struct Mapping {
    program: u32,
    version: u32,
    protocol: u32,
    port: u32,
}

impl Mapping {
    fn tcp(program: u32, version: u32, port: u16) -> Mapping {
        Mapping {
            program,
            version,
            protocol: constant::IPPROTO_TCP,
            port: port as u32,
        }
    }
}

/// Ask where `program`/`version` is registered. A missing registration is
/// reported as a connect error so callers treat it like an absent service.
pub fn getport(host: &str, program: u32, version: u32) -> Result<u16, Error> {
    let body = call(
        host,
        constant::PMAP_PROC_GETPORT,
        &Mapping::tcp(program, version, 0),
    )?;

    let port = wire::read_u32(&mut &body[..])?;
    if port == 0 || port > u16::max_value() as u32 {
        return Err(Error::Connect(format!(
            "program {} version {} not registered",
            program, version
        )));
    }
    Ok(port as u16)
}

/// Register `program`/`version` at `port`. Returns whether the portmapper
/// accepted the mapping.
pub fn set(host: &str, program: u32, version: u32, port: u16) -> Result<bool, Error> {
    let body = call(
        host,
        constant::PMAP_PROC_SET,
        &Mapping::tcp(program, version, port),
    )?;
    Ok(wire::read_u32(&mut &body[..])? != 0)
}

/// Drop the registration for `program`/`version`.
pub fn unset(host: &str, program: u32, version: u32) -> Result<bool, Error> {
    let body = call(
        host,
        constant::PMAP_PROC_UNSET,
        &Mapping::tcp(program, version, 0),
    )?;
    Ok(wire::read_u32(&mut &body[..])? != 0)
}

fn call(host: &str, procedure: u32, mapping: &Mapping) -> Result<Vec<u8>, Error> {
    let mut stream = connect(host)?;

    let mut request = Vec::with_capacity(64);
    // Same envelope as the main protocol, addressed to the portmapper.
    let xid = mapping.program ^ procedure;
    wire::write_u32(&mut request, xid)?;
    wire::write_u32(&mut request, 0)?; // CALL
    wire::write_u32(&mut request, constant::RPC_VERSION)?;
    wire::write_u32(&mut request, constant::PMAP_PROGRAM)?;
    wire::write_u32(&mut request, constant::PMAP_VERSION)?;
    wire::write_u32(&mut request, procedure)?;
    wire::write_u32(&mut request, 0)?; // credentials, none
    wire::write_u32(&mut request, 0)?;
    wire::write_u32(&mut request, 0)?; // verifier, none
    wire::write_u32(&mut request, 0)?;

    wire::write_u32(&mut request, mapping.program)?;
    wire::write_u32(&mut request, mapping.version)?;
    wire::write_u32(&mut request, mapping.protocol)?;
    wire::write_u32(&mut request, mapping.port)?;

    wire::write_record(&mut stream, &request)?;
    let response = wire::read_record(&mut stream, 512)?;

    let mut cursor = &response[..];
    let header = ReplyHeader::read(&mut cursor)?;
    if header.xid != xid {
        return Err(Error::XidMismatch {
            want: xid,
            got: header.xid,
        });
    }
    if header.status != AcceptStatus::Success {
        return Err(Error::Rejected(header.status as u32));
    }

    let mut body = Vec::new();
    cursor.read_to_end(&mut body)?;
    Ok(body)
}

fn connect(host: &str) -> Result<TcpStream, Error> {
    let resolved: Vec<SocketAddr> = (host, constant::PMAP_PORT)
        .to_socket_addrs()
        .map_err(|e| Error::Connect(e.to_string()))?
        .collect();

    let mut last = Error::Connect(format!("no address for {}", host));
    for addr in resolved {
        match TcpStream::connect_timeout(&addr, TIMEOUT) {
            Ok(stream) => {
                stream.set_read_timeout(Some(TIMEOUT))?;
                stream.set_write_timeout(Some(TIMEOUT))?;
                return Ok(stream);
            }
            Err(e) => last = Error::Connect(e.to_string()),
        }
    }
    Err(last)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proto::CallHeader;
    use std::io::Write;
    use std::net::TcpListener;
    use std::thread;

    // A one-shot portmapper that answers GETPORT with a fixed port.
    fn fake_portmapper(listener: TcpListener, port: u32) -> thread::JoinHandle<CallHeader> {
        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let request = wire::read_record(&mut stream, 512).unwrap();

            let mut cursor = &request[..];
            let header = CallHeader::read(&mut cursor).unwrap();

            let mut reply = Vec::new();
            ReplyHeader::success(header.xid).write(&mut reply).unwrap();
            wire::write_u32(&mut reply, port).unwrap();
            wire::write_record(&mut stream, &reply).unwrap();
            stream.flush().unwrap();
            header
        })
    }

    // The helpers talk to the fixed portmapper port, so drive `call`
    // internals through the fake listener instead.
    #[test]
    fn getport_body_decodes_mapping_reply() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let served = fake_portmapper(listener, 2049);

        let mut stream = TcpStream::connect(addr).unwrap();
        let mapping = Mapping::tcp(constant::PROGRAM, constant::VERSION, 0);

        let mut request = Vec::new();
        let xid = mapping.program ^ constant::PMAP_PROC_GETPORT;
        wire::write_u32(&mut request, xid).unwrap();
        wire::write_u32(&mut request, 0).unwrap();
        wire::write_u32(&mut request, constant::RPC_VERSION).unwrap();
        wire::write_u32(&mut request, constant::PMAP_PROGRAM).unwrap();
        wire::write_u32(&mut request, constant::PMAP_VERSION).unwrap();
        wire::write_u32(&mut request, constant::PMAP_PROC_GETPORT).unwrap();
        for _ in 0..4 {
            wire::write_u32(&mut request, 0).unwrap();
        }
        wire::write_u32(&mut request, mapping.program).unwrap();
        wire::write_u32(&mut request, mapping.version).unwrap();
        wire::write_u32(&mut request, mapping.protocol).unwrap();
        wire::write_u32(&mut request, mapping.port).unwrap();

        wire::write_record(&mut stream, &request).unwrap();
        let response = wire::read_record(&mut stream, 512).unwrap();

        let mut cursor = &response[..];
        let header = ReplyHeader::read(&mut cursor).unwrap();
        assert_eq!(header.xid, xid);
        assert_eq!(wire::read_u32(&mut cursor).unwrap(), 2049);

        let seen = served.join().unwrap();
        assert_eq!(seen.program, constant::PMAP_PROGRAM);
        assert_eq!(seen.procedure, constant::PMAP_PROC_GETPORT);
    }
}
