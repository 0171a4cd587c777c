// Copyright 2026 the fdbridge authors. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! The service side: a listener, a per-connection dispatcher and the
//! handlers that execute the forwarded operations on real descriptors.
//!
//! Every connection gets its own thread, translation table and payload
//! buffer, and is served strictly in request order. The server never speaks
//! unprompted; each reply answers exactly one request. Tearing a connection
//! down closes every kernel descriptor its table still holds.

use crate::constant;
use crate::error::Error;
use crate::portmap;
use crate::proto::{
    self, AcceptStatus, CallHeader, FcntlArg, FcntlArgs, FcntlReply, HandleArgs, HandleReply,
    LockRecord, OpenArgs, OpenAtArgs, PReadArgs, PWriteArgs, Procedure, ReadArgs, ReadReply,
    ReplyHeader, ResultReply, StatArgs, StatAtArgs, StatRecord, StatReply, WriteArgs,
};
use crate::table::HandleTable;
use crate::transport::Endpoint;
use crate::wire;
use std::ffi::CString;
use std::fs;
use std::io::{self, Read, Write};
use std::net::TcpListener;
use std::os::unix::io::RawFd;
use std::os::unix::net::UnixListener;
use std::thread;

fn last_errno() -> i32 {
    io::Error::last_os_error().raw_os_error().unwrap_or(libc::EIO)
}

enum Listener {
    Unix(UnixListener),
    Tcp(TcpListener),
}

pub struct Server {
    listener: Listener,
}

impl Server {
    /// Bind the listening endpoint. A stale unix socket from a previous run
    /// is unlinked first.
    pub fn bind(endpoint: &Endpoint) -> Result<Server, Error> {
        let listener = match endpoint {
            Endpoint::Unix(path) => {
                let _ = fs::remove_file(path);
                let listener = UnixListener::bind(path)
                    .map_err(|e| Error::Connect(format!("{}: {}", path.display(), e)))?;
                log::info!("listening on {}", path.display());
                Listener::Unix(listener)
            }
            Endpoint::Tcp(host) => {
                let listener = TcpListener::bind((host.as_str(), constant::TCP_PORT))
                    .map_err(|e| Error::Connect(format!("{}:{}: {}", host, constant::TCP_PORT, e)))?;
                log::info!("listening on {}:{}", host, constant::TCP_PORT);
                Listener::Tcp(listener)
            }
        };

        Ok(Server { listener })
    }

    /// Offer the TCP endpoint to the host's portmapper. Absence of the
    /// service is not fatal; clients fall back to the compiled-in port.
    pub fn register(&self) {
        if let Listener::Tcp(_) = self.listener {
            match portmap::set(
                constant::TCP_HOST,
                constant::PROGRAM,
                constant::VERSION,
                constant::TCP_PORT,
            ) {
                Ok(true) => log::info!("registered with the portmapper"),
                Ok(false) => log::warn!("portmapper refused the registration"),
                Err(e) => log::warn!("portmapper unavailable: {}", e),
            }
        }
    }

    /// Accept connections forever, one service thread each.
    pub fn run(&self) -> Result<(), Error> {
        loop {
            match &self.listener {
                Listener::Unix(listener) => {
                    let (stream, _) = listener.accept()?;
                    spawn_connection(stream);
                }
                Listener::Tcp(listener) => {
                    let (stream, peer) = listener.accept()?;
                    log::info!("connection from {}", peer);
                    stream.set_nodelay(true)?;
                    spawn_connection(stream);
                }
            }
        }
    }
}

fn spawn_connection<S>(stream: S)
where
    S: Read + Write + Send + 'static,
{
    thread::spawn(move || Connection::new(stream).serve());
}

/// One served client: its stream, its translation table and a reusable
/// payload buffer.
pub struct Connection<S> {
    stream: S,
    table: HandleTable,
    scratch: Vec<u8>,
}

impl<S> Drop for Connection<S> {
    fn drop(&mut self) {
        for fd in self.table.drain() {
            unsafe {
                libc::close(fd);
            }
        }
    }
}

impl<S: Read + Write> Connection<S> {
    pub fn new(stream: S) -> Connection<S> {
        Connection {
            stream,
            table: HandleTable::new(),
            scratch: vec![0u8; constant::MAX_PAYLOAD],
        }
    }

    /// Serve requests until the client goes away or the stream breaks.
    pub fn serve(mut self) {
        loop {
            let record = match wire::read_record(&mut self.stream, constant::MAX_RECORD) {
                Ok(record) => record,
                Err(Error::IOError(io::ErrorKind::UnexpectedEof)) => {
                    log::info!("client closed the connection");
                    break;
                }
                Err(e) => {
                    log::warn!("tearing down connection: {}", e);
                    break;
                }
            };

            let reply = match self.dispatch(&record) {
                Ok(reply) => reply,
                Err(e) => {
                    log::warn!("undecodable request, tearing down connection: {}", e);
                    break;
                }
            };

            if let Err(e) = wire::write_record(&mut self.stream, &reply) {
                log::warn!("failed to write reply: {}", e);
                break;
            }
        }
    }

    fn dispatch(&mut self, record: &[u8]) -> Result<Vec<u8>, Error> {
        let mut cursor = record;
        let call = CallHeader::read(&mut cursor)?;

        if call.program != constant::PROGRAM {
            log::warn!("call for foreign program {:#x}", call.program);
            return reject(call.xid, AcceptStatus::ProgramUnavailable);
        }
        if call.version != constant::VERSION {
            return reject(call.xid, AcceptStatus::ProgramMismatch);
        }

        let procedure = match Procedure::from_number(call.procedure) {
            Ok(procedure) => procedure,
            Err(_) => return reject(call.xid, AcceptStatus::ProcedureUnavailable),
        };

        log::debug!("xid {} procedure {:?}", call.xid, procedure);

        let mut reply = Vec::with_capacity(96);
        ReplyHeader::success(call.xid).write(&mut reply)?;

        let decoded = match procedure {
            Procedure::Open => match OpenArgs::read(&mut cursor) {
                Ok(args) => {
                    self.handle_open(args).write(&mut reply)?;
                    true
                }
                Err(_) => false,
            },
            Procedure::OpenAt => match OpenAtArgs::read(&mut cursor) {
                Ok(args) => {
                    self.handle_openat(args).write(&mut reply)?;
                    true
                }
                Err(_) => false,
            },
            Procedure::Close => match HandleArgs::read(&mut cursor) {
                Ok(args) => {
                    self.handle_close(args).write(&mut reply)?;
                    true
                }
                Err(_) => false,
            },
            Procedure::Read => match ReadArgs::read(&mut cursor) {
                Ok(args) => {
                    self.handle_read(args).write(&mut reply)?;
                    true
                }
                Err(_) => false,
            },
            Procedure::PRead => match PReadArgs::read(&mut cursor) {
                Ok(args) => {
                    self.handle_pread(args).write(&mut reply)?;
                    true
                }
                Err(_) => false,
            },
            Procedure::Write => match WriteArgs::read(&mut cursor) {
                Ok(args) => {
                    self.handle_write(args).write(&mut reply)?;
                    true
                }
                Err(_) => false,
            },
            Procedure::PWrite => match PWriteArgs::read(&mut cursor) {
                Ok(args) => {
                    self.handle_pwrite(args).write(&mut reply)?;
                    true
                }
                Err(_) => false,
            },
            Procedure::Stat => match StatArgs::read(&mut cursor) {
                Ok(args) => {
                    self.handle_stat(args).write(&mut reply)?;
                    true
                }
                Err(_) => false,
            },
            Procedure::FStatAt => match StatAtArgs::read(&mut cursor) {
                Ok(args) => {
                    self.handle_fstatat(args).write(&mut reply)?;
                    true
                }
                Err(_) => false,
            },
            Procedure::FStat => match HandleArgs::read(&mut cursor) {
                Ok(args) => {
                    self.handle_fstat(args).write(&mut reply)?;
                    true
                }
                Err(_) => false,
            },
            Procedure::Fcntl => match FcntlArgs::read(&mut cursor) {
                Ok(args) => {
                    self.handle_fcntl(args).write(&mut reply)?;
                    true
                }
                Err(_) => false,
            },
            Procedure::DataSync => match HandleArgs::read(&mut cursor) {
                Ok(args) => {
                    self.handle_fdatasync(args).write(&mut reply)?;
                    true
                }
                Err(_) => false,
            },
        };

        if !decoded {
            return reject(call.xid, AcceptStatus::GarbageArgs);
        }
        Ok(reply)
    }

    fn handle_open(&mut self, args: OpenArgs) -> HandleReply {
        let path = match CString::new(args.path) {
            Ok(path) => path,
            Err(_) => return open_failure(libc::EINVAL),
        };

        let fd = unsafe { libc::open(path.as_ptr(), args.flags, args.mode as libc::c_uint) };
        self.install_new(fd)
    }

    fn handle_openat(&mut self, args: OpenAtArgs) -> HandleReply {
        let dir = match self.directory(args.dir) {
            Ok(dir) => dir,
            Err(e) => return open_failure(e.errno()),
        };
        let path = match CString::new(args.path) {
            Ok(path) => path,
            Err(_) => return open_failure(libc::EINVAL),
        };

        let fd = unsafe { libc::openat(dir, path.as_ptr(), args.flags, args.mode as libc::c_uint) };
        self.install_new(fd)
    }

    /// The current-directory sentinel passes through untranslated so
    /// relative paths keep their host meaning.
    fn directory(&self, dir: i32) -> Result<RawFd, Error> {
        if dir == libc::AT_FDCWD {
            Ok(libc::AT_FDCWD)
        } else {
            self.table.translate(dir)
        }
    }

    fn install_new(&mut self, fd: RawFd) -> HandleReply {
        if fd < 0 {
            return open_failure(last_errno());
        }

        match self.table.install(fd) {
            Ok(handle) => HandleReply {
                result: handle,
                handle,
                errno: 0,
            },
            Err(e) => {
                // The kernel descriptor must not outlive a failed install.
                unsafe {
                    libc::close(fd);
                }
                open_failure(e.errno())
            }
        }
    }

    fn handle_close(&mut self, args: HandleArgs) -> ResultReply {
        let fd = match self.table.translate(args.handle) {
            Ok(fd) => fd,
            Err(e) => return ResultReply {
                result: -1,
                errno: e.errno(),
            },
        };

        let rc = unsafe { libc::close(fd) };
        if rc == 0 {
            self.table.release(args.handle);
            ResultReply {
                result: 0,
                errno: 0,
            }
        } else {
            // The slot stays installed: the kernel may still consider the
            // descriptor open and the client can retry.
            ResultReply {
                result: -1,
                errno: last_errno(),
            }
        }
    }

    fn handle_read(&mut self, args: ReadArgs) -> ReadReply {
        let fd = match self.table.translate(args.handle) {
            Ok(fd) => fd,
            Err(e) => return read_failure(e.errno()),
        };

        let count = (args.count as usize).min(constant::MAX_PAYLOAD);
        let n = unsafe {
            libc::read(fd, self.scratch.as_mut_ptr() as *mut libc::c_void, count)
        };
        if n < 0 {
            return read_failure(last_errno());
        }

        ReadReply {
            result: n as i32,
            errno: 0,
            data: self.scratch[..n as usize].to_vec(),
        }
    }

    fn handle_pread(&mut self, args: PReadArgs) -> ReadReply {
        let fd = match self.table.translate(args.handle) {
            Ok(fd) => fd,
            Err(e) => return read_failure(e.errno()),
        };

        let count = (args.count as usize).min(constant::MAX_PAYLOAD);
        let n = unsafe {
            libc::pread(
                fd,
                self.scratch.as_mut_ptr() as *mut libc::c_void,
                count,
                args.offset as libc::off_t,
            )
        };
        if n < 0 {
            return read_failure(last_errno());
        }

        ReadReply {
            result: n as i32,
            errno: 0,
            data: self.scratch[..n as usize].to_vec(),
        }
    }

    fn handle_write(&mut self, args: WriteArgs) -> ResultReply {
        let fd = match self.table.translate(args.handle) {
            Ok(fd) => fd,
            Err(e) => return ResultReply {
                result: -1,
                errno: e.errno(),
            },
        };

        let n = unsafe {
            libc::write(
                fd,
                args.data.as_ptr() as *const libc::c_void,
                args.data.len(),
            )
        };
        if n < 0 {
            ResultReply {
                result: -1,
                errno: last_errno(),
            }
        } else {
            // Partial writes surface as-is.
            ResultReply {
                result: n as i32,
                errno: 0,
            }
        }
    }

    fn handle_pwrite(&mut self, args: PWriteArgs) -> ResultReply {
        let fd = match self.table.translate(args.handle) {
            Ok(fd) => fd,
            Err(e) => return ResultReply {
                result: -1,
                errno: e.errno(),
            },
        };

        let n = unsafe {
            libc::pwrite(
                fd,
                args.data.as_ptr() as *const libc::c_void,
                args.data.len(),
                args.offset as libc::off_t,
            )
        };
        if n < 0 {
            ResultReply {
                result: -1,
                errno: last_errno(),
            }
        } else {
            ResultReply {
                result: n as i32,
                errno: 0,
            }
        }
    }

    fn handle_stat(&mut self, args: StatArgs) -> StatReply {
        let path = match CString::new(args.path) {
            Ok(path) => path,
            Err(_) => return stat_failure(libc::EINVAL),
        };

        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::stat(path.as_ptr(), &mut st) };
        stat_result(rc, &st)
    }

    fn handle_fstatat(&mut self, args: StatAtArgs) -> StatReply {
        let dir = match self.directory(args.dir) {
            Ok(dir) => dir,
            Err(e) => return stat_failure(e.errno()),
        };
        let path = match CString::new(args.path) {
            Ok(path) => path,
            Err(_) => return stat_failure(libc::EINVAL),
        };

        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        // Variant flags pass through verbatim; the kernel validates them.
        let rc = unsafe { libc::fstatat(dir, path.as_ptr(), &mut st, args.flags) };
        stat_result(rc, &st)
    }

    fn handle_fstat(&mut self, args: HandleArgs) -> StatReply {
        let fd = match self.table.translate(args.handle) {
            Ok(fd) => fd,
            Err(e) => return stat_failure(e.errno()),
        };

        let mut st: libc::stat = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::fstat(fd, &mut st) };
        stat_result(rc, &st)
    }

    fn handle_fcntl(&mut self, args: FcntlArgs) -> FcntlReply {
        let fd = match self.table.translate(args.handle) {
            Ok(fd) => fd,
            Err(e) => return fcntl_failure(e.errno()),
        };

        if proto::is_dup_command(args.cmd) {
            let min = match args.arg {
                FcntlArg::Int(min) => min,
                _ => return fcntl_failure(libc::EINVAL),
            };

            // The lower bound applies to the handle space, not the kernel's
            // descriptor numbers.
            let dup = unsafe { libc::fcntl(fd, args.cmd, 0) };
            if dup < 0 {
                return fcntl_failure(last_errno());
            }

            return match self.table.install_from(dup, min) {
                Ok(handle) => FcntlReply {
                    result: handle,
                    errno: 0,
                    out: FcntlArg::None,
                },
                Err(e) => {
                    unsafe {
                        libc::close(dup);
                    }
                    fcntl_failure(e.errno())
                }
            };
        }

        match proto::arg_kind(args.cmd) {
            proto::ArgKind::Lock => {
                let record = match args.arg {
                    FcntlArg::Lock(record) => record,
                    _ => return fcntl_failure(libc::EINVAL),
                };

                if args.cmd == libc::F_SETLKW {
                    log::warn!(
                        "blocking lock wait on handle {}; the session stalls until it is granted",
                        args.handle
                    );
                }

                let mut fl = record.to_flock();
                let rc = unsafe { libc::fcntl(fd, args.cmd, &mut fl) };
                if rc < 0 {
                    return fcntl_failure(last_errno());
                }

                let out = if args.cmd == libc::F_GETLK {
                    FcntlArg::Lock(LockRecord::from_flock(&fl))
                } else {
                    FcntlArg::None
                };
                FcntlReply {
                    result: rc,
                    errno: 0,
                    out,
                }
            }
            proto::ArgKind::Int => {
                let value = match args.arg {
                    FcntlArg::Int(value) => value,
                    _ => return fcntl_failure(libc::EINVAL),
                };

                let rc = unsafe { libc::fcntl(fd, args.cmd, value) };
                if rc < 0 {
                    fcntl_failure(last_errno())
                } else {
                    FcntlReply {
                        result: rc,
                        errno: 0,
                        out: FcntlArg::None,
                    }
                }
            }
            proto::ArgKind::None => {
                let rc = unsafe { libc::fcntl(fd, args.cmd) };
                if rc < 0 {
                    fcntl_failure(last_errno())
                } else {
                    FcntlReply {
                        result: rc,
                        errno: 0,
                        out: FcntlArg::None,
                    }
                }
            }
        }
    }

    fn handle_fdatasync(&mut self, args: HandleArgs) -> ResultReply {
        let fd = match self.table.translate(args.handle) {
            Ok(fd) => fd,
            Err(e) => return ResultReply {
                result: -1,
                errno: e.errno(),
            },
        };

        let rc = unsafe { libc::fdatasync(fd) };
        if rc == 0 {
            ResultReply {
                result: 0,
                errno: 0,
            }
        } else {
            ResultReply {
                result: -1,
                errno: last_errno(),
            }
        }
    }
}

fn reject(xid: u32, status: AcceptStatus) -> Result<Vec<u8>, Error> {
    let mut reply = Vec::with_capacity(32);
    ReplyHeader { xid, status }.write(&mut reply)?;
    Ok(reply)
}

fn open_failure(errno: i32) -> HandleReply {
    HandleReply {
        result: -1,
        handle: -1,
        errno,
    }
}

fn read_failure(errno: i32) -> ReadReply {
    ReadReply {
        result: -1,
        errno,
        data: Vec::new(),
    }
}

fn stat_failure(errno: i32) -> StatReply {
    StatReply {
        result: -1,
        errno,
        stat: StatRecord::zeroed(),
    }
}

fn stat_result(rc: i32, st: &libc::stat) -> StatReply {
    if rc == 0 {
        StatReply {
            result: 0,
            errno: 0,
            stat: StatRecord::from_stat(st),
        }
    } else {
        stat_failure(last_errno())
    }
}

fn fcntl_failure(errno: i32) -> FcntlReply {
    FcntlReply {
        result: -1,
        errno,
        out: FcntlArg::None,
    }
}
