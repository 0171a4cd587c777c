// Copyright 2026 the fdbridge authors. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

use crate::constant;
use crate::error::Error;
use crate::proto::{
    CallHeader, FcntlArg, FcntlArgs, FcntlReply, HandleArgs, HandleReply, OpenArgs, OpenAtArgs,
    PReadArgs, PWriteArgs, Procedure, ReadArgs, ReadReply, ReplyHeader, ResultReply, StatArgs,
    StatAtArgs, StatRecord, StatReply, WriteArgs,
};
use crate::stream::{Options, Stream};
use crate::transport::Transport;
use std::cmp::min;

///! Client marshals one forwarded operation at a time over a session
///
/// Every method issues exactly one request per wire round and hands back the
/// operation's numeric result together with the error indicator the server
/// captured. A transport-level failure is returned as an [`Error`]; the
/// session is broken afterwards and the owner must drop the client.
pub struct Client<T: Transport> {
    transport: T,
    xid: u32,
}

/// What the instrumented caller ultimately observes: the operation result
/// and the error indicator to restore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallResult {
    pub result: i64,
    pub errno: i32,
}

impl CallResult {
    fn failed(errno: i32) -> CallResult {
        CallResult { result: -1, errno }
    }
}

impl Client<Stream> {
    /// Connect a fresh session.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use fdbridge::{client::Client, stream};
    ///
    /// let mut cl = match Client::connect(&stream::Options::from_env()) {
    ///     Ok(cl) => cl,
    ///     Err(e) => {
    ///         println!("{:?}", e.to_string());
    ///         return;
    ///     }
    /// };
    ///
    /// match cl.open(b"/etc/hostname", libc::O_RDONLY, 0) {
    ///     Ok(opened) => println!("handle: {}", opened.result),
    ///     Err(e) => println!("error: {:?}", e),
    /// }
    /// ```
    pub fn connect(options: &Options) -> Result<Client<Stream>, Error> {
        Ok(Client::new(Stream::connect(options)?))
    }
}

impl<T: Transport> Client<T> {
    pub fn new(transport: T) -> Client<T> {
        Client { transport, xid: 0 }
    }

    /// One request/response exchange: envelope, body, matching reply.
    fn call<F>(&mut self, procedure: Procedure, encode: F) -> Result<Vec<u8>, Error>
    where
        F: FnOnce(&mut Vec<u8>) -> Result<(), Error>,
    {
        self.xid = self.xid.wrapping_add(1);
        let xid = self.xid;

        let mut request = Vec::with_capacity(128);
        CallHeader::new(xid, procedure).write(&mut request)?;
        encode(&mut request)?;

        let response = self.transport.roundtrip(&request)?;
        let mut cursor = &response[..];

        let header = ReplyHeader::read(&mut cursor)?;
        if header.xid != xid {
            return Err(Error::XidMismatch {
                want: xid,
                got: header.xid,
            });
        }
        if header.status != crate::proto::AcceptStatus::Success {
            return Err(Error::Rejected(header.status as u32));
        }

        Ok(cursor.to_vec())
    }

    pub fn open(&mut self, path: &[u8], flags: i32, mode: u32) -> Result<CallResult, Error> {
        if path.len() > constant::MAX_PATH {
            return Err(Error::PathTooLong(path.len()));
        }

        let args = OpenArgs {
            path: path.to_vec(),
            flags,
            mode,
        };
        let body = self.call(Procedure::Open, |buf| args.write(buf))?;
        let reply = HandleReply::read(&mut &body[..])?;

        Ok(CallResult {
            result: reply.result as i64,
            errno: reply.errno,
        })
    }

    pub fn openat(
        &mut self,
        dir: i32,
        path: &[u8],
        flags: i32,
        mode: u32,
    ) -> Result<CallResult, Error> {
        if path.len() > constant::MAX_PATH {
            return Err(Error::PathTooLong(path.len()));
        }

        let args = OpenAtArgs {
            dir,
            path: path.to_vec(),
            flags,
            mode,
        };
        let body = self.call(Procedure::OpenAt, |buf| args.write(buf))?;
        let reply = HandleReply::read(&mut &body[..])?;

        Ok(CallResult {
            result: reply.result as i64,
            errno: reply.errno,
        })
    }

    pub fn close(&mut self, handle: i32) -> Result<CallResult, Error> {
        let args = HandleArgs { handle };
        let body = self.call(Procedure::Close, |buf| args.write(buf))?;
        let reply = ResultReply::read(&mut &body[..])?;

        Ok(CallResult {
            result: reply.result as i64,
            errno: reply.errno,
        })
    }

    /// Fill `buffer` from the stream position, looping over capped requests
    /// until the buffer is full or the server comes up short.
    pub fn read(&mut self, handle: i32, buffer: &mut [u8]) -> Result<CallResult, Error> {
        let mut filled = 0;

        loop {
            let want = min(buffer.len() - filled, constant::MAX_PAYLOAD);
            let reply = self.read_once(handle, want as u32)?;

            if reply.result < 0 {
                if filled == 0 {
                    return Ok(CallResult::failed(reply.errno));
                }
                break;
            }

            let got = min(reply.data.len(), want);
            buffer[filled..filled + got].copy_from_slice(&reply.data[..got]);
            filled += got;

            if got < want || filled == buffer.len() {
                break;
            }
        }

        Ok(CallResult {
            result: filled as i64,
            errno: 0,
        })
    }

    fn read_once(&mut self, handle: i32, count: u32) -> Result<ReadReply, Error> {
        let args = ReadArgs { handle, count };
        let body = self.call(Procedure::Read, |buf| args.write(buf))?;
        ReadReply::read(&mut &body[..])
    }

    /// Positional read with the same reassembly loop as [`Client::read`].
    pub fn pread(
        &mut self,
        handle: i32,
        buffer: &mut [u8],
        offset: i64,
    ) -> Result<CallResult, Error> {
        let mut filled = 0;

        loop {
            let want = min(buffer.len() - filled, constant::MAX_PAYLOAD);
            let args = PReadArgs {
                handle,
                count: want as u32,
                offset: offset + filled as i64,
            };
            let body = self.call(Procedure::PRead, |buf| args.write(buf))?;
            let reply = ReadReply::read(&mut &body[..])?;

            if reply.result < 0 {
                if filled == 0 {
                    return Ok(CallResult::failed(reply.errno));
                }
                break;
            }

            let got = min(reply.data.len(), want);
            buffer[filled..filled + got].copy_from_slice(&reply.data[..got]);
            filled += got;

            if got < want || filled == buffer.len() {
                break;
            }
        }

        Ok(CallResult {
            result: filled as i64,
            errno: 0,
        })
    }

    /// Write `data`, chunking anything above the payload cap. Partial
    /// progress is surfaced the way the kernel surfaces short writes.
    pub fn write(&mut self, handle: i32, data: &[u8]) -> Result<CallResult, Error> {
        let mut written = 0;

        loop {
            let end = min(written + constant::MAX_PAYLOAD, data.len());
            let chunk = &data[written..end];
            let args = WriteArgs {
                handle,
                data: chunk.to_vec(),
            };
            let body = self.call(Procedure::Write, |buf| args.write(buf))?;
            let reply = ResultReply::read(&mut &body[..])?;

            if reply.result < 0 {
                if written == 0 {
                    return Ok(CallResult::failed(reply.errno));
                }
                break;
            }

            written += reply.result as usize;
            if (reply.result as usize) < chunk.len() || written >= data.len() {
                break;
            }
        }

        Ok(CallResult {
            result: written as i64,
            errno: 0,
        })
    }

    pub fn pwrite(&mut self, handle: i32, data: &[u8], offset: i64) -> Result<CallResult, Error> {
        let mut written = 0;

        loop {
            let end = min(written + constant::MAX_PAYLOAD, data.len());
            let chunk = &data[written..end];
            let args = PWriteArgs {
                handle,
                offset: offset + written as i64,
                data: chunk.to_vec(),
            };
            let body = self.call(Procedure::PWrite, |buf| args.write(buf))?;
            let reply = ResultReply::read(&mut &body[..])?;

            if reply.result < 0 {
                if written == 0 {
                    return Ok(CallResult::failed(reply.errno));
                }
                break;
            }

            written += reply.result as usize;
            if (reply.result as usize) < chunk.len() || written >= data.len() {
                break;
            }
        }

        Ok(CallResult {
            result: written as i64,
            errno: 0,
        })
    }

    pub fn stat(&mut self, path: &[u8]) -> Result<(CallResult, StatRecord), Error> {
        if path.len() > constant::MAX_PATH {
            return Err(Error::PathTooLong(path.len()));
        }

        let args = StatArgs {
            path: path.to_vec(),
        };
        let body = self.call(Procedure::Stat, |buf| args.write(buf))?;
        let reply = StatReply::read(&mut &body[..])?;

        Ok((
            CallResult {
                result: reply.result as i64,
                errno: reply.errno,
            },
            reply.stat,
        ))
    }

    pub fn fstatat(
        &mut self,
        dir: i32,
        path: &[u8],
        flags: i32,
    ) -> Result<(CallResult, StatRecord), Error> {
        if path.len() > constant::MAX_PATH {
            return Err(Error::PathTooLong(path.len()));
        }

        let args = StatAtArgs {
            dir,
            path: path.to_vec(),
            flags,
        };
        let body = self.call(Procedure::FStatAt, |buf| args.write(buf))?;
        let reply = StatReply::read(&mut &body[..])?;

        Ok((
            CallResult {
                result: reply.result as i64,
                errno: reply.errno,
            },
            reply.stat,
        ))
    }

    pub fn fstat(&mut self, handle: i32) -> Result<(CallResult, StatRecord), Error> {
        let args = HandleArgs { handle };
        let body = self.call(Procedure::FStat, |buf| args.write(buf))?;
        let reply = StatReply::read(&mut &body[..])?;

        Ok((
            CallResult {
                result: reply.result as i64,
                errno: reply.errno,
            },
            reply.stat,
        ))
    }

    pub fn fcntl(
        &mut self,
        handle: i32,
        cmd: i32,
        arg: FcntlArg,
    ) -> Result<(CallResult, FcntlArg), Error> {
        let args = FcntlArgs { handle, cmd, arg };
        let body = self.call(Procedure::Fcntl, |buf| args.write(buf))?;
        let reply = FcntlReply::read(&mut &body[..])?;

        Ok((
            CallResult {
                result: reply.result as i64,
                errno: reply.errno,
            },
            reply.out,
        ))
    }

    pub fn fdatasync(&mut self, handle: i32) -> Result<CallResult, Error> {
        let args = HandleArgs { handle };
        let body = self.call(Procedure::DataSync, |buf| args.write(buf))?;
        let reply = ResultReply::read(&mut &body[..])?;

        Ok(CallResult {
            result: reply.result as i64,
            errno: reply.errno,
        })
    }
}
