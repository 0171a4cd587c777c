// Copyright 2026 the fdbridge authors. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! Request and reply bodies for every procedure, plus the call/reply
//! envelopes that precede them.
//!
//! Each record reads and writes itself in declaration order through the
//! primitives in [`crate::wire`]. The envelopes follow the classic ONC
//! layout: a call carries the transaction id, the program/version/procedure
//! triple and an (empty) credentials block; a reply echoes the transaction
//! id and a status.

use crate::constant;
use crate::error::Error;
use crate::wire;
use std::io::{Read, Write};

const MSG_CALL: u32 = 0;
const MSG_REPLY: u32 = 1;
const REPLY_ACCEPTED: u32 = 0;
const AUTH_NONE: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Procedure {
    Open,
    OpenAt,
    Close,
    Read,
    PRead,
    Write,
    PWrite,
    Stat,
    FStatAt,
    FStat,
    Fcntl,
    DataSync,
}

impl Procedure {
    pub fn number(self) -> u32 {
        match self {
            Procedure::Open => constant::PROC_OPEN,
            Procedure::OpenAt => constant::PROC_OPENAT,
            Procedure::Close => constant::PROC_CLOSE,
            Procedure::Read => constant::PROC_READ,
            Procedure::PRead => constant::PROC_PREAD,
            Procedure::Write => constant::PROC_WRITE,
            Procedure::PWrite => constant::PROC_PWRITE,
            Procedure::Stat => constant::PROC_STAT,
            Procedure::FStatAt => constant::PROC_FSTATAT,
            Procedure::FStat => constant::PROC_FSTAT,
            Procedure::Fcntl => constant::PROC_FCNTL,
            Procedure::DataSync => constant::PROC_FDATASYNC,
        }
    }

    pub fn from_number(num: u32) -> Result<Procedure, Error> {
        match num {
            constant::PROC_OPEN => Ok(Procedure::Open),
            constant::PROC_OPENAT => Ok(Procedure::OpenAt),
            constant::PROC_CLOSE => Ok(Procedure::Close),
            constant::PROC_READ => Ok(Procedure::Read),
            constant::PROC_PREAD => Ok(Procedure::PRead),
            constant::PROC_WRITE => Ok(Procedure::Write),
            constant::PROC_PWRITE => Ok(Procedure::PWrite),
            constant::PROC_STAT => Ok(Procedure::Stat),
            constant::PROC_FSTATAT => Ok(Procedure::FStatAt),
            constant::PROC_FSTAT => Ok(Procedure::FStat),
            constant::PROC_FCNTL => Ok(Procedure::Fcntl),
            constant::PROC_FDATASYNC => Ok(Procedure::DataSync),
            other => Err(Error::UnknownProcedure(other)),
        }
    }
}

/// Accept status carried by every reply envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptStatus {
    Success,
    ProgramUnavailable,
    ProgramMismatch,
    ProcedureUnavailable,
    GarbageArgs,
}

impl AcceptStatus {
    fn number(self) -> u32 {
        match self {
            AcceptStatus::Success => 0,
            AcceptStatus::ProgramUnavailable => 1,
            AcceptStatus::ProgramMismatch => 2,
            AcceptStatus::ProcedureUnavailable => 3,
            AcceptStatus::GarbageArgs => 4,
        }
    }

    fn from_number(num: u32) -> Result<AcceptStatus, Error> {
        match num {
            0 => Ok(AcceptStatus::Success),
            1 => Ok(AcceptStatus::ProgramUnavailable),
            2 => Ok(AcceptStatus::ProgramMismatch),
            3 => Ok(AcceptStatus::ProcedureUnavailable),
            4 => Ok(AcceptStatus::GarbageArgs),
            tag => Err(Error::BadTag {
                field: "accept status",
                tag,
            }),
        }
    }
}

fn write_auth<W: Write>(stream: &mut W) -> Result<(), Error> {
    wire::write_u32(stream, AUTH_NONE)?;
    wire::write_u32(stream, 0)
}

fn read_auth<R: Read>(stream: &mut R) -> Result<(), Error> {
    let _flavor = wire::read_u32(stream)?;
    // The body is opaque whatever the flavor; tolerate and discard it.
    let _body = wire::read_opaque(stream, 400)?;
    Ok(())
}

/// Envelope preceding every request body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallHeader {
    pub xid: u32,
    pub program: u32,
    pub version: u32,
    pub procedure: u32,
}

impl CallHeader {
    pub fn new(xid: u32, procedure: Procedure) -> CallHeader {
        CallHeader {
            xid,
            program: constant::PROGRAM,
            version: constant::VERSION,
            procedure: procedure.number(),
        }
    }

    pub fn write<W: Write>(&self, stream: &mut W) -> Result<(), Error> {
        wire::write_u32(stream, self.xid)?;
        wire::write_u32(stream, MSG_CALL)?;
        wire::write_u32(stream, constant::RPC_VERSION)?;
        wire::write_u32(stream, self.program)?;
        wire::write_u32(stream, self.version)?;
        wire::write_u32(stream, self.procedure)?;
        write_auth(stream)?; // credentials
        write_auth(stream) // verifier
    }

    pub fn read<R: Read>(stream: &mut R) -> Result<CallHeader, Error> {
        let xid = wire::read_u32(stream)?;

        let message_type = wire::read_u32(stream)?;
        if message_type != MSG_CALL {
            return Err(Error::BadTag {
                field: "message type",
                tag: message_type,
            });
        }

        let rpc_version = wire::read_u32(stream)?;
        if rpc_version != constant::RPC_VERSION {
            return Err(Error::BadTag {
                field: "rpc version",
                tag: rpc_version,
            });
        }

        let program = wire::read_u32(stream)?;
        let version = wire::read_u32(stream)?;
        let procedure = wire::read_u32(stream)?;
        read_auth(stream)?;
        read_auth(stream)?;

        Ok(CallHeader {
            xid,
            program,
            version,
            procedure,
        })
    }
}

/// Envelope preceding every reply body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyHeader {
    pub xid: u32,
    pub status: AcceptStatus,
}

impl ReplyHeader {
    pub fn success(xid: u32) -> ReplyHeader {
        ReplyHeader {
            xid,
            status: AcceptStatus::Success,
        }
    }

    pub fn write<W: Write>(&self, stream: &mut W) -> Result<(), Error> {
        wire::write_u32(stream, self.xid)?;
        wire::write_u32(stream, MSG_REPLY)?;
        wire::write_u32(stream, REPLY_ACCEPTED)?;
        write_auth(stream)?; // verifier
        wire::write_u32(stream, self.status.number())?;

        if let AcceptStatus::ProgramMismatch = self.status {
            // The only version this dispatcher speaks.
            wire::write_u32(stream, constant::VERSION)?;
            wire::write_u32(stream, constant::VERSION)?;
        }
        Ok(())
    }

    pub fn read<R: Read>(stream: &mut R) -> Result<ReplyHeader, Error> {
        let xid = wire::read_u32(stream)?;

        let message_type = wire::read_u32(stream)?;
        if message_type != MSG_REPLY {
            return Err(Error::BadTag {
                field: "message type",
                tag: message_type,
            });
        }

        let reply_status = wire::read_u32(stream)?;
        if reply_status != REPLY_ACCEPTED {
            return Err(Error::Rejected(reply_status));
        }

        read_auth(stream)?;
        let status = AcceptStatus::from_number(wire::read_u32(stream)?)?;

        if let AcceptStatus::ProgramMismatch = status {
            let _low = wire::read_u32(stream)?;
            let _high = wire::read_u32(stream)?;
        }

        Ok(ReplyHeader { xid, status })
    }
}

/// Flattened file metadata, carried by value in stat replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatRecord {
    pub dev: u64,
    pub ino: u64,
    pub mode: u32,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
    pub size: i64,
    pub blksize: i64,
    pub blocks: i64,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

impl StatRecord {
    /// All-zero record, the mandatory wire content of a failed stat.
    pub fn zeroed() -> StatRecord {
        StatRecord::default()
    }

    pub fn from_stat(st: &libc::stat) -> StatRecord {
        StatRecord {
            dev: st.st_dev as u64,
            ino: st.st_ino as u64,
            mode: st.st_mode as u32,
            nlink: st.st_nlink as u64,
            uid: st.st_uid as u32,
            gid: st.st_gid as u32,
            rdev: st.st_rdev as u64,
            size: st.st_size as i64,
            blksize: st.st_blksize as i64,
            blocks: st.st_blocks as i64,
            atime: st.st_atime as i64,
            mtime: st.st_mtime as i64,
            ctime: st.st_ctime as i64,
        }
    }

    pub fn write<W: Write>(&self, stream: &mut W) -> Result<(), Error> {
        wire::write_u64(stream, self.dev)?;
        wire::write_u64(stream, self.ino)?;
        wire::write_u32(stream, self.mode)?;
        wire::write_u64(stream, self.nlink)?;
        wire::write_u32(stream, self.uid)?;
        wire::write_u32(stream, self.gid)?;
        wire::write_u64(stream, self.rdev)?;
        wire::write_i64(stream, self.size)?;
        wire::write_i64(stream, self.blksize)?;
        wire::write_i64(stream, self.blocks)?;
        wire::write_i64(stream, self.atime)?;
        wire::write_i64(stream, self.mtime)?;
        wire::write_i64(stream, self.ctime)
    }

    pub fn read<R: Read>(stream: &mut R) -> Result<StatRecord, Error> {
        Ok(StatRecord {
            dev: wire::read_u64(stream)?,
            ino: wire::read_u64(stream)?,
            mode: wire::read_u32(stream)?,
            nlink: wire::read_u64(stream)?,
            uid: wire::read_u32(stream)?,
            gid: wire::read_u32(stream)?,
            rdev: wire::read_u64(stream)?,
            size: wire::read_i64(stream)?,
            blksize: wire::read_i64(stream)?,
            blocks: wire::read_i64(stream)?,
            atime: wire::read_i64(stream)?,
            mtime: wire::read_i64(stream)?,
            ctime: wire::read_i64(stream)?,
        })
    }
}

/// Advisory lock description, the third fcntl argument for lock commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LockRecord {
    pub kind: i32,
    pub whence: i32,
    pub start: i64,
    pub len: i64,
    pub pid: i32,
}

impl LockRecord {
    pub fn from_flock(fl: &libc::flock) -> LockRecord {
        LockRecord {
            kind: fl.l_type as i32,
            whence: fl.l_whence as i32,
            start: fl.l_start as i64,
            len: fl.l_len as i64,
            pid: fl.l_pid as i32,
        }
    }

    pub fn to_flock(&self) -> libc::flock {
        let mut fl: libc::flock = unsafe { std::mem::zeroed() };
        fl.l_type = self.kind as libc::c_short;
        fl.l_whence = self.whence as libc::c_short;
        fl.l_start = self.start as libc::off_t;
        fl.l_len = self.len as libc::off_t;
        fl.l_pid = self.pid as libc::pid_t;
        fl
    }

    pub fn write<W: Write>(&self, stream: &mut W) -> Result<(), Error> {
        wire::write_i32(stream, self.kind)?;
        wire::write_i32(stream, self.whence)?;
        wire::write_i64(stream, self.start)?;
        wire::write_i64(stream, self.len)?;
        wire::write_i32(stream, self.pid)
    }

    pub fn read<R: Read>(stream: &mut R) -> Result<LockRecord, Error> {
        Ok(LockRecord {
            kind: wire::read_i32(stream)?,
            whence: wire::read_i32(stream)?,
            start: wire::read_i64(stream)?,
            len: wire::read_i64(stream)?,
            pid: wire::read_i32(stream)?,
        })
    }
}

/// The fcntl argument union. The tag decides what follows on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FcntlArg {
    None,
    Int(i32),
    Lock(LockRecord),
}

impl FcntlArg {
    pub fn write<W: Write>(&self, stream: &mut W) -> Result<(), Error> {
        match self {
            FcntlArg::None => wire::write_u32(stream, 0),
            FcntlArg::Int(v) => {
                wire::write_u32(stream, 1)?;
                wire::write_i32(stream, *v)
            }
            FcntlArg::Lock(record) => {
                wire::write_u32(stream, 2)?;
                record.write(stream)
            }
        }
    }

    pub fn read<R: Read>(stream: &mut R) -> Result<FcntlArg, Error> {
        match wire::read_u32(stream)? {
            0 => Ok(FcntlArg::None),
            1 => Ok(FcntlArg::Int(wire::read_i32(stream)?)),
            2 => Ok(FcntlArg::Lock(LockRecord::read(stream)?)),
            tag => Err(Error::BadTag {
                field: "fcntl argument",
                tag,
            }),
        }
    }
}

/// Shape of the third argument a given fcntl command takes. The client
/// decodes the caller's variadic argument with this table and the server
/// validates the inbound union against the same table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    None,
    Int,
    Lock,
}

pub fn arg_kind(cmd: i32) -> ArgKind {
    match cmd {
        libc::F_DUPFD | libc::F_DUPFD_CLOEXEC | libc::F_SETFD | libc::F_SETFL
        | libc::F_SETOWN => ArgKind::Int,
        libc::F_GETLK | libc::F_SETLK | libc::F_SETLKW => ArgKind::Lock,
        _ => ArgKind::None,
    }
}

/// Commands that mint a new descriptor with a caller-supplied lower bound.
pub fn is_dup_command(cmd: i32) -> bool {
    cmd == libc::F_DUPFD || cmd == libc::F_DUPFD_CLOEXEC
}

pub struct OpenArgs {
    pub path: Vec<u8>,
    pub flags: i32,
    pub mode: u32,
}

impl OpenArgs {
    pub fn write<W: Write>(&self, stream: &mut W) -> Result<(), Error> {
        wire::write_opaque(stream, &self.path)?;
        wire::write_i32(stream, self.flags)?;
        wire::write_u32(stream, self.mode)
    }

    pub fn read<R: Read>(stream: &mut R) -> Result<OpenArgs, Error> {
        Ok(OpenArgs {
            path: wire::read_opaque(stream, constant::MAX_PATH)?,
            flags: wire::read_i32(stream)?,
            mode: wire::read_u32(stream)?,
        })
    }
}

pub struct OpenAtArgs {
    pub dir: i32,
    pub path: Vec<u8>,
    pub flags: i32,
    pub mode: u32,
}

impl OpenAtArgs {
    pub fn write<W: Write>(&self, stream: &mut W) -> Result<(), Error> {
        wire::write_i32(stream, self.dir)?;
        wire::write_opaque(stream, &self.path)?;
        wire::write_i32(stream, self.flags)?;
        wire::write_u32(stream, self.mode)
    }

    pub fn read<R: Read>(stream: &mut R) -> Result<OpenAtArgs, Error> {
        Ok(OpenAtArgs {
            dir: wire::read_i32(stream)?,
            path: wire::read_opaque(stream, constant::MAX_PATH)?,
            flags: wire::read_i32(stream)?,
            mode: wire::read_u32(stream)?,
        })
    }
}

/// Reply of the open family: the minted handle doubles as the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleReply {
    pub result: i32,
    pub handle: i32,
    pub errno: i32,
}

impl HandleReply {
    pub fn write<W: Write>(&self, stream: &mut W) -> Result<(), Error> {
        wire::write_i32(stream, self.result)?;
        wire::write_i32(stream, self.handle)?;
        wire::write_i32(stream, self.errno)
    }

    pub fn read<R: Read>(stream: &mut R) -> Result<HandleReply, Error> {
        Ok(HandleReply {
            result: wire::read_i32(stream)?,
            handle: wire::read_i32(stream)?,
            errno: wire::read_i32(stream)?,
        })
    }
}

/// Single-handle request shared by close, fstat and data-sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandleArgs {
    pub handle: i32,
}

impl HandleArgs {
    pub fn write<W: Write>(&self, stream: &mut W) -> Result<(), Error> {
        wire::write_i32(stream, self.handle)
    }

    pub fn read<R: Read>(stream: &mut R) -> Result<HandleArgs, Error> {
        Ok(HandleArgs {
            handle: wire::read_i32(stream)?,
        })
    }
}

/// Result-and-errno reply shared by close, write family and data-sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultReply {
    pub result: i32,
    pub errno: i32,
}

impl ResultReply {
    pub fn write<W: Write>(&self, stream: &mut W) -> Result<(), Error> {
        wire::write_i32(stream, self.result)?;
        wire::write_i32(stream, self.errno)
    }

    pub fn read<R: Read>(stream: &mut R) -> Result<ResultReply, Error> {
        Ok(ResultReply {
            result: wire::read_i32(stream)?,
            errno: wire::read_i32(stream)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadArgs {
    pub handle: i32,
    pub count: u32,
}

impl ReadArgs {
    pub fn write<W: Write>(&self, stream: &mut W) -> Result<(), Error> {
        wire::write_i32(stream, self.handle)?;
        wire::write_u32(stream, self.count)
    }

    pub fn read<R: Read>(stream: &mut R) -> Result<ReadArgs, Error> {
        Ok(ReadArgs {
            handle: wire::read_i32(stream)?,
            count: wire::read_u32(stream)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PReadArgs {
    pub handle: i32,
    pub count: u32,
    pub offset: i64,
}

impl PReadArgs {
    pub fn write<W: Write>(&self, stream: &mut W) -> Result<(), Error> {
        wire::write_i32(stream, self.handle)?;
        wire::write_u32(stream, self.count)?;
        wire::write_i64(stream, self.offset)
    }

    pub fn read<R: Read>(stream: &mut R) -> Result<PReadArgs, Error> {
        Ok(PReadArgs {
            handle: wire::read_i32(stream)?,
            count: wire::read_u32(stream)?,
            offset: wire::read_i64(stream)?,
        })
    }
}

/// Read replies carry the bytes actually read; `result` is the kernel's
/// count, 0 at end of file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadReply {
    pub result: i32,
    pub errno: i32,
    pub data: Vec<u8>,
}

impl ReadReply {
    pub fn write<W: Write>(&self, stream: &mut W) -> Result<(), Error> {
        wire::write_i32(stream, self.result)?;
        wire::write_i32(stream, self.errno)?;
        wire::write_opaque(stream, &self.data)
    }

    pub fn read<R: Read>(stream: &mut R) -> Result<ReadReply, Error> {
        Ok(ReadReply {
            result: wire::read_i32(stream)?,
            errno: wire::read_i32(stream)?,
            data: wire::read_opaque(stream, constant::MAX_PAYLOAD)?,
        })
    }
}

pub struct WriteArgs {
    pub handle: i32,
    pub data: Vec<u8>,
}

impl WriteArgs {
    pub fn write<W: Write>(&self, stream: &mut W) -> Result<(), Error> {
        wire::write_i32(stream, self.handle)?;
        wire::write_opaque(stream, &self.data)
    }

    pub fn read<R: Read>(stream: &mut R) -> Result<WriteArgs, Error> {
        Ok(WriteArgs {
            handle: wire::read_i32(stream)?,
            data: wire::read_opaque(stream, constant::MAX_PAYLOAD)?,
        })
    }
}

pub struct PWriteArgs {
    pub handle: i32,
    pub offset: i64,
    pub data: Vec<u8>,
}

impl PWriteArgs {
    pub fn write<W: Write>(&self, stream: &mut W) -> Result<(), Error> {
        wire::write_i32(stream, self.handle)?;
        wire::write_i64(stream, self.offset)?;
        wire::write_opaque(stream, &self.data)
    }

    pub fn read<R: Read>(stream: &mut R) -> Result<PWriteArgs, Error> {
        Ok(PWriteArgs {
            handle: wire::read_i32(stream)?,
            offset: wire::read_i64(stream)?,
            data: wire::read_opaque(stream, constant::MAX_PAYLOAD)?,
        })
    }
}

pub struct StatArgs {
    pub path: Vec<u8>,
}

impl StatArgs {
    pub fn write<W: Write>(&self, stream: &mut W) -> Result<(), Error> {
        wire::write_opaque(stream, &self.path)
    }

    pub fn read<R: Read>(stream: &mut R) -> Result<StatArgs, Error> {
        Ok(StatArgs {
            path: wire::read_opaque(stream, constant::MAX_PATH)?,
        })
    }
}

pub struct StatAtArgs {
    pub dir: i32,
    pub path: Vec<u8>,
    pub flags: i32,
}

impl StatAtArgs {
    pub fn write<W: Write>(&self, stream: &mut W) -> Result<(), Error> {
        wire::write_i32(stream, self.dir)?;
        wire::write_opaque(stream, &self.path)?;
        wire::write_i32(stream, self.flags)
    }

    pub fn read<R: Read>(stream: &mut R) -> Result<StatAtArgs, Error> {
        Ok(StatAtArgs {
            dir: wire::read_i32(stream)?,
            path: wire::read_opaque(stream, constant::MAX_PATH)?,
            flags: wire::read_i32(stream)?,
        })
    }
}

/// Stat replies always carry a full record; it is zeroed on failure so the
/// wire content stays deterministic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatReply {
    pub result: i32,
    pub errno: i32,
    pub stat: StatRecord,
}

impl StatReply {
    pub fn write<W: Write>(&self, stream: &mut W) -> Result<(), Error> {
        wire::write_i32(stream, self.result)?;
        wire::write_i32(stream, self.errno)?;
        self.stat.write(stream)
    }

    pub fn read<R: Read>(stream: &mut R) -> Result<StatReply, Error> {
        Ok(StatReply {
            result: wire::read_i32(stream)?,
            errno: wire::read_i32(stream)?,
            stat: StatRecord::read(stream)?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FcntlArgs {
    pub handle: i32,
    pub cmd: i32,
    pub arg: FcntlArg,
}

impl FcntlArgs {
    pub fn write<W: Write>(&self, stream: &mut W) -> Result<(), Error> {
        wire::write_i32(stream, self.handle)?;
        wire::write_i32(stream, self.cmd)?;
        self.arg.write(stream)
    }

    pub fn read<R: Read>(stream: &mut R) -> Result<FcntlArgs, Error> {
        Ok(FcntlArgs {
            handle: wire::read_i32(stream)?,
            cmd: wire::read_i32(stream)?,
            arg: FcntlArg::read(stream)?,
        })
    }
}

/// The fourth field is the output argument union: a lock record for lock
/// queries, empty for everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FcntlReply {
    pub result: i32,
    pub errno: i32,
    pub out: FcntlArg,
}

impl FcntlReply {
    pub fn write<W: Write>(&self, stream: &mut W) -> Result<(), Error> {
        wire::write_i32(stream, self.result)?;
        wire::write_i32(stream, self.errno)?;
        self.out.write(stream)
    }

    pub fn read<R: Read>(stream: &mut R) -> Result<FcntlReply, Error> {
        Ok(FcntlReply {
            result: wire::read_i32(stream)?,
            errno: wire::read_i32(stream)?,
            out: FcntlArg::read(stream)?,
        })
    }
}
