// Copyright 2026 the fdbridge authors. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! The interposed entry points.
//!
//! Names and signatures match the C library exactly so the dynamic linker
//! resolves callers here. Every entry point follows the same scheme: test
//! the guards (either set means straight to the kernel), raise its own
//! guard, run the marshalled call against this thread's session, copy out
//! parameters, restore `errno`, lower the guard. When no session can be
//! built the call degrades to the identical kernel operation.

use crate::guard::{self, Hook};
use crate::state::{self, Disposition};
use crate::sys;
use fdbridge::client::CallResult;
use fdbridge::constant::MAX_PATH;
use fdbridge::proto::{arg_kind, ArgKind, FcntlArg, LockRecord, StatRecord};
use libc::{c_char, c_int, c_long, c_void, off_t, size_t, ssize_t};
use std::ffi::CStr;
use std::slice;
use std::thread;
use std::time::Duration;

/// Pause between attempts when a blocking lock wait is polled.
const LOCK_RETRY_DELAY: Duration = Duration::from_millis(10);

unsafe fn set_errno(value: i32) {
    *libc::__errno_location() = value;
}

unsafe fn finish_int(outcome: CallResult) -> c_int {
    if outcome.result < 0 {
        set_errno(outcome.errno);
    }
    outcome.result as c_int
}

unsafe fn finish_ssize(outcome: CallResult) -> ssize_t {
    if outcome.result < 0 {
        set_errno(outcome.errno);
    }
    outcome.result as ssize_t
}

unsafe fn broken_int() -> c_int {
    set_errno(libc::EIO);
    -1
}

/// The open family takes a mode only when the flags say a file may be
/// created.
fn needs_mode(flags: c_int) -> bool {
    flags & libc::O_CREAT != 0 || (flags & libc::O_TMPFILE) == libc::O_TMPFILE
}

unsafe fn fill_stat(record: &StatRecord, out: *mut libc::stat) {
    std::ptr::write_bytes(out, 0, 1);
    let st = &mut *out;
    st.st_dev = record.dev as libc::dev_t;
    st.st_ino = record.ino as libc::ino_t;
    st.st_mode = record.mode as libc::mode_t;
    st.st_nlink = record.nlink as libc::nlink_t;
    st.st_uid = record.uid as libc::uid_t;
    st.st_gid = record.gid as libc::gid_t;
    st.st_rdev = record.rdev as libc::dev_t;
    st.st_size = record.size as libc::off_t;
    st.st_blksize = record.blksize as libc::blksize_t;
    st.st_blocks = record.blocks as libc::blkcnt_t;
    st.st_atime = record.atime as libc::time_t;
    st.st_mtime = record.mtime as libc::time_t;
    st.st_ctime = record.ctime as libc::time_t;
}

#[no_mangle]
pub unsafe extern "C" fn open(path: *const c_char, flags: c_int, mode: libc::mode_t) -> c_int {
    if guard::bypass(Hook::Open) {
        return sys::open(path, flags, mode);
    }
    let _hook = guard::enter(Hook::Open);

    if path.is_null() {
        set_errno(libc::EFAULT);
        return -1;
    }
    let bytes = CStr::from_ptr(path).to_bytes();
    if bytes.len() > MAX_PATH {
        set_errno(libc::ENAMETOOLONG);
        return -1;
    }
    let wire_mode = if needs_mode(flags) { mode as u32 } else { 0 };

    match state::with_client(|client| client.open(bytes, flags as i32, wire_mode)) {
        Disposition::Done(outcome) => finish_int(outcome),
        Disposition::Unreachable => sys::open(path, flags, mode),
        Disposition::Broken => broken_int(),
    }
}

/// The large-file spelling is the regular open with the matching flag.
#[no_mangle]
pub unsafe extern "C" fn open64(path: *const c_char, flags: c_int, mode: libc::mode_t) -> c_int {
    open(path, flags | libc::O_LARGEFILE, mode)
}

#[no_mangle]
pub unsafe extern "C" fn openat(
    dir: c_int,
    path: *const c_char,
    flags: c_int,
    mode: libc::mode_t,
) -> c_int {
    if guard::bypass(Hook::OpenAt) {
        return sys::openat(dir, path, flags, mode);
    }
    let _hook = guard::enter(Hook::OpenAt);

    if path.is_null() {
        set_errno(libc::EFAULT);
        return -1;
    }
    let bytes = CStr::from_ptr(path).to_bytes();
    if bytes.len() > MAX_PATH {
        set_errno(libc::ENAMETOOLONG);
        return -1;
    }
    let wire_mode = if needs_mode(flags) { mode as u32 } else { 0 };

    match state::with_client(|client| client.openat(dir, bytes, flags as i32, wire_mode)) {
        Disposition::Done(outcome) => finish_int(outcome),
        Disposition::Unreachable => sys::openat(dir, path, flags, mode),
        Disposition::Broken => broken_int(),
    }
}

#[no_mangle]
pub unsafe extern "C" fn close(fd: c_int) -> c_int {
    if guard::bypass(Hook::Close) {
        return sys::close(fd);
    }
    let _hook = guard::enter(Hook::Close);

    match state::with_client(|client| client.close(fd)) {
        Disposition::Done(outcome) => finish_int(outcome),
        Disposition::Unreachable => sys::close(fd),
        Disposition::Broken => broken_int(),
    }
}

#[no_mangle]
pub unsafe extern "C" fn read(fd: c_int, buf: *mut c_void, count: size_t) -> ssize_t {
    if guard::bypass(Hook::Read) {
        return sys::read(fd, buf, count);
    }
    let _hook = guard::enter(Hook::Read);

    if buf.is_null() && count != 0 {
        set_errno(libc::EFAULT);
        return -1;
    }
    let buffer: &mut [u8] = if count == 0 {
        &mut []
    } else {
        slice::from_raw_parts_mut(buf as *mut u8, count)
    };

    match state::with_client(|client| client.read(fd, buffer)) {
        Disposition::Done(outcome) => finish_ssize(outcome),
        Disposition::Unreachable => sys::read(fd, buf, count),
        Disposition::Broken => {
            set_errno(libc::EIO);
            -1
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn pread(
    fd: c_int,
    buf: *mut c_void,
    count: size_t,
    offset: off_t,
) -> ssize_t {
    if guard::bypass(Hook::PRead) {
        return sys::pread(fd, buf, count, offset);
    }
    let _hook = guard::enter(Hook::PRead);

    if buf.is_null() && count != 0 {
        set_errno(libc::EFAULT);
        return -1;
    }
    let buffer: &mut [u8] = if count == 0 {
        &mut []
    } else {
        slice::from_raw_parts_mut(buf as *mut u8, count)
    };

    match state::with_client(|client| client.pread(fd, buffer, offset as i64)) {
        Disposition::Done(outcome) => finish_ssize(outcome),
        Disposition::Unreachable => sys::pread(fd, buf, count, offset),
        Disposition::Broken => {
            set_errno(libc::EIO);
            -1
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn pread64(
    fd: c_int,
    buf: *mut c_void,
    count: size_t,
    offset: off_t,
) -> ssize_t {
    pread(fd, buf, count, offset)
}

#[no_mangle]
pub unsafe extern "C" fn write(fd: c_int, buf: *const c_void, count: size_t) -> ssize_t {
    if guard::bypass(Hook::Write) {
        return sys::write(fd, buf, count);
    }
    let _hook = guard::enter(Hook::Write);

    if buf.is_null() && count != 0 {
        set_errno(libc::EFAULT);
        return -1;
    }
    let data: &[u8] = if count == 0 {
        &[]
    } else {
        slice::from_raw_parts(buf as *const u8, count)
    };

    match state::with_client(|client| client.write(fd, data)) {
        Disposition::Done(outcome) => finish_ssize(outcome),
        Disposition::Unreachable => sys::write(fd, buf, count),
        Disposition::Broken => {
            set_errno(libc::EIO);
            -1
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn pwrite(
    fd: c_int,
    buf: *const c_void,
    count: size_t,
    offset: off_t,
) -> ssize_t {
    if guard::bypass(Hook::PWrite) {
        return sys::pwrite(fd, buf, count, offset);
    }
    let _hook = guard::enter(Hook::PWrite);

    if buf.is_null() && count != 0 {
        set_errno(libc::EFAULT);
        return -1;
    }
    let data: &[u8] = if count == 0 {
        &[]
    } else {
        slice::from_raw_parts(buf as *const u8, count)
    };

    match state::with_client(|client| client.pwrite(fd, data, offset as i64)) {
        Disposition::Done(outcome) => finish_ssize(outcome),
        Disposition::Unreachable => sys::pwrite(fd, buf, count, offset),
        Disposition::Broken => {
            set_errno(libc::EIO);
            -1
        }
    }
}

#[no_mangle]
pub unsafe extern "C" fn pwrite64(
    fd: c_int,
    buf: *const c_void,
    count: size_t,
    offset: off_t,
) -> ssize_t {
    pwrite(fd, buf, count, offset)
}

#[no_mangle]
pub unsafe extern "C" fn stat(path: *const c_char, buf: *mut libc::stat) -> c_int {
    if guard::bypass(Hook::Stat) {
        return sys::stat(path, buf);
    }
    let _hook = guard::enter(Hook::Stat);

    if path.is_null() || buf.is_null() {
        set_errno(libc::EFAULT);
        return -1;
    }
    let bytes = CStr::from_ptr(path).to_bytes();
    if bytes.len() > MAX_PATH {
        set_errno(libc::ENAMETOOLONG);
        return -1;
    }

    match state::with_client(|client| client.stat(bytes)) {
        Disposition::Done((outcome, record)) => {
            if outcome.result == 0 {
                fill_stat(&record, buf);
            }
            finish_int(outcome)
        }
        Disposition::Unreachable => sys::stat(path, buf),
        Disposition::Broken => broken_int(),
    }
}

#[no_mangle]
pub unsafe extern "C" fn fstat(fd: c_int, buf: *mut libc::stat) -> c_int {
    if guard::bypass(Hook::FStat) {
        return sys::fstat(fd, buf);
    }
    let _hook = guard::enter(Hook::FStat);

    if buf.is_null() {
        set_errno(libc::EFAULT);
        return -1;
    }

    match state::with_client(|client| client.fstat(fd)) {
        Disposition::Done((outcome, record)) => {
            if outcome.result == 0 {
                fill_stat(&record, buf);
            }
            finish_int(outcome)
        }
        Disposition::Unreachable => sys::fstat(fd, buf),
        Disposition::Broken => broken_int(),
    }
}

#[no_mangle]
pub unsafe extern "C" fn fstatat(
    dir: c_int,
    path: *const c_char,
    buf: *mut libc::stat,
    flags: c_int,
) -> c_int {
    if guard::bypass(Hook::FStatAt) {
        return sys::fstatat(dir, path, buf, flags);
    }
    let _hook = guard::enter(Hook::FStatAt);

    if path.is_null() || buf.is_null() {
        set_errno(libc::EFAULT);
        return -1;
    }
    let bytes = CStr::from_ptr(path).to_bytes();
    if bytes.len() > MAX_PATH {
        set_errno(libc::ENAMETOOLONG);
        return -1;
    }

    match state::with_client(|client| client.fstatat(dir, bytes, flags as i32)) {
        Disposition::Done((outcome, record)) => {
            if outcome.result == 0 {
                fill_stat(&record, buf);
            }
            finish_int(outcome)
        }
        Disposition::Unreachable => sys::fstatat(dir, path, buf, flags),
        Disposition::Broken => broken_int(),
    }
}

#[no_mangle]
pub unsafe extern "C" fn newfstatat(
    dir: c_int,
    path: *const c_char,
    buf: *mut libc::stat,
    flags: c_int,
) -> c_int {
    fstatat(dir, path, buf, flags)
}

#[no_mangle]
pub unsafe extern "C" fn fcntl(fd: c_int, cmd: c_int, arg: c_long) -> c_int {
    if guard::bypass(Hook::Fcntl) {
        return sys::fcntl(fd, cmd, arg);
    }
    let _hook = guard::enter(Hook::Fcntl);

    // The third argument's type depends on the command; decode it with the
    // same table the server validates against.
    let union_arg = match arg_kind(cmd) {
        ArgKind::None => FcntlArg::None,
        ArgKind::Int => FcntlArg::Int(arg as i32),
        ArgKind::Lock => {
            let lock = arg as *const libc::flock;
            if lock.is_null() {
                set_errno(libc::EFAULT);
                return -1;
            }
            FcntlArg::Lock(LockRecord::from_flock(&*lock))
        }
    };

    if cmd == libc::F_SETLKW {
        // A blocking wait would hold the session for its whole duration and
        // stall every other call on this thread. Poll the non-blocking
        // variant instead; the result the caller sees is the same.
        log::warn!("blocking lock wait polled as non-blocking attempts");
        loop {
            match state::with_client(|client| client.fcntl(fd, libc::F_SETLK, union_arg)) {
                Disposition::Done((outcome, _)) => {
                    let contended = outcome.result < 0
                        && (outcome.errno == libc::EACCES || outcome.errno == libc::EAGAIN);
                    if !contended {
                        return finish_int(outcome);
                    }
                }
                Disposition::Unreachable => return sys::fcntl(fd, cmd, arg),
                Disposition::Broken => return broken_int(),
            }
            thread::sleep(LOCK_RETRY_DELAY);
        }
    }

    match state::with_client(|client| client.fcntl(fd, cmd, union_arg)) {
        Disposition::Done((outcome, out)) => {
            if let FcntlArg::Lock(record) = out {
                // Lock queries report through the caller's structure.
                let lock = arg as *mut libc::flock;
                if !lock.is_null() {
                    *lock = record.to_flock();
                }
            }
            finish_int(outcome)
        }
        Disposition::Unreachable => sys::fcntl(fd, cmd, arg),
        Disposition::Broken => broken_int(),
    }
}

#[no_mangle]
pub unsafe extern "C" fn fdatasync(fd: c_int) -> c_int {
    if guard::bypass(Hook::DataSync) {
        return sys::fdatasync(fd);
    }
    let _hook = guard::enter(Hook::DataSync);

    match state::with_client(|client| client.fdatasync(fd)) {
        Disposition::Done(outcome) => finish_int(outcome),
        Disposition::Unreachable => sys::fdatasync(fd),
        Disposition::Broken => broken_int(),
    }
}

#[cfg(test)]
mod tests {
    // With no server listening, every entry point must behave exactly like
    // the native operation, error indicators included. The tests run
    // without a preloaded environment, so calling the hooks directly is the
    // closest rehearsal available.
    use super::*;
    use std::ffi::CString;
    use std::io;

    fn last_errno() -> i32 {
        io::Error::last_os_error().raw_os_error().unwrap_or(0)
    }

    #[test]
    fn fallback_open_write_read_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = CString::new(dir.path().join("fallback.txt").to_str().unwrap()).unwrap();

        unsafe {
            let fd = open(path.as_ptr(), libc::O_CREAT | libc::O_RDWR, 0o600);
            assert!(fd >= 0);

            let payload = b"via the shim";
            let written = write(fd, payload.as_ptr() as *const c_void, payload.len());
            assert_eq!(written, payload.len() as ssize_t);

            let mut buf = [0u8; 64];
            let got = pread(fd, buf.as_mut_ptr() as *mut c_void, buf.len(), 0);
            assert_eq!(got, payload.len() as ssize_t);
            assert_eq!(&buf[..payload.len()], payload);

            assert_eq!(close(fd), 0);
        }
    }

    #[test]
    fn fallback_covers_the_remaining_entry_points() {
        let dir = tempfile::tempdir().unwrap();
        let dir_path = CString::new(dir.path().to_str().unwrap()).unwrap();
        let name = CString::new("relative.txt").unwrap();

        unsafe {
            let dirfd = open(dir_path.as_ptr(), libc::O_RDONLY | libc::O_DIRECTORY, 0);
            assert!(dirfd >= 0);

            let fd = openat(dirfd, name.as_ptr(), libc::O_CREAT | libc::O_RDWR, 0o600);
            assert!(fd >= 0);

            let payload = b"remaining";
            assert_eq!(
                pwrite(fd, payload.as_ptr() as *const c_void, payload.len(), 0),
                payload.len() as ssize_t
            );
            assert_eq!(fdatasync(fd), 0);

            let mut st: libc::stat = std::mem::zeroed();
            assert_eq!(fstat(fd, &mut st), 0);
            assert_eq!(st.st_size, payload.len() as off_t);

            st = std::mem::zeroed();
            assert_eq!(fstatat(dirfd, name.as_ptr(), &mut st, 0), 0);
            assert_eq!(st.st_size, payload.len() as off_t);

            st = std::mem::zeroed();
            assert_eq!(newfstatat(dirfd, name.as_ptr(), &mut st, 0), 0);
            assert_eq!(st.st_size, payload.len() as off_t);

            let flags = fcntl(fd, libc::F_GETFL, 0);
            assert!(flags >= 0);
            assert_eq!(flags & libc::O_ACCMODE, libc::O_RDWR);

            let mut buf = [0u8; 32];
            assert_eq!(
                read(fd, buf.as_mut_ptr() as *mut c_void, buf.len()),
                payload.len() as ssize_t
            );

            assert_eq!(close(fd), 0);
            assert_eq!(close(dirfd), 0);
        }
    }

    #[test]
    fn fallback_reports_native_errors() {
        let path = CString::new("/tmp/p3_tb_nonexistent_file_xyz123.txt").unwrap();

        unsafe {
            let mut st: libc::stat = std::mem::zeroed();
            assert_eq!(stat(path.as_ptr(), &mut st), -1);
            assert_eq!(last_errno(), libc::ENOENT);
        }
    }

    #[test]
    fn null_path_is_efault_without_touching_the_session() {
        unsafe {
            assert_eq!(open(std::ptr::null(), libc::O_RDONLY, 0), -1);
            assert_eq!(last_errno(), libc::EFAULT);
        }
    }

    #[test]
    fn oversized_path_is_refused_locally() {
        let long = vec![b'a'; MAX_PATH + 1];
        let path = CString::new(long).unwrap();

        unsafe {
            assert_eq!(open(path.as_ptr(), libc::O_RDONLY, 0), -1);
            assert_eq!(last_errno(), libc::ENAMETOOLONG);
        }
    }

    #[test]
    fn open64_is_open_with_the_large_file_flag() {
        let dir = tempfile::tempdir().unwrap();
        let path = CString::new(dir.path().join("large.txt").to_str().unwrap()).unwrap();

        unsafe {
            let fd = open64(path.as_ptr(), libc::O_CREAT | libc::O_WRONLY, 0o600);
            assert!(fd >= 0);
            assert_eq!(close(fd), 0);
        }
    }

    #[test]
    fn mode_is_ignored_unless_creation_is_requested() {
        assert!(needs_mode(libc::O_CREAT | libc::O_WRONLY));
        assert!(needs_mode(libc::O_TMPFILE | libc::O_RDWR));
        assert!(!needs_mode(libc::O_RDONLY));
        assert!(!needs_mode(libc::O_RDWR | libc::O_APPEND));
        // O_DIRECTORY alone shares bits with O_TMPFILE but is not it.
        assert!(!needs_mode(libc::O_DIRECTORY));
    }
}
