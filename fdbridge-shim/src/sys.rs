// Copyright 2026 the fdbridge authors. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! Direct kernel invocation, the fallback path of every entry point.
//!
//! These wrappers go through `syscall(2)` rather than the C library's named
//! functions: under preload those names resolve to this library's own
//! exports, so calling them here would loop. The `syscall` wrapper sets
//! `errno` like any other libc call, which keeps the fallback
//! indistinguishable from the native operation.

use libc::{c_char, c_int, c_long, c_uint, c_void, off_t, size_t, ssize_t};

pub unsafe fn open(path: *const c_char, flags: c_int, mode: libc::mode_t) -> c_int {
    // SYS_open is gone on newer architectures; openat covers both.
    libc::syscall(libc::SYS_openat, libc::AT_FDCWD, path, flags, mode as c_uint) as c_int
}

pub unsafe fn openat(dir: c_int, path: *const c_char, flags: c_int, mode: libc::mode_t) -> c_int {
    libc::syscall(libc::SYS_openat, dir, path, flags, mode as c_uint) as c_int
}

pub unsafe fn close(fd: c_int) -> c_int {
    libc::syscall(libc::SYS_close, fd) as c_int
}

pub unsafe fn read(fd: c_int, buf: *mut c_void, count: size_t) -> ssize_t {
    libc::syscall(libc::SYS_read, fd, buf, count) as ssize_t
}

pub unsafe fn pread(fd: c_int, buf: *mut c_void, count: size_t, offset: off_t) -> ssize_t {
    libc::syscall(libc::SYS_pread64, fd, buf, count, offset) as ssize_t
}

pub unsafe fn write(fd: c_int, buf: *const c_void, count: size_t) -> ssize_t {
    libc::syscall(libc::SYS_write, fd, buf, count) as ssize_t
}

pub unsafe fn pwrite(fd: c_int, buf: *const c_void, count: size_t, offset: off_t) -> ssize_t {
    libc::syscall(libc::SYS_pwrite64, fd, buf, count, offset) as ssize_t
}

pub unsafe fn stat(path: *const c_char, buf: *mut libc::stat) -> c_int {
    libc::syscall(libc::SYS_newfstatat, libc::AT_FDCWD, path, buf, 0) as c_int
}

pub unsafe fn fstat(fd: c_int, buf: *mut libc::stat) -> c_int {
    libc::syscall(libc::SYS_fstat, fd, buf) as c_int
}

pub unsafe fn fstatat(dir: c_int, path: *const c_char, buf: *mut libc::stat, flags: c_int) -> c_int {
    libc::syscall(libc::SYS_newfstatat, dir, path, buf, flags) as c_int
}

pub unsafe fn fcntl(fd: c_int, cmd: c_int, arg: c_long) -> c_int {
    libc::syscall(libc::SYS_fcntl, fd, cmd, arg) as c_int
}

pub unsafe fn fdatasync(fd: c_int) -> c_int {
    libc::syscall(libc::SYS_fdatasync, fd) as c_int
}
