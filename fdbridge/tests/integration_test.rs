extern crate fdbridge;

use fdbridge::client::Client;
use fdbridge::constant;
use fdbridge::proto::FcntlArg;
use fdbridge::server::Server;
use fdbridge::stream::Options;
use fdbridge::transport::Endpoint;
use std::thread;
use std::time::Duration;

const MESSAGE: &[u8] = b"Hello from intercepted syscalls! This is a test message.";

/// Bind a server on a fresh unix socket and serve it in the background.
/// The temp dir must outlive the connection.
fn start_server() -> (tempfile::TempDir, Options) {
    let dir = tempfile::tempdir().unwrap();
    let endpoint = Endpoint::Unix(dir.path().join("bridge.sock"));

    let server = Server::bind(&endpoint).unwrap();
    thread::spawn(move || {
        let _ = server.run();
    });

    let mut options = Options::new(endpoint);
    options.read_timeout = Some(Duration::from_secs(5));
    options.write_timeout = Some(Duration::from_secs(5));
    (dir, options)
}

#[test]
fn write_then_read_round_trip() {
    let (dir, options) = start_server();
    let mut cl = Client::connect(&options).unwrap();
    let path = dir.path().join("p3_tb_test.txt");
    let path = path.to_str().unwrap().as_bytes();

    let opened = cl
        .open(path, libc::O_CREAT | libc::O_WRONLY | libc::O_TRUNC, 0o644)
        .unwrap();
    assert!(opened.result >= constant::FIRST_HANDLE as i64);
    assert_eq!(opened.errno, 0);
    let handle = opened.result as i32;

    let written = cl.write(handle, MESSAGE).unwrap();
    assert_eq!(written.result, 56);
    assert_eq!(written.errno, 0);

    assert_eq!(cl.close(handle).unwrap().result, 0);

    let reopened = cl.open(path, libc::O_RDONLY, 0).unwrap();
    assert_eq!(reopened.errno, 0);

    let mut buffer = [0u8; 255];
    let read = cl.read(reopened.result as i32, &mut buffer).unwrap();
    assert_eq!(read.result, 56);
    assert_eq!(&buffer[..56], MESSAGE);
}

#[test]
fn stat_reports_the_written_size() {
    let (dir, options) = start_server();
    let mut cl = Client::connect(&options).unwrap();
    let path = dir.path().join("p3_tb_stat.txt");
    let path = path.to_str().unwrap().as_bytes();

    let opened = cl
        .open(path, libc::O_CREAT | libc::O_WRONLY | libc::O_TRUNC, 0o644)
        .unwrap();
    cl.write(opened.result as i32, MESSAGE).unwrap();
    cl.close(opened.result as i32).unwrap();

    let (outcome, stat) = cl.stat(path).unwrap();
    assert_eq!(outcome.result, 0);
    assert_eq!(outcome.errno, 0);
    assert_eq!(stat.size, 56);
    assert_eq!(stat.mode & libc::S_IFMT as u32, libc::S_IFREG as u32);
}

#[test]
fn stat_of_a_missing_path_propagates_enoent() {
    let (_dir, options) = start_server();
    let mut cl = Client::connect(&options).unwrap();

    let (outcome, stat) = cl
        .stat(b"/tmp/p3_tb_nonexistent_file_xyz123.txt")
        .unwrap();
    assert_eq!(outcome.result, -1);
    assert_eq!(outcome.errno, libc::ENOENT);
    assert_eq!(stat.size, 0);
    assert_eq!(stat.mode, 0);
}

#[test]
fn close_of_a_never_minted_handle_is_ebadf() {
    let (_dir, options) = start_server();
    let mut cl = Client::connect(&options).unwrap();

    let outcome = cl.close(999).unwrap();
    assert_eq!(outcome.result, -1);
    assert_eq!(outcome.errno, libc::EBADF);
}

#[test]
fn sequential_opens_mint_distinct_handles() {
    let (dir, options) = start_server();
    let mut cl = Client::connect(&options).unwrap();

    let path_a = dir.path().join("a.txt");
    let path_b = dir.path().join("b.txt");
    let a = cl
        .open(
            path_a.to_str().unwrap().as_bytes(),
            libc::O_CREAT | libc::O_WRONLY,
            0o644,
        )
        .unwrap();
    let b = cl
        .open(
            path_b.to_str().unwrap().as_bytes(),
            libc::O_CREAT | libc::O_WRONLY,
            0o644,
        )
        .unwrap();

    assert!(a.result >= constant::FIRST_HANDLE as i64);
    assert!(b.result >= constant::FIRST_HANDLE as i64);
    assert_ne!(a.result, b.result);
}

#[test]
fn duplicate_with_lower_bound_keeps_both_handles_alive() {
    let (dir, options) = start_server();
    let mut cl = Client::connect(&options).unwrap();
    let path = dir.path().join("dup.txt");

    let opened = cl
        .open(
            path.to_str().unwrap().as_bytes(),
            libc::O_CREAT | libc::O_RDWR,
            0o600,
        )
        .unwrap();
    let handle = opened.result as i32;

    let (dup, out) = cl.fcntl(handle, libc::F_DUPFD, FcntlArg::Int(10)).unwrap();
    assert!(dup.result >= 10);
    assert_ne!(dup.result, handle as i64);
    assert_eq!(out, FcntlArg::None);

    // Both remain usable until closed individually.
    let (original, _) = cl.fstat(handle).unwrap();
    let (duplicate, _) = cl.fstat(dup.result as i32).unwrap();
    assert_eq!(original.result, 0);
    assert_eq!(duplicate.result, 0);

    assert_eq!(cl.close(handle).unwrap().result, 0);
    let (after_close, _) = cl.fstat(dup.result as i32).unwrap();
    assert_eq!(after_close.result, 0);
    assert_eq!(cl.close(dup.result as i32).unwrap().result, 0);
}

#[test]
fn positional_writes_overlay_and_read_back() {
    let (dir, options) = start_server();
    let mut cl = Client::connect(&options).unwrap();
    let path = dir.path().join("positional.txt");

    let opened = cl
        .open(
            path.to_str().unwrap().as_bytes(),
            libc::O_CREAT | libc::O_RDWR,
            0o600,
        )
        .unwrap();
    let handle = opened.result as i32;

    assert_eq!(cl.pwrite(handle, b"0123456789", 0).unwrap().result, 10);
    assert_eq!(cl.pwrite(handle, b"ABCDE", 5).unwrap().result, 5);

    let mut buffer = [0u8; 10];
    let read = cl.pread(handle, &mut buffer, 0).unwrap();
    assert_eq!(read.result, 10);
    assert_eq!(&buffer, b"01234ABCDE");
}

#[test]
fn data_sync_succeeds_on_a_live_handle() {
    let (dir, options) = start_server();
    let mut cl = Client::connect(&options).unwrap();
    let path = dir.path().join("synced.txt");

    let opened = cl
        .open(
            path.to_str().unwrap().as_bytes(),
            libc::O_CREAT | libc::O_WRONLY,
            0o600,
        )
        .unwrap();
    let handle = opened.result as i32;

    cl.write(handle, b"durable").unwrap();
    let outcome = cl.fdatasync(handle).unwrap();
    assert_eq!(outcome.result, 0);
    assert_eq!(outcome.errno, 0);
}

#[test]
fn directory_relative_stat_through_an_open_handle() {
    let (dir, options) = start_server();
    let mut cl = Client::connect(&options).unwrap();
    std::fs::write(dir.path().join("inside.txt"), b"xyz").unwrap();

    let opened = cl
        .openat(
            libc::AT_FDCWD,
            dir.path().to_str().unwrap().as_bytes(),
            libc::O_RDONLY | libc::O_DIRECTORY,
            0,
        )
        .unwrap();
    assert_eq!(opened.errno, 0);

    let (outcome, stat) = cl
        .fstatat(opened.result as i32, b"inside.txt", 0)
        .unwrap();
    assert_eq!(outcome.result, 0);
    assert_eq!(stat.size, 3);
}

#[test]
fn payloads_above_the_cap_are_chunked_and_reassembled() {
    let (dir, options) = start_server();
    let mut cl = Client::connect(&options).unwrap();
    let path = dir.path().join("big.bin");

    let mut data = vec![0u8; constant::MAX_PAYLOAD + 4096];
    for (i, byte) in data.iter_mut().enumerate() {
        *byte = (i % 251) as u8;
    }

    let opened = cl
        .open(
            path.to_str().unwrap().as_bytes(),
            libc::O_CREAT | libc::O_RDWR,
            0o600,
        )
        .unwrap();
    let handle = opened.result as i32;

    let written = cl.write(handle, &data).unwrap();
    assert_eq!(written.result, data.len() as i64);

    let mut buffer = vec![0u8; data.len()];
    let read = cl.pread(handle, &mut buffer, 0).unwrap();
    assert_eq!(read.result, data.len() as i64);
    assert_eq!(buffer, data);
}

#[test]
fn each_connection_gets_its_own_translation_table() {
    let (dir, options) = start_server();
    let mut first = Client::connect(&options).unwrap();
    let mut second = Client::connect(&options).unwrap();
    let path = dir.path().join("shared.txt");
    let path = path.to_str().unwrap().as_bytes();

    let a = first
        .open(path, libc::O_CREAT | libc::O_WRONLY, 0o644)
        .unwrap();
    let b = second.open(path, libc::O_RDONLY, 0).unwrap();

    // Fresh tables hand out the same first handle independently.
    assert_eq!(a.result, constant::FIRST_HANDLE as i64);
    assert_eq!(b.result, constant::FIRST_HANDLE as i64);

    // A handle minted on one connection means nothing on another.
    let foreign = second.close((a.result + 1) as i32).unwrap();
    assert_eq!(foreign.result, -1);
    assert_eq!(foreign.errno, libc::EBADF);
}

#[test]
fn lock_queries_round_trip_the_record() {
    let (dir, options) = start_server();
    let mut cl = Client::connect(&options).unwrap();
    let path = dir.path().join("locked.txt");

    let opened = cl
        .open(
            path.to_str().unwrap().as_bytes(),
            libc::O_CREAT | libc::O_RDWR,
            0o600,
        )
        .unwrap();
    let handle = opened.result as i32;

    let probe = fdbridge::proto::LockRecord {
        kind: libc::F_WRLCK as i32,
        whence: libc::SEEK_SET,
        start: 0,
        len: 0,
        pid: 0,
    };
    let (outcome, out) = cl
        .fcntl(handle, libc::F_GETLK, FcntlArg::Lock(probe))
        .unwrap();
    assert_eq!(outcome.result, 0);
    match out {
        FcntlArg::Lock(record) => assert_eq!(record.kind, libc::F_UNLCK as i32),
        other => panic!("expected a lock record, got {:?}", other),
    }
}
