// Protocol identity. The program number sits in the range RFC 5531 leaves
// to locally administered services.
pub const PROGRAM: u32 = 0x2000_F51A;
pub const VERSION: u32 = 1;
pub const RPC_VERSION: u32 = 2;

// Procedure numbers, stable within VERSION.
pub const PROC_OPEN: u32 = 1;
pub const PROC_OPENAT: u32 = 2;
pub const PROC_CLOSE: u32 = 3;
pub const PROC_READ: u32 = 4;
pub const PROC_PREAD: u32 = 5;
pub const PROC_WRITE: u32 = 6;
pub const PROC_PWRITE: u32 = 7;
pub const PROC_STAT: u32 = 8;
pub const PROC_FSTATAT: u32 = 9;
pub const PROC_FSTAT: u32 = 10;
pub const PROC_FCNTL: u32 = 11;
pub const PROC_FDATASYNC: u32 = 12;

// Upper bounds on variable-length fields.
pub const MAX_PATH: usize = 4096;
pub const MAX_PAYLOAD: usize = 1 << 20;
// A record carries at most one payload plus envelope and fixed fields.
pub const MAX_RECORD: usize = MAX_PAYLOAD + 512;

// Endpoint selection. RPC_TRANSPORT is read case-insensitively, everything
// else is compiled in.
pub const TRANSPORT_ENV: &str = "RPC_TRANSPORT";
pub const SOCKET_PATH: &str = "/tmp/p3_tb";
pub const TCP_HOST: &str = "127.0.0.1";
pub const TCP_PORT: u16 = 10565;

// Translation table geometry. Handles 0-2 are reserved for the standard
// streams and are never minted.
pub const TABLE_CAPACITY: usize = 256;
pub const FIRST_HANDLE: i32 = 3;

// Portmapper service, RFC 1833.
pub const PMAP_PORT: u16 = 111;
pub const PMAP_PROGRAM: u32 = 100_000;
pub const PMAP_VERSION: u32 = 2;
pub const PMAP_PROC_SET: u32 = 1;
pub const PMAP_PROC_UNSET: u32 = 2;
pub const PMAP_PROC_GETPORT: u32 = 3;
pub const IPPROTO_TCP: u32 = 6;
