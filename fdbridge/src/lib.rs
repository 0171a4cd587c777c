// Copyright 2026 the fdbridge authors. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! This crate provides the wire protocol, the transport session and the
//! server for transparently forwarded file I/O. An unmodified process gets
//! its file operations redirected by the preloadable shim (the
//! `fdbridge-shim` crate), which marshals them through [`client::Client`]
//! to a server that executes them on its own descriptors and answers with
//! the result and the captured error indicator.
//!
//! # Examples
//! ```no_run
//! # use fdbridge::{client::Client, stream};
//! # fn main() {
//!     let mut cl = match Client::connect(&stream::Options::from_env()) {
//!         Ok(cl) => cl,
//!         Err(e) => {
//!             println!("{:?}", e.to_string());
//!             return;
//!         }
//!     };
//!
//!     let opened = match cl.open(b"/etc/hostname", libc::O_RDONLY, 0) {
//!         Ok(opened) => opened,
//!         Err(_) => return,
//!     };
//!
//!     let buffer = &mut [0u8; 255];
//!     match cl.read(opened.result as i32, buffer) {
//!         Ok(read) => println!("{} bytes", read.result),
//!         Err(e) => println!("error: {:?}", e),
//!     }
//! # }
//! ```
pub mod client;
pub mod constant;
pub mod error;
pub mod portmap;
pub mod proto;
pub mod server;
pub mod stream;
pub mod table;
pub mod transport;
pub mod wire;
