// Copyright 2026 the fdbridge authors. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! Transport abstraction for the session layer.

use crate::constant;
use crate::error::Error;
use std::env;
use std::path::PathBuf;

/// A connected stream endpoint carrying one framed request/response exchange
/// at a time.
///
/// ## How can I implement `Transport`?
///
/// Frame the request as a single record, write it, then read exactly one
/// reply record. At most one call may be outstanding and calls complete in
/// the order issued. An implementation that fails a call is broken and must
/// be discarded by its owner.
pub trait Transport {
    /// Exchange one request record for one response record, blocking.
    fn roundtrip(&mut self, request: &[u8]) -> Result<Vec<u8>, Error>;
}

/// Where the server lives. Selected by the `RPC_TRANSPORT` environment
/// variable; the concrete addresses are compiled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Named filesystem socket.
    Unix(PathBuf),
    /// Stream socket on the given host, port resolved through the
    /// portmapper with the compiled-in port as fallback.
    Tcp(String),
}

impl Endpoint {
    /// Endpoint selection: `unix` (default) or `tcp`, case-insensitive.
    /// Unrecognized values fall back to the default.
    pub fn from_env() -> Endpoint {
        match env::var(constant::TRANSPORT_ENV) {
            Ok(value) => {
                if value.eq_ignore_ascii_case("tcp") {
                    Endpoint::Tcp(constant::TCP_HOST.to_string())
                } else {
                    Endpoint::Unix(PathBuf::from(constant::SOCKET_PATH))
                }
            }
            Err(_) => Endpoint::Unix(PathBuf::from(constant::SOCKET_PATH)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tcp_selection_is_case_insensitive() {
        // from_env reads the process environment; exercise the matching
        // logic through it with the variable set both ways.
        env::set_var(constant::TRANSPORT_ENV, "TCP");
        assert_eq!(
            Endpoint::from_env(),
            Endpoint::Tcp(constant::TCP_HOST.to_string())
        );

        env::set_var(constant::TRANSPORT_ENV, "unix");
        assert_eq!(
            Endpoint::from_env(),
            Endpoint::Unix(PathBuf::from(constant::SOCKET_PATH))
        );

        env::remove_var(constant::TRANSPORT_ENV);
        assert_eq!(
            Endpoint::from_env(),
            Endpoint::Unix(PathBuf::from(constant::SOCKET_PATH))
        );
    }
}
