// Copyright 2026 the fdbridge authors. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! Server entry point. The endpoint comes from `RPC_TRANSPORT`; everything
//! else is compiled in. Logging goes through `env_logger`, so `RUST_LOG`
//! controls verbosity.

use fdbridge::server::Server;
use fdbridge::transport::Endpoint;
use std::process;

fn main() {
    env_logger::init();

    let endpoint = Endpoint::from_env();
    let server = match Server::bind(&endpoint) {
        Ok(server) => server,
        Err(e) => {
            log::error!("cannot bind {:?}: {}", endpoint, e);
            process::exit(1);
        }
    };

    server.register();

    if let Err(e) = server.run() {
        log::error!("accept loop failed: {}", e);
        process::exit(1);
    }
}
