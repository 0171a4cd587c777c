// Copyright 2026 the fdbridge authors. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! Per-thread connection state.
//!
//! Each thread owns one session, built lazily on its first intercepted call
//! and torn down by the thread-local destructor when the thread ends. No
//! locking anywhere: nothing here is shared between threads. A process
//! teardown hook closes whatever session the exiting thread still holds.
//!
//! The state machine is Idle -> Ready -> Broken. Construction failure
//! leaves the thread Idle, so the call at hand (and only that call) takes
//! the kernel fallback and a later call may try connecting again. A failure
//! mid-call breaks the session for good: every further call on this thread
//! answers with the generic I/O error until the thread ends.

use crate::guard;
use fdbridge::client::Client;
use fdbridge::error::Error;
use fdbridge::stream::{Options, Stream};
use std::cell::RefCell;
use std::sync::Once;

enum Link {
    Idle,
    Ready(Client<Stream>),
    Broken,
}

thread_local! {
    static LINK: RefCell<Link> = RefCell::new(Link::Idle);
}

static TEARDOWN_HOOK: Once = Once::new();

/// How an intercepted call proceeds after consulting the session.
pub enum Disposition<T> {
    /// The server answered; here is the unmarshalled outcome.
    Done(T),
    /// No session exists and none could be built: take the fallback path.
    Unreachable,
    /// The session is broken: answer -1 with the generic I/O error.
    Broken,
}

/// Run `f` against this thread's session, building it first if need be.
///
/// The shared progress flag covers both the construction and the call
/// itself, so any kernel I/O the transport performs bypasses the shim.
pub fn with_client<T, F>(f: F) -> Disposition<T>
where
    F: FnOnce(&mut Client<Stream>) -> Result<T, Error>,
{
    LINK.try_with(|cell| {
        let mut link = match cell.try_borrow_mut() {
            Ok(link) => link,
            Err(_) => return Disposition::Unreachable,
        };

        if let Link::Broken = *link {
            return Disposition::Broken;
        }

        if let Link::Idle = *link {
            let _rpc = guard::enter_rpc();
            match Client::connect(&Options::from_env()) {
                Ok(client) => {
                    *link = Link::Ready(client);
                    TEARDOWN_HOOK.call_once(|| unsafe {
                        libc::atexit(close_at_exit);
                    });
                }
                Err(_) => return Disposition::Unreachable,
            }
        }

        match &mut *link {
            Link::Ready(client) => {
                let _rpc = guard::enter_rpc();
                match f(client) {
                    Ok(value) => Disposition::Done(value),
                    Err(e) => {
                        log::debug!("session broken: {}", e);
                        // Dropping the client closes the socket; the
                        // progress flag is still set, so that close goes
                        // straight to the kernel.
                        *link = Link::Broken;
                        Disposition::Broken
                    }
                }
            }
            _ => Disposition::Broken,
        }
    })
    .unwrap_or(Disposition::Unreachable)
}

extern "C" fn close_at_exit() {
    let _rpc = guard::enter_rpc();
    let _ = LINK.try_with(|cell| {
        if let Ok(mut link) = cell.try_borrow_mut() {
            *link = Link::Idle;
        }
    });
}
