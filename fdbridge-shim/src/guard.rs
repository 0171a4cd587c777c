// Copyright 2026 the fdbridge authors. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! Thread-local re-entry guards.
//!
//! Every entry point tests both guards first and goes straight to the
//! kernel when either is set. The per-hook flag stops an operation from
//! re-entering itself; the shared flag stops the transport's own file I/O
//! (connect, socket reads and writes) from re-entering any other hook.
//! Skipping that second guard does not degrade gracefully: the first
//! intercepted call that lazily builds a session recurses until the stack
//! runs out.

use std::cell::Cell;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hook {
    Open,
    OpenAt,
    Close,
    Read,
    PRead,
    Write,
    PWrite,
    Stat,
    FStat,
    FStatAt,
    Fcntl,
    DataSync,
}

impl Hook {
    fn bit(self) -> u32 {
        1 << self as u32
    }
}

thread_local! {
    static ACTIVE: Cell<u32> = Cell::new(0);
    static IN_RPC: Cell<bool> = Cell::new(false);
}

/// True when this call must bypass the shim. During thread teardown the
/// thread-locals may already be gone; that also means bypass.
pub fn bypass(hook: Hook) -> bool {
    let reentered = ACTIVE
        .try_with(|active| active.get() & hook.bit() != 0)
        .unwrap_or(true);
    let in_rpc = IN_RPC.try_with(|flag| flag.get()).unwrap_or(true);

    reentered || in_rpc
}

/// Marks `hook` active until dropped.
pub struct HookGuard {
    bit: u32,
}

pub fn enter(hook: Hook) -> HookGuard {
    let bit = hook.bit();
    let _ = ACTIVE.try_with(|active| active.set(active.get() | bit));
    HookGuard { bit }
}

impl Drop for HookGuard {
    fn drop(&mut self) {
        let _ = ACTIVE.try_with(|active| active.set(active.get() & !self.bit));
    }
}

/// Marks the transport machinery active until dropped. Nesting restores the
/// previous state.
pub struct RpcGuard {
    prev: bool,
}

pub fn enter_rpc() -> RpcGuard {
    let prev = IN_RPC
        .try_with(|flag| {
            let prev = flag.get();
            flag.set(true);
            prev
        })
        .unwrap_or(false);
    RpcGuard { prev }
}

impl Drop for RpcGuard {
    fn drop(&mut self) {
        let _ = IN_RPC.try_with(|flag| flag.set(self.prev));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hooks_start_clear() {
        assert!(!bypass(Hook::Open));
        assert!(!bypass(Hook::Write));
    }

    #[test]
    fn an_active_hook_bypasses_only_itself() {
        let outer = enter(Hook::Write);
        assert!(bypass(Hook::Write));
        assert!(!bypass(Hook::Open));

        drop(outer);
        assert!(!bypass(Hook::Write));
    }

    #[test]
    fn rpc_guard_bypasses_every_hook() {
        let rpc = enter_rpc();
        assert!(bypass(Hook::Open));
        assert!(bypass(Hook::Read));
        assert!(bypass(Hook::DataSync));

        drop(rpc);
        assert!(!bypass(Hook::Open));
    }

    #[test]
    fn nested_rpc_guards_restore_the_outer_state() {
        let outer = enter_rpc();
        {
            let inner = enter_rpc();
            assert!(bypass(Hook::Close));
            drop(inner);
        }
        assert!(bypass(Hook::Close));

        drop(outer);
        assert!(!bypass(Hook::Close));
    }

    #[test]
    fn a_reentrant_call_under_both_guards_terminates() {
        // Simulates a wrapper whose work triggers the same wrapper again:
        // the inner invocation must see the guard and stop recursing.
        fn fake_entry(depth: usize) -> usize {
            if bypass(Hook::Write) {
                return depth;
            }
            let _hook = enter(Hook::Write);
            fake_entry(depth + 1)
        }

        assert_eq!(fake_entry(0), 1);
        // The guard cleared on the way out.
        assert!(!bypass(Hook::Write));
    }
}
