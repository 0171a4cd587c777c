// Copyright 2026 the fdbridge authors. All rights reserved.
// This software may be modified and distributed under the terms
// of the BSD license. See the LICENSE file for details.

//! Preloadable interposition layer.
//!
//! When the dynamic linker loads this library ahead of the C library, the
//! entry points in [`hooks`] shadow their libc namesakes and forward the
//! intercepted operations to the fdbridge server. Two thread-local guards
//! keep the machinery from swallowing its own tail: a per-entry-point flag
//! breaks direct recursion and a shared flag covers the kernel I/O the
//! transport itself performs. Whenever a guard is set, or no session can be
//! built, the entry points fall through to raw `syscall(2)` invocations
//! that cannot resolve back into this library.

mod guard;
mod hooks;
mod state;
mod sys;
