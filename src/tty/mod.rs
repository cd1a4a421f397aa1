// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors

pub mod pty;
pub mod pty_loop;
pub mod raw;

pub use pty::{pty_fork, terminal_state, PtyFork, TerminalState};
pub use pty_loop::{pty_loop, SnoopMode};
pub use raw::RawModeGuard;
