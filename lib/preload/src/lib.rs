//! `LD_PRELOAD` entry points for `fault-fs`.
//!
//! ```sh
//! FAULT_FS_MISSING=/etc/app/config.toml:.cache \
//! FAULT_FS_LOG=fault_fs=debug \
//! LD_PRELOAD=target/release/libfault_fs_preload.so ./program-under-test
//! ```
//!
//! Every exported function has the exact name and C signature of the libc
//! function it shadows and hands the decision to [`fault_fs::intercept`].

#![deny(unused_imports, unused_unsafe, unreachable_patterns)]

#[cfg(all(target_os = "linux", target_env = "gnu"))]
mod hooks;
