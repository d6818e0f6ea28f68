//! Distributed File Digest Library
//!
//! A master/worker cluster that computes a content digest for every regular
//! file under a home directory. The master owns the file registry and hands
//! out work over HTTP; any number of workers pull files, stream them through
//! a hash and report the result back.
//!
//! ## Architecture Modules
//! - **`config`**: runtime knobs shared by both roles (addresses, chunk size,
//!   timeout window, backoff).
//! - **`home`**: the registry of discovered files and their digests.
//! - **`master`**: work dispatch, timeout tracking and the axum HTTP surface.
//! - **`worker`**: the pull state machine, the reqwest client and the slot pool.

pub mod config;
pub mod home;
pub mod master;
pub mod worker;
