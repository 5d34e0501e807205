//! EcoCampus realtime sync sidecar.
//!
//! Coalesces bursts of backend change notifications into single debounced
//! UI refresh calls.  The core is [`reconciler`]; the seams it depends on —
//! a change-notification source, refresh actions, and a read-only session
//! accessor — live in [`source`], [`actions`], and [`session`].  The binary
//! wires those seams to a file spool, refresh-marker files, and the session
//! file written by the UI shell.

pub mod actions;
pub mod config;
pub mod entity;
pub mod paths;
pub mod reconciler;
pub mod session;
pub mod source;
pub mod spool;
pub mod status;
