//! REPL tooling shared by the emulator and any other line-oriented front-end.
//!
//! The grammar lives in [`catalog`] and [`grammar`] and is implemented with a
//! token/parse pipeline that stays compatible with `no_std`.

pub mod catalog;
pub mod commands;
pub mod grammar;
pub mod status;
