#![no_std]

#[cfg(feature = "alloc")]
extern crate alloc;

// Charger use-case arbitration shared by the firmware and host tooling.
//
// The crate stays portable across the MCU firmware and the emulator by avoiding
// the Rust standard library. Physical hardware is only reached through the
// capability traits in `hw`, so every decision path can run under test.

pub mod arbiter;
pub mod election;
pub mod hw;
pub mod repl;
pub mod sequencer;
pub mod telemetry;
pub mod usecase;
