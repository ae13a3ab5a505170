//! Core driver and motion utilities for the DRV8830 card-sorter motors on no-std platforms.
//!
//! For a runnable host demo against a simulated bus, see `dmc-app/mock-mcu`.
#![no_std]

pub mod utils;
