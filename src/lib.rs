//! Telemetry forwarding proxy with span tag obfuscation.
#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_copy_implementations)]
// #![deny(missing_debug_implementations)]

#![allow(missing_docs)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::needless_pass_by_value)]

pub mod bootstrap;
pub mod config;
pub mod forwarder;
pub mod http;
pub mod listener;
pub mod logger;
pub mod multiplexer;
pub mod obfuscation;
pub mod pipeline;
pub mod registry;
pub mod stats;
