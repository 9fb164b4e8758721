//! Host-resident packet capture, data-driven protocol decoding, and
//! raw-socket injection toolkit.
//!
//! This crate is consumed as an ordinary Rust library: it owns no process
//! wiring, no CLI, and installs no global `tracing` subscriber. Callers
//! drive a [`sniffer::NetworkSniffer`] for the capture → parse → deliver
//! pipeline, or reach for one of the [`injector`] types directly to send
//! raw frames.

pub mod buffer;
pub mod capture;
pub mod config;
pub mod error;
pub mod injector;
pub mod parser;
pub mod pcap;
pub mod protocol;
pub mod sniffer;
pub mod types;
