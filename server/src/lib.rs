//! OmeroFS monitor server - Remote control of file system monitors.
//!
//! This crate provides the server component of OmeroFS, responsible for:
//! - Creating, starting, stopping and destroying monitors on request
//! - Delivering each monitor's notifications to the client that created it
//! - Answering directory listings and file metadata queries under watched roots
//!
//! # Architecture
//!
//! The [`monitor_server::MonitorServer`] owns a [`registry::MonitorRegistry`]
//! of monitors built by the `omerofs-monitor` engine. Each monitor reports to
//! a [`remote::RemoteWatcher`]; over HTTP that is a callback URL the
//! notifications are POSTed to. [`routes`] exposes the control API.

pub mod config;
pub mod error;
pub mod monitor_server;
pub mod registry;
pub mod remote;
pub mod routes;
pub mod types;
