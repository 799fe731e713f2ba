//! A small HTTP/1.1 application server for a federated catalogue of typed
//! web resources (HTML, XML, XSD, XSLT), backed by either an in-memory or
//! relational store and able to fan reads out to a configured set of peers.

pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod http;
pub mod logging;
pub mod resource;
pub mod rpc;
pub mod servers;
pub mod store;
pub mod utils;
pub mod xslt;
