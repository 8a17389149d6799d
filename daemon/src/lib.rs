// Custos daemon library
// Exposes internal modules for the binary and the integration tests

#[macro_use]
extern crate log;

pub mod activity;
pub mod chain;
pub mod config;
pub mod custodian;
pub mod entity;
pub mod error;
pub mod fee;
pub mod multisig;
pub mod proposal;
pub mod reconciler;
pub mod rpc;
pub mod scheduler;
pub mod storage;
pub mod transfer;
pub mod users;
