//! Compiles cluster ingress intent (Ingress and Gateway API objects) into
//! ngrok routing resources and keeps the cluster's copies of those resources
//! in sync.
//!
//! The pipeline runs once per pass: [`store::Snapshot`] →
//! [`translate::translate`] → [`ir::Ir`] → [`synth::synthesize`] →
//! [`driver::Driver`] diff/apply.

pub mod controller;
pub mod crd;
pub mod diagnostics;
pub mod driver;
pub mod ir;
pub mod labels;
pub mod store;
pub mod synth;
pub mod translate;

#[cfg(test)]
mod testutil;

pub use controller::IngressController;
pub use driver::{Driver, DriverConfig, SyncReport, SyncScope};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to {op} {kind} {key}: {source}")]
    Apply {
        op: &'static str,
        kind: &'static str,
        key: String,
        #[source]
        source: kube::Error,
    },
    #[error("sync cancelled")]
    Cancelled,
}
