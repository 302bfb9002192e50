//! Linkerd Destination Service — Kubernetes indexing
//!
//! Watches `Pod`, `Service`, `Endpoints`, `Node`, `Server`, and
//! `ServiceProfile` resources and publishes per-subscription `watch`
//! channels consumed by the gRPC façade to answer `Get`/`GetProfile`
//! requests without touching the API server on the read path.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

mod cluster_info;
mod endpoints;
mod index;
mod ip;
mod lookup;
mod metrics;
mod node;
mod opaque_ports;
mod pod;
mod profile;
mod server;

pub use self::{
    cluster_info::ClusterInfo,
    index::{EndpointsWatch, Index, SharedIndex},
    ip::Resolved,
    metrics::IndexMetrics,
};
