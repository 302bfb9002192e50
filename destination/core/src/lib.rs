#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

//! Wire-independent data model for the destination service, shared by the
//! Kubernetes indexers (`linkerd-destination-k8s-index`) and the gRPC
//! façade (`linkerd-destination-grpc`).

mod address;
mod endpoints;
mod ids;
mod profile;
mod protocol;

pub use self::{
    address::{Address, EndpointMetadata, OwnerRef, ProtocolHint, WeightedAddr},
    endpoints::{DiscoverEndpoints, EndpointsStream, EndpointsTarget, EndpointsView},
    ids::{PodId, ProfileId, ServiceId},
    profile::{
        DiscoverProfile, HttpMethod, PathMatch, Profile, ProfileStream, RequestMatch,
        ResponseClass, ResponseMatch, RetryBudget, RouteSpec, StatusRange, WeightedDst,
    },
    protocol::Protocol,
};
