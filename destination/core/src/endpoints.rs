use crate::{ServiceId, WeightedAddr};
use ahash::AHashMap as HashMap;
use anyhow::Result;
use futures::prelude::*;
use std::{net::SocketAddr, num::NonZeroU16, pin::Pin};

/// Identifies an endpoint-watch subscription: a service's port, optionally
/// pinned to a single named endpoint (the "instance ID" of an authority like
/// `instance-0.web.prod.svc.cluster.local`).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EndpointsTarget {
    pub service: ServiceId,
    pub port: NonZeroU16,
    pub instance_id: Option<String>,
}

/// Models endpoint discovery: watching a service's port for the set of
/// addresses that currently back it.
#[async_trait::async_trait]
pub trait DiscoverEndpoints<T> {
    async fn watch_endpoints(&self, target: T) -> Result<Option<EndpointsStream>>;
}

pub type EndpointsStream = Pin<Box<dyn Stream<Item = EndpointsView> + Send + Sync + 'static>>;

/// A snapshot of a service's endpoints for one (service, port, instance)
/// subscription. `exists = false` means the service exists but currently
/// has no ready endpoints; this is distinct from the service being unknown,
/// which is an error at lookup time rather than a view.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EndpointsView {
    pub exists: bool,
    pub addresses: HashMap<SocketAddr, WeightedAddr>,
}

impl EndpointsView {
    pub fn no_endpoints(exists: bool) -> Self {
        Self {
            exists,
            addresses: HashMap::default(),
        }
    }
}
