use crate::PodId;
use std::{collections::BTreeMap, net::SocketAddr};

/// One reachable endpoint backing a service.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Address {
    pub addr: SocketAddr,
    pub pod: Option<PodId>,
    pub owner: Option<OwnerRef>,
}

/// The workload controller that owns a pod (e.g. a `ReplicaSet` or
/// `StatefulSet`), used to project metric labels.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct OwnerRef {
    pub kind: String,
    pub name: String,
}

/// Indicates which protocol, if any, a proxy should assume for an endpoint
/// without performing protocol detection.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ProtocolHint {
    /// The endpoint's port should be treated as opaque (no L7 detection).
    pub opaque: bool,
    /// The endpoint's pod advertises HTTP/2 and upgrading the connection is
    /// enabled cluster-wide.
    pub h2_upgrade: bool,
}

/// An `Address` plus the weight and metadata a client needs to balance and
/// authenticate traffic to it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WeightedAddr {
    pub address: Address,
    pub weight: u32,
    pub metadata: EndpointMetadata,
}

/// Per-endpoint metadata attached by the endpoint translator.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EndpointMetadata {
    /// The proxy identity string, set when the endpoint's pod is meshed.
    pub identity: Option<String>,
    /// The node topology zone the endpoint's pod is scheduled to.
    pub zone: Option<String>,
    /// The control plane's namespace, echoed back so proxies can recognize
    /// control-plane traffic.
    pub control_plane_ns: Option<String>,
    /// The pod's labels, projected as metric labels.
    pub labels: BTreeMap<String, String>,
    pub protocol_hint: ProtocolHint,
}
