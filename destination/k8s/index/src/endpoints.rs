//! `Service` + `Endpoints` + `Pod` -> `EndpointsView` (§4.1/§8).

use crate::{cluster_info::ClusterInfo, node::NodeIndex, pod};
use ahash::AHashMap as HashMap;
use linkerd_destination_core::{Address, EndpointMetadata, PodId, ProtocolHint, WeightedAddr};
use linkerd_destination_k8s_api as k8s;
use std::net::{IpAddr, SocketAddr};

/// A resolved pod backing an endpoint, joined from the `Endpoints` subset's
/// target ref with the pod's own indexed metadata.
pub(crate) struct Backend<'p> {
    pub id: PodId,
    pub meta: &'p pod::Meta,
    pub node_name: Option<&'p str>,
    pub port_protocol: &'p pod::PortMap<linkerd_destination_core::Protocol>,
}

/// Builds the `WeightedAddr` set for one service port from its `Endpoints`
/// subsets, looking up each target pod's identity, protocol hint, and
/// locality from the already-indexed pod/node state.
///
/// A subset contributes addresses only when one of its `ports` entries names
/// the requested port number or carries the same name the `Service` gave it
/// (`port_name`); subsets backing other container ports are skipped.
pub(crate) fn view(
    port: u16,
    port_name: Option<&str>,
    subsets: &[k8s::api::core::v1::EndpointSubset],
    lookup_pod: impl Fn(&str) -> Option<Backend<'_>>,
    nodes: &mut NodeIndex,
    cluster: &ClusterInfo,
) -> HashMap<SocketAddr, WeightedAddr> {
    let mut addrs = HashMap::default();
    for subset in subsets {
        let Some(port_num) = subset.ports.iter().flatten().find_map(|p| {
            let matches = p.port as u16 == port || (port_name.is_some() && p.name.as_deref() == port_name);
            matches.then_some(p.port as u16)
        }) else {
            continue;
        };
        for addr in subset.addresses.iter().flatten() {
            let Ok(ip) = addr.ip.parse::<IpAddr>() else {
                continue;
            };
            let backend = addr
                .target_ref
                .as_ref()
                .filter(|r| r.kind.as_deref() == Some("Pod"))
                .and_then(|r| r.name.as_deref())
                .and_then(|name| lookup_pod(name));

            let (identity, protocol_hint, labels, owner, zone) = match backend {
                Some(Backend {
                    id,
                    meta,
                    node_name,
                    port_protocol,
                }) => {
                    let identity = meta.service_account.as_ref().map(|sa| {
                        cluster.service_account_identity(&id.namespace, sa)
                    });
                    let opaque = port_protocol
                        .get(&port_num)
                        .map(|p| p.is_opaque())
                        .unwrap_or(false);
                    let zone = node_name
                        .map(|n| nodes.zone(n, (id.namespace.clone(), id.name.clone())))
                        .unwrap_or(None);
                    (
                        identity,
                        ProtocolHint {
                            opaque,
                            h2_upgrade: false,
                        },
                        meta.labels.as_ref().clone(),
                        meta.owner.clone(),
                        zone,
                    )
                }
                None => (None, ProtocolHint::default(), Default::default(), None, None),
            };

            let pod_id = addr
                .target_ref
                .as_ref()
                .filter(|r| r.kind.as_deref() == Some("Pod"))
                .and_then(|r| Some(PodId {
                    namespace: r.namespace.clone()?,
                    name: r.name.clone()?,
                }));

            let socket = SocketAddr::new(ip, port_num);
            addrs.insert(
                socket,
                WeightedAddr {
                    address: Address {
                        addr: socket,
                        pod: pod_id,
                        owner,
                    },
                    weight: 1,
                    metadata: EndpointMetadata {
                        identity,
                        zone: zone.map(|z| z.to_string()),
                        control_plane_ns: Some(cluster.control_plane_ns.clone()),
                        labels,
                        protocol_hint,
                    },
                },
            );
        }
    }
    addrs
}

/// The fully qualified DNS name the profile translator keys `Profile`s by.
pub(crate) fn fqdn(ns: &str, name: &str, dns_domain: &str) -> String {
    format!("{name}.{ns}.svc.{dns_domain}")
}
