//! Keeps track of `Pod`, `Service`, `Endpoints`, `ServiceProfile`, and
//! `Server` resources and publishes per-subscription `watch` channels for
//! the gRPC façade to read from (§4.1).
//!
//! `Index` exposes four public lookup surfaces: [`Index::endpoints_rx`],
//! [`Index::profile_rx`], [`Index::server_rx`], and [`Index::opaque_ports_rx`].
//! Everything else is `kubert::index::IndexNamespacedResource` impls driven
//! by the watches `destination-runtime` wires up.

use crate::{
    cluster_info::ClusterInfo, endpoints, ip::IpIndex, node::NodeIndex, opaque_ports, pod,
    profile, server::ServerConfig,
};
use ahash::{AHashMap as HashMap, AHashSet as HashSet};
use linkerd_destination_core::{PodId, Profile, ProfileId, Protocol, ServiceId};
use linkerd_destination_k8s_api::{self as k8s, ResourceExt};
use parking_lot::RwLock;
use std::{collections::BTreeSet, net::IpAddr, num::NonZeroU16, sync::Arc};
use tokio::sync::watch;
use tracing::info_span;

pub type SharedIndex = Arc<RwLock<Index>>;

#[derive(Debug)]
pub struct Index {
    cluster_info: Arc<ClusterInfo>,
    namespaces: HashMap<String, Namespace>,
    nodes: NodeIndex,

    pod_ips: IpIndex<PodId>,
    host_ips: IpIndex<PodId>,
    svc_ips: IpIndex<ServiceId>,

    endpoints: crate::lookup::Lookup<(ServiceId, u16), EndpointsWatch>,
    profiles: crate::lookup::Lookup<ProfileId, Option<Profile>>,
    servers: crate::lookup::Lookup<(PodId, u16), Protocol>,
    opaque_ports: crate::lookup::Lookup<ServiceId, BTreeSet<u16>>,
}

/// The value published per `(service, port)` subscription: `exists = false`
/// distinguishes "the service has no ready endpoints right now" from "the
/// service doesn't exist", which is an error raised at lookup time instead.
pub type EndpointsWatch = linkerd_destination_core::EndpointsView;

#[derive(Debug, Default)]
struct Namespace {
    pods: HashMap<String, Pod>,
    services: HashMap<String, Service>,
    servers: HashMap<String, ServerConfig>,
    profiles: HashMap<String, Profile>,
}

#[derive(Debug)]
struct Pod {
    meta: pod::Meta,
    ip: Option<IpAddr>,
    host_ip: Option<IpAddr>,
    node_name: Option<String>,
    port_names: HashMap<String, pod::PortSet>,
    /// Ports named by the pod's own `config.linkerd.io/opaque-ports`
    /// annotation; always opaque regardless of any selecting `Server`.
    annotated_opaque_ports: pod::PortSet,
    port_protocol: pod::PortMap<Protocol>,
}

#[derive(Debug, Default)]
struct Service {
    cluster_ip: Option<IpAddr>,
    ports: Vec<(Option<String>, u16)>,
    opaque_ports: BTreeSet<u16>,
    subsets: Vec<k8s::api::core::v1::EndpointSubset>,
}

impl Index {
    pub fn shared(cluster_info: impl Into<Arc<ClusterInfo>>) -> SharedIndex {
        Arc::new(RwLock::new(Self {
            cluster_info: cluster_info.into(),
            namespaces: HashMap::default(),
            nodes: NodeIndex::default(),
            pod_ips: IpIndex::default(),
            host_ips: IpIndex::default(),
            svc_ips: IpIndex::default(),
            endpoints: crate::lookup::Lookup::default(),
            profiles: crate::lookup::Lookup::default(),
            servers: crate::lookup::Lookup::default(),
            opaque_ports: crate::lookup::Lookup::default(),
        }))
    }

    /// Subscribes to a service port's endpoint set, lazily creating the
    /// channel (published as "does not exist yet") if the service hasn't
    /// been indexed.
    pub fn endpoints_rx(
        &self,
        service: ServiceId,
        port: NonZeroU16,
    ) -> watch::Receiver<EndpointsWatch> {
        self.endpoints.subscribe_or_default((service, port.get()), || {
            EndpointsWatch::no_endpoints(false)
        })
    }

    /// Subscribes to a `ServiceProfile`, keyed by the caller-resolved
    /// namespace and the target's fully-qualified name.
    pub fn profile_rx(&self, profile: ProfileId) -> watch::Receiver<Option<Profile>> {
        self.profiles.subscribe_or_default(profile, || None)
    }

    /// Subscribes to a pod-port's detected protocol.
    pub fn server_rx(&self, pod: PodId, port: NonZeroU16) -> watch::Receiver<Protocol> {
        self.servers
            .subscribe_or_default((pod, port.get()), || Protocol::None)
    }

    /// Subscribes to a service's opaque-ports set.
    pub fn opaque_ports_rx(&self, service: ServiceId) -> watch::Receiver<BTreeSet<u16>> {
        self.opaque_ports
            .subscribe_or_default(service, BTreeSet::new)
    }

    pub fn resolve_pod_ip(&self, ip: IpAddr) -> crate::ip::Resolved<PodId> {
        match self.pod_ips.resolve(ip) {
            crate::ip::Resolved::None => self.host_ips.resolve(ip),
            resolved => resolved,
        }
    }

    pub fn resolve_service_ip(&self, ip: IpAddr) -> crate::ip::Resolved<ServiceId> {
        self.svc_ips.resolve(ip)
    }

    /// Finds the pod backing an instance-ID-prefixed authority (e.g.
    /// `web-abc123.web.prod.svc.cluster.local`) by scanning the service's
    /// `Endpoints` subsets for a target pod with that name (§4.7/§4.8).
    pub fn resolve_instance(&self, service: &ServiceId, instance_id: &str) -> Option<PodId> {
        let ns = self.namespaces.get(&service.namespace)?;
        let svc = ns.services.get(&service.name)?;
        svc.subsets
            .iter()
            .flat_map(|subset| subset.addresses.iter().flatten())
            .find_map(|addr| {
                let target = addr.target_ref.as_ref()?;
                if target.kind.as_deref() != Some("Pod") || target.name.as_deref() != Some(instance_id)
                {
                    return None;
                }
                Some(PodId {
                    namespace: target.namespace.clone()?,
                    name: target.name.clone()?,
                })
            })
    }

    fn reindex_namespace(&mut self, ns_name: &str) {
        let Some(ns) = self.namespaces.get_mut(ns_name) else {
            return;
        };
        let _span = info_span!("reindex", ns = %ns_name).entered();

        for (pod_name, pod) in ns.pods.iter_mut() {
            reindex_pod_servers(ns_name, pod_name, pod, &ns.servers, &mut self.servers);
        }

        for (svc_name, svc) in ns.services.iter_mut() {
            let service_id = ServiceId {
                namespace: ns_name.to_string(),
                name: svc_name.clone(),
            };
            self.opaque_ports
                .publish(service_id.clone(), svc.opaque_ports.clone());

            for (port_name, port) in svc.ports.iter() {
                let view = endpoints::view(
                    *port,
                    port_name.as_deref(),
                    &svc.subsets,
                    |pod_name| {
                        let pod = ns.pods.get(pod_name)?;
                        Some(endpoints::Backend {
                            id: PodId {
                                namespace: ns_name.to_string(),
                                name: pod_name.to_string(),
                            },
                            meta: &pod.meta,
                            node_name: pod.node_name.as_deref(),
                            port_protocol: &pod.port_protocol,
                        })
                    },
                    &mut self.nodes,
                    &self.cluster_info,
                );
                let exists = true;
                self.endpoints.publish(
                    (service_id.clone(), *port),
                    EndpointsWatch {
                        exists,
                        addresses: view,
                    },
                );
            }
        }
    }

    /// Builds the `WeightedAddr` for a single already-resolved pod/port,
    /// used by the endpoint-profile translator's IP-to-pod and
    /// instance-ID `GetProfile` paths (§4.7). The protocol-hint opaque bit
    /// is left at its default; callers track it dynamically via
    /// [`Index::server_rx`] instead, since it can change after this call.
    pub fn pod_address(
        &mut self,
        pod_id: &PodId,
        port: u16,
    ) -> Option<linkerd_destination_core::WeightedAddr> {
        let ns = self.namespaces.get(&pod_id.namespace)?;
        let pod = ns.pods.get(&pod_id.name)?;
        let ip = pod.ip?;
        let identity = pod
            .meta
            .service_account
            .as_ref()
            .map(|sa| self.cluster_info.service_account_identity(&pod_id.namespace, sa));
        let zone = pod.node_name.as_deref().and_then(|n| {
            self.nodes
                .zone(n, (pod_id.namespace.clone(), pod_id.name.clone()))
        });
        Some(linkerd_destination_core::WeightedAddr {
            address: linkerd_destination_core::Address {
                addr: std::net::SocketAddr::new(ip, port),
                pod: Some(pod_id.clone()),
                owner: pod.meta.owner.clone(),
            },
            weight: 1,
            metadata: linkerd_destination_core::EndpointMetadata {
                identity,
                zone: zone.map(|z| z.to_string()),
                control_plane_ns: Some(self.cluster_info.control_plane_ns.clone()),
                labels: pod.meta.labels.as_ref().clone(),
                protocol_hint: Default::default(),
            },
        })
    }

    fn requeue_pending(&mut self, pending: Vec<(String, String)>) {
        let mut namespaces = HashSet::default();
        for (ns, _pod) in pending {
            namespaces.insert(ns);
        }
        for ns in namespaces {
            self.reindex_namespace(&ns);
        }
    }
}

fn reindex_pod_servers(
    ns_name: &str,
    pod_name: &str,
    pod: &mut Pod,
    servers: &HashMap<String, ServerConfig>,
    publish: &mut crate::lookup::Lookup<(PodId, u16), Protocol>,
) {
    let mut matched = pod::PortMap::<String>::default();
    for port in pod.annotated_opaque_ports.iter().copied() {
        matched.insert(port, "config.linkerd.io/opaque-ports".to_string());
        pod.port_protocol.insert(port, Protocol::Opaque);
    }

    for (srv_name, srv) in servers.iter() {
        if !srv.pod_selector.matches(&pod.meta.labels) {
            continue;
        }
        for port in select_ports(pod, &srv.port_ref) {
            if let Some(prior) = matched.get(&port) {
                tracing::warn!(
                    ns = %ns_name,
                    pod = %pod_name,
                    %port,
                    server = %prior,
                    conflict = %srv_name,
                    "Port already matched by another server; skipping",
                );
                continue;
            }
            matched.insert(port, srv_name.clone());
            pod.port_protocol.insert(port, srv.protocol);
        }
    }

    // Ports no longer selected by any server revert to `Protocol::None`.
    pod.port_protocol.retain(|port, _| matched.contains_key(port));

    let pod_id = PodId {
        namespace: ns_name.to_string(),
        name: pod_name.to_string(),
    };
    for (port, protocol) in pod.port_protocol.iter() {
        publish.publish((pod_id.clone(), *port), *protocol);
    }
}

fn select_ports(pod: &Pod, port_ref: &k8s::policy::Port) -> Vec<u16> {
    match port_ref {
        k8s::policy::Port::Number(p) => vec![*p],
        k8s::policy::Port::Name(name) => pod
            .port_names
            .get(name)
            .into_iter()
            .flatten()
            .copied()
            .collect(),
    }
}

impl kubert::index::IndexNamespacedResource<k8s::Pod> for Index {
    fn apply(&mut self, pod: k8s::Pod) {
        let namespace = pod.namespace().expect("pod must be namespaced");
        let name = pod.name_unchecked();
        let _span = info_span!("apply", ns = %namespace, %name).entered();

        let port_names = pod
            .spec
            .as_ref()
            .map(pod::tcp_ports_by_name)
            .unwrap_or_default();
        let ip = pod
            .status
            .as_ref()
            .and_then(|s| s.pod_ip.as_ref())
            .and_then(|ip| ip.parse().ok());
        let host_ip = pod
            .status
            .as_ref()
            .and_then(|s| s.host_ip.as_ref())
            .and_then(|ip| ip.parse().ok());
        let node_name = pod.spec.as_ref().and_then(|s| s.node_name.clone());
        let annotated_opaque_ports = pod::opaque_ports_annotation(&pod.metadata);
        let meta = pod::Meta::from_resource(&pod);

        let pod_id = PodId {
            namespace: namespace.clone(),
            name: name.clone(),
        };
        if let Some(ip) = ip {
            self.pod_ips.insert(ip, pod_id.clone());
        }
        if let Some(ip) = host_ip {
            self.host_ips.insert(ip, pod_id);
        }

        let ns = self.namespaces.entry(namespace.clone()).or_default();
        match ns.pods.entry(name) {
            std::collections::hash_map::Entry::Occupied(mut entry) => {
                let existing = entry.get_mut();
                if existing.meta == meta
                    && existing.port_names == port_names
                    && existing.annotated_opaque_ports == annotated_opaque_ports
                {
                    return;
                }
                existing.meta = meta;
                existing.ip = ip;
                existing.host_ip = host_ip;
                existing.node_name = node_name;
                existing.port_names = port_names;
                existing.annotated_opaque_ports = annotated_opaque_ports;
            }
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(Pod {
                    meta,
                    ip,
                    host_ip,
                    node_name,
                    port_names,
                    annotated_opaque_ports,
                    port_protocol: pod::PortMap::default(),
                });
            }
        }
        self.reindex_namespace(&namespace);
    }

    fn delete(&mut self, ns: String, name: String) {
        let _span = info_span!("delete", %ns, %name).entered();
        if let Some(namespace) = self.namespaces.get_mut(&ns) {
            if let Some(pod) = namespace.pods.remove(&name) {
                if let Some(ip) = pod.ip {
                    self.pod_ips.remove(
                        ip,
                        &PodId {
                            namespace: ns.clone(),
                            name: name.clone(),
                        },
                    );
                }
                if let Some(ip) = pod.host_ip {
                    self.host_ips.remove(
                        ip,
                        &PodId {
                            namespace: ns.clone(),
                            name,
                        },
                    );
                }
            }
        }
        self.reindex_namespace(&ns);
    }
}

impl kubert::index::IndexNamespacedResource<k8s::api::core::v1::Service> for Index {
    fn apply(&mut self, svc: k8s::api::core::v1::Service) {
        let namespace = svc.namespace().expect("service must be namespaced");
        let name = svc.name_unchecked();
        let _span = info_span!("apply", ns = %namespace, %name).entered();

        let cluster_ip = svc
            .spec
            .as_ref()
            .and_then(|s| s.cluster_ip.as_ref())
            .filter(|ip| ip.as_str() != "None")
            .and_then(|ip| ip.parse::<IpAddr>().ok());
        let ports = svc
            .spec
            .as_ref()
            .and_then(|s| s.ports.as_ref())
            .map(|ports| {
                ports
                    .iter()
                    .map(|p| (p.name.clone(), p.port as u16))
                    .collect()
            })
            .unwrap_or_default();
        let opaque_ports = opaque_ports::from_service(&svc);

        let service_id = ServiceId {
            namespace: namespace.clone(),
            name: name.clone(),
        };
        if let Some(ip) = cluster_ip {
            self.svc_ips.insert(ip, service_id);
        }

        let ns = self.namespaces.entry(namespace.clone()).or_default();
        let svc_entry = ns.services.entry(name).or_default();
        svc_entry.cluster_ip = cluster_ip;
        svc_entry.ports = ports;
        svc_entry.opaque_ports = opaque_ports;

        self.reindex_namespace(&namespace);
    }

    fn delete(&mut self, ns: String, name: String) {
        let _span = info_span!("delete", %ns, %name).entered();
        if let Some(namespace) = self.namespaces.get_mut(&ns) {
            if let Some(svc) = namespace.services.remove(&name) {
                if let Some(ip) = svc.cluster_ip {
                    self.svc_ips.remove(
                        ip,
                        &ServiceId {
                            namespace: ns.clone(),
                            name: name.clone(),
                        },
                    );
                }
                for (_, port) in svc.ports {
                    self.endpoints.remove(&(
                        ServiceId {
                            namespace: ns.clone(),
                            name: name.clone(),
                        },
                        port,
                    ));
                }
            }
        }
    }
}

impl kubert::index::IndexNamespacedResource<k8s::Endpoints> for Index {
    fn apply(&mut self, ep: k8s::Endpoints) {
        let namespace = ep.namespace().expect("endpoints must be namespaced");
        let name = ep.name_unchecked();
        let _span = info_span!("apply", ns = %namespace, %name).entered();

        let subsets = ep.subsets.unwrap_or_default();
        let ns = self.namespaces.entry(namespace.clone()).or_default();
        ns.services.entry(name).or_default().subsets = subsets;

        self.reindex_namespace(&namespace);
    }

    fn delete(&mut self, ns: String, name: String) {
        let _span = info_span!("delete", %ns, %name).entered();
        if let Some(namespace) = self.namespaces.get_mut(&ns) {
            if let Some(svc) = namespace.services.get_mut(&name) {
                svc.subsets.clear();
            }
        }
        self.reindex_namespace(&ns);
    }
}

impl kubert::index::IndexNamespacedResource<k8s::policy::Server> for Index {
    fn apply(&mut self, srv: k8s::policy::Server) {
        let namespace = srv.namespace().expect("server must be namespaced");
        let name = srv.name_unchecked();
        let _span = info_span!("apply", ns = %namespace, %name).entered();

        let config = ServerConfig::from_resource(srv);
        let ns = self.namespaces.entry(namespace.clone()).or_default();
        ns.servers.insert(name, config);

        self.reindex_namespace(&namespace);
    }

    fn delete(&mut self, ns: String, name: String) {
        let _span = info_span!("delete", %ns, %name).entered();
        if let Some(namespace) = self.namespaces.get_mut(&ns) {
            namespace.servers.remove(&name);
        }
        self.reindex_namespace(&ns);
    }
}

/// Accepted so the CRD schema union in the API surface stays complete, but
/// the destination service's routing never depends on it.
impl kubert::index::IndexNamespacedResource<k8s::policy::ServerAuthorization> for Index {
    fn apply(&mut self, _saz: k8s::policy::ServerAuthorization) {}
    fn delete(&mut self, _ns: String, _name: String) {}
}

impl kubert::index::IndexNamespacedResource<k8s::policy::ServiceProfile> for Index {
    fn apply(&mut self, sp: k8s::policy::ServiceProfile) {
        let namespace = sp.namespace().expect("serviceprofile must be namespaced");
        let name = sp.name_unchecked();
        let _span = info_span!("apply", ns = %namespace, %name).entered();

        let profile = profile::from_resource(name.clone(), sp.spec);
        let ns = self.namespaces.entry(namespace.clone()).or_default();
        ns.profiles.insert(name.clone(), profile.clone());
        self.profiles.publish(
            ProfileId {
                namespace,
                fqn: name,
            },
            Some(profile),
        );
    }

    fn delete(&mut self, ns: String, name: String) {
        let _span = info_span!("delete", %ns, %name).entered();
        if let Some(namespace) = self.namespaces.get_mut(&ns) {
            namespace.profiles.remove(&name);
        }
        self.profiles.publish(
            ProfileId {
                namespace: ns,
                fqn: name,
            },
            None,
        );
    }
}

impl Index {
    /// Applies a `Node` update outside the `kubert::index::namespaced`
    /// machinery, since nodes are cluster-scoped (§4.1).
    pub fn apply_node(&mut self, node: k8s::Node) {
        let pending = self.nodes.apply(&node);
        self.requeue_pending(pending);
    }

    pub fn delete_node(&mut self, name: &str) {
        self.nodes.delete(name);
    }

    pub fn reset_nodes(&mut self, nodes: Vec<k8s::Node>) {
        let pending = self.nodes.reset(nodes);
        self.requeue_pending(pending);
    }
}

impl crate::metrics::SizedIndex<k8s::Pod> for Index {
    fn size(&self, namespace: &str) -> usize {
        self.namespaces.get(namespace).map_or(0, |ns| ns.pods.len())
    }
}

impl crate::metrics::SizedIndex<k8s::api::core::v1::Service> for Index {
    fn size(&self, namespace: &str) -> usize {
        self.namespaces
            .get(namespace)
            .map_or(0, |ns| ns.services.len())
    }
}

impl crate::metrics::SizedIndex<k8s::Endpoints> for Index {
    fn size(&self, namespace: &str) -> usize {
        self.namespaces
            .get(namespace)
            .map_or(0, |ns| ns.services.len())
    }
}

impl crate::metrics::SizedIndex<k8s::policy::Server> for Index {
    fn size(&self, namespace: &str) -> usize {
        self.namespaces
            .get(namespace)
            .map_or(0, |ns| ns.servers.len())
    }
}

impl crate::metrics::SizedIndex<k8s::policy::ServerAuthorization> for Index {
    fn size(&self, _namespace: &str) -> usize {
        0
    }
}

impl crate::metrics::SizedIndex<k8s::policy::ServiceProfile> for Index {
    fn size(&self, namespace: &str) -> usize {
        self.namespaces
            .get(namespace)
            .map_or(0, |ns| ns.profiles.len())
    }
}
