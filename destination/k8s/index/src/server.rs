use linkerd_destination_core::Protocol;
use linkerd_destination_k8s_api::{self as k8s, policy::Port};

/// The parts of a `Server` resource that determine which pod/ports it
/// selects and what protocol it declares for them.
#[derive(Debug, PartialEq)]
pub(crate) struct ServerConfig {
    pub pod_selector: k8s::labels::Selector,
    pub port_ref: Port,
    pub protocol: Protocol,
}

impl ServerConfig {
    pub(crate) fn from_resource(srv: k8s::policy::Server) -> Self {
        Self {
            pod_selector: srv.spec.pod_selector,
            port_ref: srv.spec.port,
            protocol: proxy_protocol(srv.spec.proxy_protocol),
        }
    }
}

fn proxy_protocol(p: Option<k8s::policy::ProxyProtocol>) -> Protocol {
    match p {
        Some(k8s::policy::ProxyProtocol::Opaque) => Protocol::Opaque,
        None
        | Some(
            k8s::policy::ProxyProtocol::Unknown
            | k8s::policy::ProxyProtocol::Http1
            | k8s::policy::ProxyProtocol::Http2
            | k8s::policy::ProxyProtocol::Grpc
            | k8s::policy::ProxyProtocol::Tls,
        ) => Protocol::Discovered,
    }
}
