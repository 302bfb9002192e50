//! The `Destination` tonic service (§4.7): answers `Get`/`GetProfile`
//! requests by composing the translators and adaptors in this crate over
//! `destination-k8s-index`'s watch channels.
//!
//! Grounded on `grpc/src/outbound.rs`'s `OutboundPolicyServer` — same
//! `cluster_domain`/`drain::Watch` shape and `async_stream` + `tokio::select!`
//! response-stream pattern — adapted to the classic `Get`/`GetProfile` wire
//! API instead of the outbound-policy one.

use crate::{adaptor, authority, context_token, endpoint, endpoint_profile, profile};
use futures::Stream;
use linkerd_destination_core::{EndpointsStream, ProfileStream, ServiceId};
use linkerd_destination_k8s_index::{Resolved, SharedIndex};
use linkerd2_proxy_api::destination::{
    destination_server::Destination, DestinationProfile, GetDestination, Update,
};
use std::{num::NonZeroU16, pin::Pin, sync::Arc};
use tokio_stream::{wrappers::WatchStream, StreamExt};
use tonic::{Request, Response, Status};

#[derive(Clone)]
pub struct Server {
    index: SharedIndex,
    cluster_domain: Arc<str>,
    enable_h2_upgrade: bool,
    drain: drain::Watch,
}

impl Server {
    pub fn new(
        index: SharedIndex,
        cluster_domain: impl Into<Arc<str>>,
        enable_h2_upgrade: bool,
        drain: drain::Watch,
    ) -> Self {
        Self {
            index,
            cluster_domain: cluster_domain.into(),
            enable_h2_upgrade,
            drain,
        }
    }

    pub fn svc(self) -> linkerd2_proxy_api::destination::destination_server::DestinationServer<Self> {
        linkerd2_proxy_api::destination::destination_server::DestinationServer::new(self)
    }

    fn fqdn(service: &ServiceId, cluster_domain: &str) -> String {
        format!("{}.{}.svc.{}", service.name, service.namespace, cluster_domain)
    }

    /// Builds the composite profile stream for a plain service name
    /// target: primary (caller-namespace) + secondary (service-namespace)
    /// `ServiceProfile` subscriptions, folded through the fallback listener
    /// and the opaque-ports adaptor.
    fn service_profile_stream(
        &self,
        service: ServiceId,
        port: NonZeroU16,
        caller_namespace: Option<String>,
    ) -> impl Stream<Item = Result<DestinationProfile, Status>> {
        let fqn = Self::fqdn(&service, &self.cluster_domain);

        let secondary: ProfileStream = {
            let rx = self.index.read().profile_rx(linkerd_destination_core::ProfileId {
                namespace: service.namespace.clone(),
                fqn: fqn.clone(),
            });
            Box::pin(WatchStream::new(rx))
        };
        let primary: ProfileStream = match caller_namespace.filter(|ns| *ns != service.namespace) {
            Some(ns) => {
                let rx = self
                    .index
                    .read()
                    .profile_rx(linkerd_destination_core::ProfileId { namespace: ns, fqn: fqn.clone() });
                Box::pin(WatchStream::new(rx))
            }
            None => Box::pin(futures::stream::pending()),
        };

        let merged_profile = adaptor::fallback::merge(primary, secondary);
        let service_ports = WatchStream::new(self.index.read().opaque_ports_rx(service));
        let port = port.get();

        adaptor::opaque_ports::merge(merged_profile, service_ports, port)
            .map(move |(p, opaque)| Ok(profile::translate(p, &fqn, opaque)))
    }

    /// Builds the endpoint-profile stream for a single already-resolved
    /// pod/port (the IP-to-pod and instance-ID cases), which carries a
    /// `WeightedAddr` in `DestinationProfile.endpoint` but no routes.
    fn pod_profile_stream(
        &self,
        pod: linkerd_destination_core::PodId,
        port: NonZeroU16,
    ) -> Result<impl Stream<Item = Result<DestinationProfile, Status>>, Status> {
        let addr = self
            .index
            .write()
            .pod_address(&pod, port.get())
            .ok_or_else(|| Status::not_found(format!("pod {pod} has no known address")))?;
        let protocol_rx = self.index.read().server_rx(pod, port);
        let endpoint_stream = endpoint_profile::translate(self.enable_h2_upgrade, addr, protocol_rx);
        // `to_proto_weighted_addr` omits `protocol_hint` entirely exactly
        // when the endpoint is opaque (see `endpoint.rs`), so its absence
        // is the signal here too.
        Ok(endpoint_stream.map(|endpoint| {
            Ok(DestinationProfile {
                fully_qualified_name: String::new(),
                opaque_protocol: endpoint.protocol_hint.is_none(),
                retry_budget: None,
                routes: Vec::new(),
                dst_overrides: Vec::new(),
                endpoint: Some(endpoint),
            })
        }))
    }
}

fn with_drain<T: Send + 'static>(
    drain: drain::Watch,
    inner: impl Stream<Item = Result<T, Status>> + Send + 'static,
) -> Pin<Box<dyn Stream<Item = Result<T, Status>> + Send>> {
    Box::pin(async_stream::stream! {
        tokio::pin!(inner);
        let shutdown = drain.signaled();
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                item = inner.next() => match item {
                    Some(item) => yield item,
                    None => return,
                },
                _ = &mut shutdown => return,
            }
        }
    })
}

#[async_trait::async_trait]
impl Destination for Server {
    type GetStream = Pin<Box<dyn Stream<Item = Result<Update, Status>> + Send>>;

    #[tracing::instrument(skip(self, req))]
    async fn get(&self, req: Request<GetDestination>) -> Result<Response<Self::GetStream>, Status> {
        let GetDestination { scheme, path, .. } = req.into_inner();
        if scheme != "k8s" {
            return Err(Status::invalid_argument(format!(
                "unsupported scheme: {scheme}"
            )));
        }

        let (service, port) = match authority::parse(&path, &self.cluster_domain)? {
            authority::Authority::Ip { .. } => {
                return Err(Status::invalid_argument(
                    "Get does not support literal IP addresses",
                ));
            }
            authority::Authority::Name {
                service, namespace, port, ..
            } => (ServiceId { namespace, name: service }, port),
        };

        let rx = self.index.read().endpoints_rx(service, port);
        let views: EndpointsStream = Box::pin(WatchStream::new(rx));
        let config = endpoint::Config {
            enable_h2_upgrade: self.enable_h2_upgrade,
        };
        let updates = endpoint::translate(config, views);
        Ok(Response::new(with_drain(self.drain.clone(), updates)))
    }

    type GetProfileStream = Pin<Box<dyn Stream<Item = Result<DestinationProfile, Status>> + Send>>;

    #[tracing::instrument(skip(self, req))]
    async fn get_profile(
        &self,
        req: Request<GetDestination>,
    ) -> Result<Response<Self::GetProfileStream>, Status> {
        let GetDestination {
            scheme,
            path,
            context_token,
            ..
        } = req.into_inner();
        if scheme != "k8s" {
            return Err(Status::invalid_argument(format!(
                "unsupported scheme: {scheme}"
            )));
        }
        let token = context_token::parse(&context_token);

        let stream: Pin<Box<dyn Stream<Item = Result<DestinationProfile, Status>> + Send>> =
            match authority::parse(&path, &self.cluster_domain)? {
                authority::Authority::Ip { addr, port } => match self.index.read().resolve_service_ip(addr) {
                    Resolved::One(service) => {
                        Box::pin(self.service_profile_stream(service, port, token.ns))
                    }
                    Resolved::Conflicting(_) => {
                        return Err(Status::failed_precondition(format!(
                            "multiple services claim cluster IP {addr}"
                        )));
                    }
                    Resolved::None => match self.index.read().resolve_pod_ip(addr) {
                        Resolved::One(pod) => Box::pin(self.pod_profile_stream(pod, port)?),
                        Resolved::Conflicting(_) => {
                            return Err(Status::failed_precondition(format!(
                                "multiple pods claim IP {addr}"
                            )));
                        }
                        Resolved::None => {
                            return Err(Status::not_found(format!("no service or pod has IP {addr}")));
                        }
                    },
                },
                authority::Authority::Name {
                    instance_id,
                    service,
                    namespace,
                    port,
                } if !instance_id.is_empty() => {
                    let service_id = ServiceId { namespace, name: service };
                    let pod = self
                        .index
                        .read()
                        .resolve_instance(&service_id, &instance_id)
                        .ok_or_else(|| {
                            Status::not_found(format!(
                                "no endpoint named {instance_id} backs {service_id}"
                            ))
                        })?;
                    Box::pin(self.pod_profile_stream(pod, port)?)
                }
                authority::Authority::Name { service, namespace, port, .. } => {
                    let service_id = ServiceId { namespace, name: service };
                    Box::pin(self.service_profile_stream(service_id, port, token.ns))
                }
            };

        Ok(Response::new(with_drain(self.drain.clone(), stream)))
    }
}

