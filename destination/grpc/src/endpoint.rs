//! Endpoint translator (§4.2): turns a stream of
//! `linkerd_destination_core::EndpointsView` snapshots into the sequence of
//! `Update` messages a `Get` stream writes back to the client, coalescing
//! consecutive identical emissions and diffing additions/removals between
//! snapshots.
//!
//! Grounded on `grpc/src/outbound.rs`'s `response_stream` (`async_stream`
//! driving a `tonic::Status`-yielding stream off an internal watch) and on
//! the public `io.linkerd.proxy.destination` wire shapes re-exported by
//! `linkerd2_proxy_api::destination`/`net`.

use linkerd_destination_core::{EndpointsStream, EndpointsView, WeightedAddr};
use linkerd2_proxy_api::{
    destination::{
        protocol_hint::Protocol as ProtoProtocol, update::Update as UpdateKind, AddrSet,
        NoEndpoints, ProtocolHint as ProtoProtocolHint, Update, WeightedAddr as ProtoWeightedAddr,
        WeightedAddrSet,
    },
    net::{ip_address, IpAddress, TcpAddress},
};
use std::{collections::HashMap, net::SocketAddr};
use tokio_stream::StreamExt;

/// Configuration the endpoint translator needs that isn't carried on the
/// `EndpointsView` itself.
#[derive(Clone, Debug)]
pub struct Config {
    pub enable_h2_upgrade: bool,
}

/// Translates a raw endpoint-view stream into wire `Update`s, tracking the
/// previously-emitted address set so it can emit `Remove` for endpoints that
/// drop out and skip re-emitting an unchanged snapshot.
pub fn translate(
    config: Config,
    views: EndpointsStream,
) -> impl tokio_stream::Stream<Item = Result<Update, tonic::Status>> {
    async_stream::stream! {
        tokio::pin!(views);
        let mut previous: HashMap<SocketAddr, WeightedAddr> = HashMap::new();
        let mut emitted_no_endpoints = false;

        while let Some(view) = views.next().await {
            if view.addresses.is_empty() {
                if !previous.is_empty() || !emitted_no_endpoints {
                    previous.clear();
                    emitted_no_endpoints = true;
                    yield Ok(Update {
                        update: Some(UpdateKind::NoEndpoints(NoEndpoints {
                            exists: view.exists,
                        })),
                    });
                }
                continue;
            }
            emitted_no_endpoints = false;

            let removed: Vec<SocketAddr> = previous
                .keys()
                .filter(|a| !view.addresses.contains_key(*a))
                .copied()
                .collect();
            let added: Vec<&WeightedAddr> = view
                .addresses
                .iter()
                .filter(|(a, w)| previous.get(*a) != Some(*w))
                .map(|(_, w)| w)
                .collect();

            if !removed.is_empty() {
                yield Ok(Update {
                    update: Some(UpdateKind::Remove(AddrSet {
                        addrs: removed.iter().map(|a| to_tcp_address(*a)).collect(),
                    })),
                });
            }
            if !added.is_empty() {
                yield Ok(Update {
                    update: Some(UpdateKind::Add(WeightedAddrSet {
                        addrs: added
                            .iter()
                            .map(|w| to_proto_weighted_addr(&config, w))
                            .collect(),
                        metric_labels: Default::default(),
                    })),
                });
            }

            previous = view.addresses;
        }
    }
}

pub(crate) fn to_tcp_address(addr: SocketAddr) -> TcpAddress {
    let ip = match addr.ip() {
        std::net::IpAddr::V4(v4) => ip_address::Ip::Ipv4(u32::from_be_bytes(v4.octets())),
        std::net::IpAddr::V6(v6) => ip_address::Ip::Ipv6({
            let segments = v6.segments();
            linkerd2_proxy_api::net::IPv6 {
                first: u64::from(segments[0]) << 48
                    | u64::from(segments[1]) << 32
                    | u64::from(segments[2]) << 16
                    | u64::from(segments[3]),
                last: u64::from(segments[4]) << 48
                    | u64::from(segments[5]) << 32
                    | u64::from(segments[6]) << 16
                    | u64::from(segments[7]),
            }
        }),
    };
    TcpAddress {
        ip: Some(IpAddress { ip: Some(ip) }),
        port: u32::from(addr.port()),
    }
}

pub(crate) fn to_proto_weighted_addr(config: &Config, w: &WeightedAddr) -> ProtoWeightedAddr {
    let h2_upgrade = config.enable_h2_upgrade && w.metadata.identity.is_some();
    let protocol_hint = (!w.metadata.protocol_hint.opaque).then(|| ProtoProtocolHint {
        protocol: h2_upgrade.then_some(ProtoProtocol::H2(
            linkerd2_proxy_api::destination::protocol_hint::H2 {},
        )),
        opaque_transport: None,
    });

    ProtoWeightedAddr {
        addr: Some(to_tcp_address(w.address.addr)),
        weight: w.weight,
        metric_labels: w.metadata.labels.clone().into_iter().collect(),
        tls_identity: w.metadata.identity.clone().map(|identity| {
            linkerd2_proxy_api::destination::TlsIdentity {
                strategy: Some(
                    linkerd2_proxy_api::destination::tls_identity::Strategy::DnsLikeIdentity(
                        linkerd2_proxy_api::destination::tls_identity::DnsLikeIdentity { name: identity },
                    ),
                ),
            }
        }),
        authority_override: String::new(),
        protocol_hint,
    }
}
