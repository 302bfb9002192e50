//! Endpoint-profile translator (§4.3): produces the `endpoint` field of a
//! `DestinationProfile` for the IP-to-pod and instance-ID `GetProfile`
//! cases — a single `WeightedAddr` whose opaque bit tracks the pod/port's
//! `Server` subscription (which already folds in the pod's own
//! `config.linkerd.io/opaque-ports` annotation, see `k8s/index/src/index.rs`).

use crate::endpoint::to_proto_weighted_addr;
use linkerd_destination_core::WeightedAddr;
use linkerd2_proxy_api::destination::WeightedAddr as ProtoWeightedAddr;
use tokio::sync::watch;
use tokio_stream::Stream;

/// Yields the endpoint-profile's `WeightedAddr` once immediately, then again
/// every time `protocol` reports a changed opaque bit.
pub fn translate(
    enable_h2_upgrade: bool,
    mut addr: WeightedAddr,
    mut protocol: watch::Receiver<linkerd_destination_core::Protocol>,
) -> impl Stream<Item = ProtoWeightedAddr> {
    async_stream::stream! {
        let config = crate::endpoint::Config { enable_h2_upgrade };
        loop {
            addr.metadata.protocol_hint.opaque = protocol.borrow().is_opaque();
            yield to_proto_weighted_addr(&config, &addr);
            if protocol.changed().await.is_err() {
                return;
            }
        }
    }
}
