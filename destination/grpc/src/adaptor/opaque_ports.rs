//! Opaque-ports adaptor (§4.5): merges a `ServiceProfile`'s own
//! `opaque_ports` with the service's `config.linkerd.io/opaque-ports`
//! annotation (tracked separately because either source can change
//! independently of the other) and forwards the merged membership test for
//! one port whenever either source changes.
//!
//! Takes plain `Stream`s rather than raw `watch::Receiver`s so it composes
//! after the fallback listener (§4.6), which has already reduced two
//! `watch` subscriptions to one derived profile stream.

use linkerd_destination_core::Profile;
use std::collections::BTreeSet;
use tokio_stream::{Stream, StreamExt};

/// Yields `(profile, opaque)` once immediately and again on every
/// subsequent change to either source, where `opaque` is whether `port` is
/// in the union of the profile's own `opaque_ports` and `service_ports`.
pub fn merge(
    profile: impl Stream<Item = Option<Profile>>,
    service_ports: impl Stream<Item = BTreeSet<u16>>,
    port: u16,
) -> impl Stream<Item = (Option<Profile>, bool)> {
    async_stream::stream! {
        tokio::pin!(profile);
        tokio::pin!(service_ports);

        let mut latest_profile: Option<Profile> = None;
        let mut latest_ports = BTreeSet::new();

        loop {
            tokio::select! {
                next = profile.next() => match next {
                    Some(p) => latest_profile = p,
                    None => return,
                },
                next = service_ports.next() => match next {
                    Some(p) => latest_ports = p,
                    None => return,
                },
            }

            let opaque = latest_ports.contains(&port)
                || latest_profile
                    .as_ref()
                    .is_some_and(|p| p.opaque_ports.contains(&port));
            yield (latest_profile.clone(), opaque);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;
    use maplit::btreeset;

    #[tokio::test]
    async fn unions_both_sources() {
        let profile = stream::iter(vec![Some(Profile {
            opaque_ports: btreeset! {9090},
            ..Profile::empty("web.prod.svc.cluster.local")
        })])
        .chain(stream::pending());
        let ports = stream::iter(vec![btreeset! {8080}, btreeset! {8080, 8443}]).chain(stream::pending());

        let merged = merge(profile, ports, 8443);
        tokio::pin!(merged);

        let (_, opaque) = merged.next().await.unwrap();
        assert!(!opaque, "8443 not yet in the service-port set");

        let (_, opaque) = merged.next().await.unwrap();
        assert!(opaque, "8443 added to the service-port set");
    }

    #[tokio::test]
    async fn profile_opaque_ports_also_count() {
        let profile = stream::iter(vec![Some(Profile {
            opaque_ports: btreeset! {9090},
            ..Profile::empty("web.prod.svc.cluster.local")
        })])
        .chain(stream::pending());
        let ports = stream::iter(vec![BTreeSet::new()]).chain(stream::pending());

        let merged = merge(profile, ports, 9090);
        tokio::pin!(merged);
        let (_, opaque) = merged.next().await.unwrap();
        assert!(opaque);
    }
}
