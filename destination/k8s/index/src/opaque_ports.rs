//! The `config.linkerd.io/opaque-ports` annotation on a `Service`, merged
//! into the profile a client receives for it (§4.5).

use crate::pod::parse_portset;
use linkerd_destination_k8s_api as k8s;
use std::collections::BTreeSet;

pub(crate) fn from_service(svc: &k8s::api::core::v1::Service) -> BTreeSet<u16> {
    let Some(anns) = svc.metadata.annotations.as_ref() else {
        return BTreeSet::new();
    };
    let Some(spec) = anns.get("config.linkerd.io/opaque-ports") else {
        return BTreeSet::new();
    };
    parse_portset(spec)
        .unwrap_or_else(|error| {
            tracing::info!(%spec, %error, "invalid config.linkerd.io/opaque-ports annotation");
            Default::default()
        })
        .into_iter()
        .collect()
}
