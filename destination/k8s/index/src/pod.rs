use anyhow::{bail, Context, Result};
use linkerd_destination_core::OwnerRef;
use linkerd_destination_k8s_api as k8s;

/// Holds pod metadata/config that can change without the pod's identity
/// (name, IP, node) changing.
#[derive(Debug, PartialEq)]
pub(crate) struct Meta {
    /// Used by `Server` pod selectors.
    pub labels: k8s::Labels,
    pub owner: Option<OwnerRef>,
    pub service_account: Option<String>,
}

/// A `HashSet` specialized for ports.
///
/// Because ports are `u16` values, this type avoids the overhead of actually
/// hashing ports.
pub(crate) type PortSet = std::collections::HashSet<u16, std::hash::BuildHasherDefault<PortHasher>>;

/// A `HashMap` specialized for ports.
pub(crate) type PortMap<V> =
    std::collections::HashMap<u16, V, std::hash::BuildHasherDefault<PortHasher>>;

/// A hasher for ports.
///
/// Because ports are single `u16` values, we don't have to hash them; we can
/// just use the integer value as the hash directly. Borrowed from the proxy.
#[derive(Default)]
pub(crate) struct PortHasher(u16);

impl std::hash::Hasher for PortHasher {
    fn write(&mut self, _: &[u8]) {
        unreachable!("hashing a `u16` calls `write_u16`");
    }

    #[inline]
    fn write_u16(&mut self, port: u16) {
        self.0 = port;
    }

    #[inline]
    fn finish(&self) -> u64 {
        self.0 as u64
    }
}

impl Meta {
    pub(crate) fn from_resource(pod: &k8s::Pod) -> Self {
        let owner = pod.metadata.owner_references.as_ref().and_then(|refs| {
            refs.iter()
                .find(|r| r.controller == Some(true))
                .map(|r| OwnerRef {
                    kind: r.kind.clone(),
                    name: r.name.clone(),
                })
        });
        let service_account = pod
            .spec
            .as_ref()
            .and_then(|s| s.service_account_name.clone());
        Self {
            labels: pod.metadata.labels.clone().into(),
            owner,
            service_account,
        }
    }
}

/// Gets the set of named TCP ports from a pod spec, mapping each name to
/// every container port it resolves to (a name may be reused across
/// containers).
pub(crate) fn tcp_ports_by_name(
    spec: &k8s::api::core::v1::PodSpec,
) -> ahash::AHashMap<String, PortSet> {
    let mut by_name = ahash::AHashMap::<String, PortSet>::default();
    for container in &spec.containers {
        for port in container.ports.iter().flatten() {
            if matches!(port.protocol.as_deref(), None | Some("TCP")) {
                if let Some(name) = port.name.as_ref() {
                    by_name
                        .entry(name.clone())
                        .or_default()
                        .insert(port.container_port as u16);
                }
            }
        }
    }
    by_name
}

/// Reads the `config.linkerd.io/opaque-ports` annotation from a resource's
/// metadata, parsing it as a port set. Invalid or absent annotations yield
/// the empty set.
pub(crate) fn opaque_ports_annotation(meta: &k8s::ObjectMeta) -> PortSet {
    let Some(anns) = meta.annotations.as_ref() else {
        return PortSet::default();
    };
    let Some(spec) = anns.get("config.linkerd.io/opaque-ports") else {
        return PortSet::default();
    };
    parse_portset(spec).unwrap_or_else(|error| {
        tracing::info!(%spec, %error, "invalid config.linkerd.io/opaque-ports annotation");
        PortSet::default()
    })
}

/// Reads a comma-separated list of ports or port ranges from the given
/// string.
pub(crate) fn parse_portset(s: &str) -> Result<PortSet> {
    let mut ports = PortSet::default();

    for spec in s.split(',') {
        match spec.split_once('-') {
            None => {
                if !spec.trim().is_empty() {
                    let port = spec.trim().parse().context("parsing port")?;
                    if port == 0 {
                        bail!("port must not be 0")
                    }
                    ports.insert(port);
                }
            }
            Some((floor, ceil)) => {
                let floor = floor.trim().parse::<u16>().context("parsing port")?;
                let ceil = ceil.trim().parse::<u16>().context("parsing port")?;
                if floor == 0 {
                    bail!("port must not be 0")
                }
                if floor > ceil {
                    bail!("port range must be increasing");
                }
                ports.extend(floor..=ceil);
            }
        }
    }

    Ok(ports)
}

#[cfg(test)]
mod tests {
    use super::parse_portset;

    #[test]
    fn parse_portset_cases() {
        assert!(parse_portset("").unwrap().is_empty(), "empty");
        assert!(parse_portset("0").is_err(), "0");
        assert_eq!(
            parse_portset("1").unwrap(),
            vec![1].into_iter().collect(),
            "1"
        );
        assert_eq!(
            parse_portset("1-2").unwrap(),
            vec![1, 2].into_iter().collect(),
            "1-2"
        );
        assert_eq!(
            parse_portset("4,1-2").unwrap(),
            vec![1, 2, 4].into_iter().collect(),
            "4,1-2"
        );
        assert!(parse_portset("2-1").is_err(), "2-1");
        assert!(parse_portset("2-").is_err(), "2-");
        assert!(parse_portset("65537").is_err(), "65537");
    }
}
