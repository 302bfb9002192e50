//! Parses a `GetDestination.path` of the form `host[:port]` into a structured
//! target, grounded on `grpc/src/outbound.rs`'s `lookup_authority` (same
//! `http::uri::Authority`-based parse, extended for the destination
//! service's optional instance-ID prefix per spec.md §4.8).

use std::{net::IpAddr, num::NonZeroU16, str::FromStr};

const DEFAULT_PORT: NonZeroU16 = match NonZeroU16::new(80) {
    Some(p) => p,
    None => unreachable!(),
};

/// The parsed form of a `Get`/`GetProfile` authority.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Authority {
    Ip { addr: IpAddr, port: NonZeroU16 },
    Name {
        instance_id: String,
        service: String,
        namespace: String,
        port: NonZeroU16,
    },
}

/// Splits `host[:port]` into its parts, rejecting more than one colon
/// outside of an IPv6 literal's brackets.
pub fn parse(path: &str, cluster_domain: &str) -> Result<Authority, tonic::Status> {
    let auth = http::uri::Authority::from_str(path)
        .map_err(|_| tonic::Status::invalid_argument(format!("invalid authority: {path}")))?;

    let host = auth.host();
    if host.is_empty() {
        return Err(tonic::Status::invalid_argument(
            "authority must have a host",
        ));
    }

    let port = match auth.port_u16() {
        Some(p) => NonZeroU16::new(p)
            .ok_or_else(|| tonic::Status::invalid_argument("port cannot be zero"))?,
        None => DEFAULT_PORT,
    };

    if let Ok(addr) = host.parse::<IpAddr>() {
        return Ok(Authority::Ip { addr, port });
    }

    let stripped = host
        .trim_end_matches('.')
        .trim_end_matches(cluster_domain)
        .trim_end_matches('.');

    let mut labels: Vec<&str> = stripped.split('.').collect();
    let invalid = || {
        tonic::Status::invalid_argument(format!(
            "authority must be of the form [<instance>.]<service>.<namespace>.svc.{cluster_domain}"
        ))
    };

    if labels.len() < 3 || labels[labels.len() - 1] != "svc" {
        return Err(invalid());
    }
    labels.pop(); // "svc"

    let namespace = labels.pop().ok_or_else(invalid)?.to_string();
    let service = labels.pop().ok_or_else(invalid)?.to_string();
    let instance_id = match labels.len() {
        0 => String::new(),
        1 => labels.pop().expect("checked len").to_string(),
        _ => return Err(invalid()),
    };

    Ok(Authority::Name {
        instance_id,
        service,
        namespace,
        port,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_service() {
        let auth = parse("web.prod.svc.cluster.local:8080", "cluster.local").unwrap();
        assert_eq!(
            auth,
            Authority::Name {
                instance_id: String::new(),
                service: "web".to_string(),
                namespace: "prod".to_string(),
                port: NonZeroU16::new(8080).unwrap(),
            }
        );
    }

    #[test]
    fn defaults_to_port_80() {
        let auth = parse("web.prod.svc.cluster.local", "cluster.local").unwrap();
        assert_eq!(
            auth,
            Authority::Name {
                instance_id: String::new(),
                service: "web".to_string(),
                namespace: "prod".to_string(),
                port: NonZeroU16::new(80).unwrap(),
            }
        );
    }

    #[test]
    fn parses_instance_prefixed_service() {
        let auth = parse("instance-0.web.prod.svc.cluster.local:8080", "cluster.local").unwrap();
        assert_eq!(
            auth,
            Authority::Name {
                instance_id: "instance-0".to_string(),
                service: "web".to_string(),
                namespace: "prod".to_string(),
                port: NonZeroU16::new(8080).unwrap(),
            }
        );
    }

    #[test]
    fn parses_ip() {
        let auth = parse("10.1.2.3:80", "cluster.local").unwrap();
        assert_eq!(
            auth,
            Authority::Ip {
                addr: "10.1.2.3".parse().unwrap(),
                port: NonZeroU16::new(80).unwrap(),
            }
        );
    }

    #[test]
    fn rejects_too_many_labels() {
        assert!(parse("a.b.c.web.prod.svc.cluster.local", "cluster.local").is_err());
    }

    #[test]
    fn rejects_missing_svc() {
        assert!(parse("web.prod.cluster.local", "cluster.local").is_err());
    }
}
