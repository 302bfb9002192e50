/// Holds cluster-wide metadata needed to synthesize identities and DNS
/// authorities for discovered endpoints.
#[derive(Clone, Debug)]
pub struct ClusterInfo {
    /// The namespace the control plane is deployed into.
    pub control_plane_ns: String,

    /// E.g. "cluster.local".
    pub dns_domain: String,

    /// The cluster's mesh identity trust domain.
    pub identity_domain: String,
}

impl ClusterInfo {
    pub(crate) fn service_account_identity(&self, ns: &str, sa: &str) -> String {
        format!(
            "{}.{}.serviceaccount.identity.{}.{}",
            sa, ns, self.control_plane_ns, self.identity_domain
        )
    }
}
