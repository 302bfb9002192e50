//! Node name -> topology zone, used to annotate discovered endpoints with
//! locality metadata for topology-aware routing.

use linkerd_destination_k8s_api::{self as k8s, ResourceExt};
use std::{
    collections::{hash_map::Entry, HashSet},
    sync::Arc,
};
use tracing::{debug, instrument};

const ZONE_LABEL: &str = "topology.kubernetes.io/zone";

#[derive(Debug, Default)]
pub(crate) struct NodeIndex {
    index: ahash::AHashMap<String, State>,
}

#[derive(Debug)]
enum State {
    /// No `Node` has been indexed for this name yet; `(namespace, pod)` pairs
    /// that asked for this node's zone while pending are recorded so they can
    /// be reindexed once the node arrives.
    Pending(HashSet<(String, String)>),
    Known(Option<Arc<str>>),
}

impl NodeIndex {
    /// Returns the zone for `node_name` if it's known. If the node hasn't
    /// been indexed yet, `(ns, pod)` is recorded to be reindexed once it is.
    pub(crate) fn zone(&mut self, node_name: &str, pending: (String, String)) -> Option<Arc<str>> {
        match self.index.entry(node_name.to_string()) {
            Entry::Occupied(mut entry) => match entry.get_mut() {
                State::Known(zone) => zone.clone(),
                State::Pending(pods) => {
                    pods.insert(pending);
                    None
                }
            },
            Entry::Vacant(entry) => {
                entry.insert(State::Pending(std::iter::once(pending).collect()));
                None
            }
        }
    }

    /// Applies a `Node` update, returning the `(ns, pod)` pairs that were
    /// waiting on this node's zone and should now be reindexed.
    #[instrument(skip_all, fields(name = %node.name_any()))]
    pub(crate) fn apply(&mut self, node: &k8s::Node) -> Vec<(String, String)> {
        let zone = node
            .metadata
            .labels
            .as_ref()
            .and_then(|labels| labels.get(ZONE_LABEL))
            .map(|z| Arc::from(z.as_str()));
        debug!(?zone, "Indexed node");
        match self.index.entry(node.name_any()) {
            Entry::Occupied(mut entry) => {
                match std::mem::replace(entry.get_mut(), State::Known(zone)) {
                    State::Known(_) => vec![],
                    State::Pending(pods) => pods.into_iter().collect(),
                }
            }
            Entry::Vacant(entry) => {
                entry.insert(State::Known(zone));
                vec![]
            }
        }
    }

    pub(crate) fn delete(&mut self, name: &str) {
        self.index.remove(name);
    }

    pub(crate) fn reset(&mut self, nodes: Vec<k8s::Node>) -> Vec<(String, String)> {
        self.index.clear();
        nodes.iter().flat_map(|n| self.apply(n)).collect()
    }
}
