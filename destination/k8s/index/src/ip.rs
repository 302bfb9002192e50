//! Multi-valued IP -> resource maps (§4.1/§4.10). Two resources legitimately
//! racing to claim the same IP (a recycled pod IP mid-rollout, a headless
//! `Service`'s cluster IP colliding with a pod IP) is a real transient state,
//! so a lookup with more than one claimant is a conflict to report to the
//! caller, never an arbitrary pick.

use ahash::AHashMap as HashMap;
use std::{collections::BTreeSet, net::IpAddr};

#[derive(Debug)]
pub(crate) struct IpIndex<T: Ord + Clone> {
    by_ip: HashMap<IpAddr, BTreeSet<T>>,
}

impl<T: Ord + Clone> Default for IpIndex<T> {
    fn default() -> Self {
        Self {
            by_ip: HashMap::default(),
        }
    }
}

pub enum Resolved<T> {
    None,
    One(T),
    Conflicting(BTreeSet<T>),
}

impl<T: Ord + Clone> IpIndex<T> {
    pub(crate) fn insert(&mut self, ip: IpAddr, value: T) {
        self.by_ip.entry(ip).or_default().insert(value);
    }

    pub(crate) fn remove(&mut self, ip: IpAddr, value: &T) {
        if let Some(values) = self.by_ip.get_mut(&ip) {
            values.remove(value);
            if values.is_empty() {
                self.by_ip.remove(&ip);
            }
        }
    }

    pub(crate) fn resolve(&self, ip: IpAddr) -> Resolved<T> {
        match self.by_ip.get(&ip) {
            None => Resolved::None,
            Some(values) if values.len() == 1 => {
                Resolved::One(values.iter().next().expect("checked len").clone())
            }
            Some(values) => Resolved::Conflicting(values.clone()),
        }
    }
}
