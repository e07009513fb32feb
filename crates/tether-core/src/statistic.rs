//! How often each link was followed, and what the target answered.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tether_graph::Link;
use tether_ir::OperationId;

/// Counters for one link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkCounts {
    pub source: OperationId,
    pub status: String,
    pub target: OperationId,
    pub name: String,
    /// Times the link drove a step.
    pub followed: u64,
    /// Target responses by status code.
    pub responses: BTreeMap<u16, u64>,
    /// Steps that never got a response.
    pub errors: u64,
}

/// Link statistics, keyed by transition id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LinkStatistic {
    links: BTreeMap<String, LinkCounts>,
}

impl LinkStatistic {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one traversal of `link`. `status` is `None` when the call failed.
    pub fn record(&mut self, link: &Link, status: Option<u16>) {
        let counts = self
            .links
            .entry(link.transition_id())
            .or_insert_with(|| LinkCounts {
                source: link.source.clone(),
                status: link.status.to_string(),
                target: link.target.clone(),
                name: link.name.clone(),
                followed: 0,
                responses: BTreeMap::new(),
                errors: 0,
            });
        counts.followed += 1;
        match status {
            Some(code) => *counts.responses.entry(code).or_default() += 1,
            None => counts.errors += 1,
        }
    }

    pub fn merge(&mut self, other: LinkStatistic) {
        for (key, theirs) in other.links {
            match self.links.get_mut(&key) {
                Some(ours) => {
                    ours.followed += theirs.followed;
                    ours.errors += theirs.errors;
                    for (code, n) in theirs.responses {
                        *ours.responses.entry(code).or_default() += n;
                    }
                }
                None => {
                    self.links.insert(key, theirs);
                }
            }
        }
    }

    pub fn get(&self, link: &Link) -> Option<&LinkCounts> {
        self.links.get(&link.transition_id())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &LinkCounts)> {
        self.links.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn total_followed(&self) -> u64 {
        self.links.values().map(|c| c.followed).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_ir::StatusPattern;

    fn link(name: &str) -> Link {
        Link {
            name: name.into(),
            source: OperationId::new("createUser"),
            source_label: "POST /users".into(),
            status: StatusPattern::Exact(201),
            target: OperationId::new("getUser"),
            target_label: "GET /users/{id}".into(),
            parameters: Vec::new(),
            request_body: None,
        }
    }

    #[test]
    fn test_record_and_merge() {
        let get = link("GetCreatedUser");
        let mut a = LinkStatistic::new();
        a.record(&get, Some(200));
        a.record(&get, None);

        let mut b = LinkStatistic::new();
        b.record(&get, Some(200));
        b.record(&get, Some(404));
        b.record(&link("Other"), Some(200));

        a.merge(b);
        let counts = a.get(&get).unwrap();
        assert_eq!(counts.followed, 4);
        assert_eq!(counts.errors, 1);
        assert_eq!(counts.responses[&200], 2);
        assert_eq!(counts.responses[&404], 1);
        assert_eq!(counts.status, "201");
        assert_eq!(a.total_followed(), 5);
        assert_eq!(a.iter().count(), 2);
    }
}
