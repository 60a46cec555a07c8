use std::collections::BTreeSet;

use jobcrawl_core::JobRecord;

/// Link-level comparison of two corpus snapshots.
///
/// Records without a link take part in the totals only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotDiff {
    pub added: BTreeSet<String>,
    pub removed: BTreeSet<String>,
    pub unchanged: BTreeSet<String>,
    pub before_total: usize,
    pub after_total: usize,
}

impl SnapshotDiff {
    pub fn compute(before: &[JobRecord], after: &[JobRecord]) -> Self {
        let before_links = link_set(before);
        let after_links = link_set(after);
        Self {
            added: after_links.difference(&before_links).cloned().collect(),
            removed: before_links.difference(&after_links).cloned().collect(),
            unchanged: before_links.intersection(&after_links).cloned().collect(),
            before_total: before.len(),
            after_total: after.len(),
        }
    }

    pub fn net_change(&self) -> i64 {
        self.after_total as i64 - self.before_total as i64
    }

    /// Records of `after` whose link was added, in snapshot order.
    pub fn added_records<'a>(&self, after: &'a [JobRecord]) -> Vec<&'a JobRecord> {
        select(after, &self.added)
    }

    /// Records of `before` whose link disappeared, in snapshot order.
    pub fn removed_records<'a>(&self, before: &'a [JobRecord]) -> Vec<&'a JobRecord> {
        select(before, &self.removed)
    }
}

fn link_set(records: &[JobRecord]) -> BTreeSet<String> {
    records
        .iter()
        .filter_map(JobRecord::canonical_link)
        .map(str::to_string)
        .collect()
}

fn select<'a>(records: &'a [JobRecord], links: &BTreeSet<String>) -> Vec<&'a JobRecord> {
    let mut seen = BTreeSet::new();
    records
        .iter()
        .filter(|r| {
            r.canonical_link()
                .is_some_and(|link| links.contains(link) && seen.insert(link.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(link: &str) -> JobRecord {
        JobRecord::new("Acme", format!("Role {link}"), link)
    }

    #[test]
    fn partitions_links() {
        let before = vec![job("a"), job("b"), job("c"), job("")];
        let after = vec![job("b"), job("c"), job("d"), job("e")];
        let diff = SnapshotDiff::compute(&before, &after);

        assert_eq!(diff.added, BTreeSet::from(["d".to_string(), "e".to_string()]));
        assert_eq!(diff.removed, BTreeSet::from(["a".to_string()]));
        assert_eq!(diff.unchanged, BTreeSet::from(["b".to_string(), "c".to_string()]));
        assert!(diff.added.is_disjoint(&diff.removed));
        assert_eq!(diff.before_total, 4);
        assert_eq!(diff.net_change(), 0);

        let after_links = link_set(&after);
        let union: BTreeSet<_> = diff.added.union(&diff.unchanged).cloned().collect();
        assert_eq!(union, after_links);
        let before_links = link_set(&before);
        let union: BTreeSet<_> = diff.removed.union(&diff.unchanged).cloned().collect();
        assert_eq!(union, before_links);
    }

    #[test]
    fn updated_content_under_same_link_is_unchanged() {
        let before = vec![job("a").with_description("old")];
        let after = vec![job("a").with_description("new")];
        let diff = SnapshotDiff::compute(&before, &after);
        assert!(diff.added.is_empty());
        assert_eq!(diff.unchanged.len(), 1);
    }

    #[test]
    fn record_lookups_follow_snapshot_order() {
        let before = vec![job("x"), job("y")];
        let after = vec![job("z"), job("y"), job("w")];
        let diff = SnapshotDiff::compute(&before, &after);
        let added: Vec<_> = diff.added_records(&after).iter().map(|r| r.link.as_str()).collect();
        assert_eq!(added, vec!["z", "w"]);
        let removed: Vec<_> =
            diff.removed_records(&before).iter().map(|r| r.link.as_str()).collect();
        assert_eq!(removed, vec!["x"]);
    }
}
