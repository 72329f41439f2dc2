//! Value types shared by the group and offset operations.
//!
//! Everything here is an immutable snapshot produced by a single call; none
//! of these types hold connections, locks, or background state.

use std::collections::{HashMap, HashSet};

use serde::{Serialize, Serializer};

use crate::error::AdminError;

/// A position in a partition's log, optionally carrying opaque client
/// metadata. `offset == -1` conventionally means "no commit exists".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Offset {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub leader_epoch: i32,
    pub metadata: String,
    /// Whether `leader_epoch` should be sent when this offset is committed.
    pub commit_leader_epoch: bool,
}

/// Offsets keyed by topic, then partition.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Offsets(pub HashMap<String, HashMap<i32, Offset>>);

impl Offsets {
    pub fn add(&mut self, o: Offset) {
        self.0
            .entry(o.topic.clone())
            .or_default()
            .insert(o.partition, o);
    }

    pub fn add_offset(&mut self, topic: &str, partition: i32, offset: i64, leader_epoch: i32) {
        self.add(Offset {
            topic: topic.to_string(),
            partition,
            offset,
            leader_epoch,
            metadata: String::new(),
            commit_leader_epoch: leader_epoch >= 0,
        });
    }

    pub fn lookup(&self, topic: &str, partition: i32) -> Lookup<&Offset> {
        lookup_in(&self.0, topic, partition)
    }

    /// The set of topics and partitions these offsets cover.
    pub fn topics_set(&self) -> TopicsSet {
        let mut s = TopicsSet::default();
        for (topic, partitions) in &self.0 {
            s.add(topic, partitions.keys().copied());
        }
        s
    }

    pub fn len(&self) -> usize {
        self.0.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A set of topics and, per topic, the partitions that are relevant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TopicsSet(pub HashMap<String, HashSet<i32>>);

impl TopicsSet {
    pub fn add(&mut self, topic: &str, partitions: impl IntoIterator<Item = i32>) {
        self.0
            .entry(topic.to_string())
            .or_default()
            .extend(partitions);
    }

    /// Unions another set into this one.
    pub fn merge(&mut self, other: &TopicsSet) {
        for (topic, partitions) in &other.0 {
            self.add(topic, partitions.iter().copied());
        }
    }

    pub fn contains(&self, topic: &str, partition: i32) -> bool {
        self.0.get(topic).is_some_and(|ps| ps.contains(&partition))
    }

    /// Topics and partitions in sorted order, for deterministic requests and
    /// output.
    pub fn each_sorted(&self) -> Vec<(String, Vec<i32>)> {
        let mut topics: Vec<_> = self
            .0
            .iter()
            .map(|(t, ps)| {
                let mut ps: Vec<i32> = ps.iter().copied().collect();
                ps.sort_unstable();
                (t.clone(), ps)
            })
            .collect();
        topics.sort();
        topics
    }

    pub fn len(&self) -> usize {
        self.0.values().map(HashSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An authoritative log position (start or end of log) reported by a broker,
/// paired with any error reported for that partition.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListedOffset {
    pub topic: String,
    pub partition: i32,
    pub timestamp: i64,
    pub leader_epoch: i32,
    pub offset: i64,
    #[serde(serialize_with = "ser_err")]
    pub err: Option<AdminError>,
}

/// Listed log positions keyed by topic, then partition.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListedOffsets(pub HashMap<String, HashMap<i32, ListedOffset>>);

impl ListedOffsets {
    pub fn add(&mut self, o: ListedOffset) {
        self.0
            .entry(o.topic.clone())
            .or_default()
            .insert(o.partition, o);
    }

    pub fn lookup(&self, topic: &str, partition: i32) -> Lookup<&ListedOffset> {
        lookup_in(&self.0, topic, partition)
    }

    pub fn each(&self, mut f: impl FnMut(&ListedOffset)) {
        for partitions in self.0.values() {
            for o in partitions.values() {
                f(o);
            }
        }
    }

    /// The first error among all listed offsets, if any. The backing map has
    /// no defined iteration order, so which error is first is not
    /// deterministic.
    pub fn error(&self) -> Option<&AdminError> {
        self.0
            .values()
            .flat_map(HashMap::values)
            .find_map(|o| o.err.as_ref())
    }

    pub fn ok(&self) -> bool {
        self.error().is_none()
    }
}

/// Result of looking up a partition in a topic-then-partition keyed map.
/// Distinguishes a topic that never appeared from a topic that appeared
/// without the requested partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    TopicAbsent,
    PartitionAbsent,
}

impl<T> Lookup<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(v) => Some(v),
            _ => None,
        }
    }
}

pub(crate) fn lookup_in<'a, V>(
    m: &'a HashMap<String, HashMap<i32, V>>,
    topic: &str,
    partition: i32,
) -> Lookup<&'a V> {
    match m.get(topic) {
        None => Lookup::TopicAbsent,
        Some(partitions) => match partitions.get(&partition) {
            None => Lookup::PartitionAbsent,
            Some(v) => Lookup::Found(v),
        },
    }
}

/// Serializes an inline error as its display string.
pub(crate) fn ser_err<S: Serializer>(err: &Option<AdminError>, s: S) -> Result<S::Ok, S::Error> {
    match err {
        Some(e) => s.serialize_some(&e.to_string()),
        None => s.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topics_set_add_and_merge() {
        let mut a = TopicsSet::default();
        a.add("t1", [0, 1]);
        a.add("t1", [1, 2]);
        let mut b = TopicsSet::default();
        b.add("t1", [3]);
        b.add("t2", [0]);
        a.merge(&b);

        assert_eq!(a.len(), 5);
        assert!(a.contains("t1", 3));
        assert!(a.contains("t2", 0));
        assert!(!a.contains("t2", 1));
        assert_eq!(
            a.each_sorted(),
            vec![
                ("t1".to_string(), vec![0, 1, 2, 3]),
                ("t2".to_string(), vec![0]),
            ],
        );
    }

    #[test]
    fn topic_with_no_partitions_counts_as_empty() {
        let mut s = TopicsSet::default();
        s.add("t", []);
        assert_eq!(s.len(), 0);
        assert!(s.is_empty());

        s.add("t", [0]);
        assert!(!s.is_empty());
    }

    #[test]
    fn offsets_topics_set() {
        let mut os = Offsets::default();
        os.add_offset("t", 0, 10, -1);
        os.add_offset("t", 1, 20, 3);
        assert_eq!(os.len(), 2);

        let s = os.topics_set();
        assert!(s.contains("t", 0) && s.contains("t", 1));

        let o = os.lookup("t", 1).found().unwrap();
        assert_eq!(o.offset, 20);
        assert!(o.commit_leader_epoch);
        assert_eq!(os.lookup("t", 9), Lookup::PartitionAbsent);
        assert_eq!(os.lookup("x", 0), Lookup::TopicAbsent);
    }

    #[test]
    fn listed_offsets_first_error() {
        let mut ends = ListedOffsets::default();
        ends.add(ListedOffset {
            topic: "t".to_string(),
            partition: 0,
            offset: 5,
            ..Default::default()
        });
        assert!(ends.ok());

        ends.add(ListedOffset {
            topic: "t".to_string(),
            partition: 1,
            err: Some(AdminError::ListMissing),
            ..Default::default()
        });
        assert!(matches!(ends.error(), Some(AdminError::ListMissing)));
    }
}
