//! Aggregate data model
//!
//! Counter maps use default-zero lookup: an absent key reads as 0, and
//! equality ignores zero-valued entries. Incremental updates leave zeroed
//! keys behind while a full recompute drops them, and both describe the
//! same live collection.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Dimension fields of an entity that the aggregate tracks
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dimensions {
    pub status: String,
    #[serde(default)]
    pub facilitator_key: Option<String>,
}

impl Dimensions {
    pub fn new(status: impl Into<String>, facilitator_key: Option<&str>) -> Self {
        Self {
            status: status.into(),
            facilitator_key: facilitator_key.map(str::to_string),
        }
        .normalized()
    }

    /// Trim both fields; a blank facilitator key means "no facilitator"
    pub fn normalized(self) -> Self {
        let status = self.status.trim().to_string();
        let facilitator_key = self
            .facilitator_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());
        Self {
            status,
            facilitator_key,
        }
    }

    /// A blank status cannot be counted: it would alias the total counter
    pub fn is_valid(&self) -> bool {
        !self.status.trim().is_empty()
    }
}

/// One live entity as seen by a collection scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRecord {
    pub entity_id: String,
    pub dimensions: Dimensions,
}

/// Classified entity transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityChange {
    Created(Dimensions),
    Deleted(Dimensions),
    Updated { before: Dimensions, after: Dimensions },
    /// Nothing aggregate-relevant changed; must produce zero writes
    Unchanged,
}

impl EntityChange {
    pub fn classify(before: Option<&Dimensions>, after: Option<&Dimensions>) -> Self {
        let before = before.cloned().map(Dimensions::normalized);
        let after = after.cloned().map(Dimensions::normalized);
        match (before, after) {
            (None, Some(after)) => EntityChange::Created(after),
            (Some(before), None) => EntityChange::Deleted(before),
            (Some(before), Some(after)) if before != after => {
                EntityChange::Updated { before, after }
            }
            _ => EntityChange::Unchanged,
        }
    }

    pub fn is_unchanged(&self) -> bool {
        matches!(self, EntityChange::Unchanged)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            EntityChange::Created(_) => "create",
            EntityChange::Deleted(_) => "delete",
            EntityChange::Updated { .. } => "update",
            EntityChange::Unchanged => "unchanged",
        }
    }
}

/// String-keyed counters with default-zero lookup
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CounterMap(BTreeMap<String, u64>);

impl CounterMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> u64 {
        self.0.get(key).copied().unwrap_or(0)
    }

    pub fn set(&mut self, key: impl Into<String>, value: u64) {
        self.0.insert(key.into(), value);
    }

    pub fn increment(&mut self, key: &str) {
        *self.0.entry(key.to_string()).or_insert(0) += 1;
    }

    /// All stored entries, including explicit zeros
    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn non_zero(&self) -> impl Iterator<Item = (&str, u64)> {
        self.iter().filter(|(_, v)| *v > 0)
    }

    pub fn is_zero(&self) -> bool {
        self.0.values().all(|v| *v == 0)
    }
}

impl PartialEq for CounterMap {
    fn eq(&self, other: &Self) -> bool {
        self.non_zero().eq(other.non_zero())
    }
}

impl Eq for CounterMap {}

impl<K: Into<String>> FromIterator<(K, u64)> for CounterMap {
    fn from_iter<I: IntoIterator<Item = (K, u64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Per-group breakdown
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupCounts {
    pub total: u64,
    pub by_dimension: CounterMap,
}

impl GroupCounts {
    pub fn is_zero(&self) -> bool {
        self.total == 0 && self.by_dimension.is_zero()
    }
}

/// The counter part of a snapshot
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateCounts {
    pub total: u64,
    pub by_dimension: CounterMap,
    pub by_group: BTreeMap<String, GroupCounts>,
}

impl AggregateCounts {
    /// Count one live entity
    pub fn add_entity(&mut self, dims: &Dimensions) {
        self.total += 1;
        self.by_dimension.increment(&dims.status);
        if let Some(group) = &dims.facilitator_key {
            let counts = self.by_group.entry(group.clone()).or_default();
            counts.total += 1;
            counts.by_dimension.increment(&dims.status);
        }
    }

    pub fn from_entities<'a>(dims: impl IntoIterator<Item = &'a Dimensions>) -> Self {
        let mut counts = Self::default();
        for d in dims {
            counts.add_entity(d);
        }
        counts
    }

    pub fn get(&self, path: &CounterPath) -> u64 {
        match path {
            CounterPath::Total => self.total,
            CounterPath::Dimension(value) => self.by_dimension.get(value),
            CounterPath::GroupTotal(group) => self.by_group.get(group).map_or(0, |g| g.total),
            CounterPath::GroupDimension(group, value) => self
                .by_group
                .get(group)
                .map_or(0, |g| g.by_dimension.get(value)),
        }
    }

    pub fn set(&mut self, path: &CounterPath, value: u64) {
        match path {
            CounterPath::Total => self.total = value,
            CounterPath::Dimension(dim) => self.by_dimension.set(dim.clone(), value),
            CounterPath::GroupTotal(group) => {
                self.by_group.entry(group.clone()).or_default().total = value
            }
            CounterPath::GroupDimension(group, dim) => self
                .by_group
                .entry(group.clone())
                .or_default()
                .by_dimension
                .set(dim.clone(), value),
        }
    }

    /// Every counter as a (path, value) pair, explicit zeros included
    pub fn counters(&self) -> Vec<(CounterPath, u64)> {
        let mut out = vec![(CounterPath::Total, self.total)];
        out.extend(
            self.by_dimension
                .iter()
                .map(|(d, v)| (CounterPath::Dimension(d.to_string()), v)),
        );
        for (group, counts) in &self.by_group {
            out.push((CounterPath::GroupTotal(group.clone()), counts.total));
            out.extend(counts.by_dimension.iter().map(|(d, v)| {
                (CounterPath::GroupDimension(group.clone(), d.to_string()), v)
            }));
        }
        out
    }

    fn non_zero_groups(&self) -> impl Iterator<Item = (&String, &GroupCounts)> {
        self.by_group.iter().filter(|(_, g)| !g.is_zero())
    }
}

impl PartialEq for AggregateCounts {
    fn eq(&self, other: &Self) -> bool {
        self.total == other.total
            && self.by_dimension == other.by_dimension
            && self.non_zero_groups().eq(other.non_zero_groups())
    }
}

impl Eq for AggregateCounts {}

/// How a snapshot was produced (diagnostic only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComputedBy {
    FullRecompute,
    Incremental,
}

impl ComputedBy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ComputedBy::FullRecompute => "full_recompute",
            ComputedBy::Incremental => "incremental",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "full_recompute" => Some(ComputedBy::FullRecompute),
            "incremental" => Some(ComputedBy::Incremental),
            _ => None,
        }
    }
}

/// Stored aggregate record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateSnapshot {
    #[serde(flatten)]
    pub counts: AggregateCounts,
    /// Epoch milliseconds, never decreasing
    pub last_updated: i64,
    pub computed_by: ComputedBy,
}

/// Address of one counter inside a snapshot
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CounterPath {
    Total,
    Dimension(String),
    GroupTotal(String),
    GroupDimension(String, String),
}

impl fmt::Display for CounterPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CounterPath::Total => write!(f, "total"),
            CounterPath::Dimension(d) => write!(f, "byDimension/{}", d),
            CounterPath::GroupTotal(g) => write!(f, "byGroup/{}/total", g),
            CounterPath::GroupDimension(g, d) => write!(f, "byGroup/{}/byDimension/{}", g, d),
        }
    }
}

/// One absolute counter value in a multi-path update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterWrite {
    pub path: CounterPath,
    pub value: u64,
}

/// All-or-nothing multi-path update of a snapshot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotUpdate {
    pub writes: Vec<CounterWrite>,
    pub last_updated: i64,
    pub computed_by: ComputedBy,
}

impl SnapshotUpdate {
    /// Apply to an in-memory snapshot, creating it if absent
    pub fn apply_to(&self, snapshot: Option<AggregateSnapshot>) -> AggregateSnapshot {
        let mut counts = snapshot.map(|s| s.counts).unwrap_or_default();
        for write in &self.writes {
            counts.set(&write.path, write.value);
        }
        AggregateSnapshot {
            counts,
            last_updated: self.last_updated,
            computed_by: self.computed_by,
        }
    }
}
