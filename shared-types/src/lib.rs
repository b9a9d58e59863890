//! Wire types shared between conductors and workers
//!
//! These types cross process boundaries: they identify actors, carry the
//! orchestration protocol between a conductor and its workers, and report
//! progress telemetry. Everything here is serializable with serde using a
//! structural, field-named encoding (JSON documents on the wire, camelCase
//! measurement fields).

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Identity
// ============================================================================

/// Name of a database server (node) participating in the cluster.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ServerId(pub String);

impl ServerId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Addressable identity of an actor.
///
/// Globally unique within the cluster's addressing scope and stable for the
/// lifetime of the actor. Opaque to the orchestration layer beyond
/// equality/ordering/hash/display. Serialized as its display form
/// (`server/id`) so it can key JSON maps.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActorId {
    /// Server the actor lives on.
    pub server: ServerId,
    /// Process-unique sequence number on that server.
    pub id: u64,
}

impl ActorId {
    pub fn new(server: ServerId, id: u64) -> Self {
        Self { server, id }
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.server, self.id)
    }
}

/// Error parsing an [`ActorId`] from its `server/id` display form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseActorIdError(String);

impl fmt::Display for ParseActorIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid actor id: {}", self.0)
    }
}

impl std::error::Error for ParseActorIdError {}

impl FromStr for ActorId {
    type Err = ParseActorIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (server, id) = s
            .rsplit_once('/')
            .ok_or_else(|| ParseActorIdError(s.to_string()))?;
        if server.is_empty() {
            return Err(ParseActorIdError(s.to_string()));
        }
        let id = id.parse().map_err(|_| ParseActorIdError(s.to_string()))?;
        Ok(Self::new(ServerId::new(server), id))
    }
}

impl Serialize for ActorId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ActorId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Identity of one cluster-wide computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ExecutionId(pub u64);

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Computation configuration
// ============================================================================

/// Superstep cap applied when the algorithm never goes globally inactive.
pub const DEFAULT_MAX_SUPERSTEPS: u64 = 500;

/// Computation-invariant settings fixed when a computation is launched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ComputationConfig {
    /// Upper bound on superstep rounds before results are stored regardless
    /// of remaining vertex activity.
    pub max_supersteps: u64,
}

impl Default for ComputationConfig {
    fn default() -> Self {
        Self {
            max_supersteps: DEFAULT_MAX_SUPERSTEPS,
        }
    }
}

// ============================================================================
// Message taxonomy
// ============================================================================

/// Messages a conductor sends to its workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all_fields = "camelCase")]
pub enum WorkerMessage {
    /// Load the worker's shard of the graph.
    LoadGraph,
    /// Run one synchronized round of the bulk computation.
    RunSuperstep { superstep: u64 },
    /// Write computed results back to the store.
    StoreResults,
    /// Release all resources held for this computation.
    Cleanup,
}

/// Messages a conductor receives: worker replies, plus the engine-facing
/// cancellation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all_fields = "camelCase")]
pub enum ConductorMessage {
    /// Worker finished loading its shard.
    GraphLoaded { status: Status },
    /// Worker finished the given superstep round.
    SuperstepFinished {
        superstep: u64,
        active_vertices: u64,
        status: Status,
    },
    /// Worker finished writing results.
    ResultsStored { status: Status },
    /// Worker released its resources.
    CleanupFinished,
    /// Abort the computation and tear it down.
    Cancel,
}

impl ConductorMessage {
    /// Progress snapshot carried by this message, if any.
    pub fn status(&self) -> Option<&Status> {
        match self {
            ConductorMessage::GraphLoaded { status }
            | ConductorMessage::SuperstepFinished { status, .. }
            | ConductorMessage::ResultsStored { status } => Some(status),
            ConductorMessage::CleanupFinished | ConductorMessage::Cancel => None,
        }
    }
}

// ============================================================================
// Status telemetry
// ============================================================================

/// One worker's point-in-time progress snapshot.
///
/// Every measurement is optional: absence means "not yet reported", never
/// zero. Combining snapshots must preserve that distinction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Status {
    /// When the snapshot was taken.
    pub time_stamp: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertices_loaded: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edges_loaded: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vertices_stored: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_bytes_used: Option<u64>,
}

impl Status {
    /// Empty snapshot stamped with the current time.
    pub fn now() -> Self {
        Self {
            time_stamp: Utc::now(),
            ..Default::default()
        }
    }

    /// Merge two snapshots into one cluster-wide view.
    ///
    /// The timestamp is the newer of the two. Each measurement sums when
    /// both sides report it, passes through unchanged when only one does,
    /// and stays absent when neither does; a worker that has not yet
    /// reported a metric must not zero out a peer's contribution.
    pub fn combine(self, other: Status) -> Status {
        Status {
            time_stamp: self.time_stamp.max(other.time_stamp),
            vertices_loaded: add_measurements(self.vertices_loaded, other.vertices_loaded),
            edges_loaded: add_measurements(self.edges_loaded, other.edges_loaded),
            vertices_stored: add_measurements(self.vertices_stored, other.vertices_stored),
            memory_bytes_used: add_measurements(self.memory_bytes_used, other.memory_bytes_used),
        }
    }
}

impl Default for Status {
    fn default() -> Self {
        Self {
            time_stamp: DateTime::UNIX_EPOCH,
            vertices_loaded: None,
            edges_loaded: None,
            vertices_stored: None,
            memory_bytes_used: None,
        }
    }
}

fn add_measurements(a: Option<u64>, b: Option<u64>) -> Option<u64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a + b),
        (Some(v), None) | (None, Some(v)) => Some(v),
        (None, None) => None,
    }
}

/// Per-worker progress view of one computation, updated in place as new
/// snapshots arrive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConductorStatus {
    pub workers: BTreeMap<ActorId, Status>,
}

impl ConductorStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the slot for `worker` with its newest snapshot.
    pub fn update(&mut self, worker: ActorId, status: Status) {
        self.workers.insert(worker, status);
    }

    /// Fold every worker snapshot into one cluster-wide [`Status`].
    ///
    /// Order-independent: `combine` is commutative and associative on its
    /// sum components and max-idempotent on the timestamp. The per-worker
    /// map is returned untouched for drill-down reporting.
    pub fn accumulate(&self) -> AccumulatedConductorStatus {
        let status = self
            .workers
            .values()
            .cloned()
            .reduce(Status::combine)
            .unwrap_or_default();
        AccumulatedConductorStatus {
            status,
            workers: self.workers.clone(),
        }
    }
}

/// Cluster summary plus per-worker breakdown, as served to whatever layer
/// reports operational status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccumulatedConductorStatus {
    /// Cluster-wide folded view.
    pub status: Status,
    /// Unmerged per-worker snapshots.
    pub workers: BTreeMap<ActorId, Status>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn worker(n: u64) -> ActorId {
        ActorId::new(ServerId::new("PRMR-0001"), n)
    }

    #[test]
    fn test_actor_id_display_and_parse() {
        let id = ActorId::new(ServerId::new("CRDN-42"), 7);
        assert_eq!(id.to_string(), "CRDN-42/7");
        assert_eq!("CRDN-42/7".parse::<ActorId>().unwrap(), id);
    }

    #[test]
    fn test_actor_id_parse_rejects_garbage() {
        assert!("no-separator".parse::<ActorId>().is_err());
        assert!("/7".parse::<ActorId>().is_err());
        assert!("server/notanumber".parse::<ActorId>().is_err());
    }

    #[test]
    fn test_actor_id_keys_json_maps() {
        let mut status = ConductorStatus::new();
        status.update(worker(1), Status::now());

        let json = serde_json::to_value(&status).unwrap();
        assert!(json["workers"]["PRMR-0001/1"].is_object());

        let back: ConductorStatus = serde_json::from_value(json).unwrap();
        assert_eq!(back, status);
    }

    #[test]
    fn test_combine_sums_present_measurements() {
        let a = Status {
            time_stamp: ts(100),
            vertices_loaded: Some(2),
            ..Default::default()
        };
        let b = Status {
            time_stamp: ts(200),
            vertices_loaded: Some(3),
            ..Default::default()
        };

        let merged = a.combine(b);
        assert_eq!(merged.time_stamp, ts(200));
        assert_eq!(merged.vertices_loaded, Some(5));
    }

    #[test]
    fn test_combine_absence_never_clobbers_presence() {
        let a = Status {
            time_stamp: ts(300),
            vertices_loaded: Some(2),
            ..Default::default()
        };
        let b = Status {
            time_stamp: ts(100),
            vertices_loaded: None,
            ..Default::default()
        };

        let merged = a.combine(b);
        assert_eq!(merged.time_stamp, ts(300));
        assert_eq!(merged.vertices_loaded, Some(2));
    }

    #[test]
    fn test_combine_both_absent_stays_absent() {
        let merged = Status {
            time_stamp: ts(1),
            ..Default::default()
        }
        .combine(Status {
            time_stamp: ts(2),
            ..Default::default()
        });
        assert_eq!(merged.vertices_loaded, None);
        assert_eq!(merged.memory_bytes_used, None);
    }

    #[test]
    fn test_combine_is_commutative() {
        let a = Status {
            time_stamp: ts(10),
            vertices_loaded: Some(4),
            edges_loaded: Some(9),
            ..Default::default()
        };
        let b = Status {
            time_stamp: ts(20),
            vertices_loaded: Some(6),
            memory_bytes_used: Some(1024),
            ..Default::default()
        };
        assert_eq!(a.clone().combine(b.clone()), b.combine(a));
    }

    #[test]
    fn test_accumulate_folds_workers_and_keeps_breakdown() {
        let mut status = ConductorStatus::new();
        status.update(
            worker(1),
            Status {
                time_stamp: ts(100),
                vertices_loaded: Some(2),
                ..Default::default()
            },
        );
        status.update(
            worker(2),
            Status {
                time_stamp: ts(500),
                vertices_loaded: Some(987),
                ..Default::default()
            },
        );

        let accumulated = status.accumulate();
        assert_eq!(accumulated.status.time_stamp, ts(500));
        assert_eq!(accumulated.status.vertices_loaded, Some(989));
        assert_eq!(accumulated.workers, status.workers);
    }

    #[test]
    fn test_accumulate_replaced_slot_uses_newest_snapshot() {
        let mut status = ConductorStatus::new();
        status.update(
            worker(1),
            Status {
                time_stamp: ts(100),
                vertices_loaded: Some(10),
                ..Default::default()
            },
        );
        status.update(
            worker(1),
            Status {
                time_stamp: ts(200),
                vertices_loaded: Some(25),
                ..Default::default()
            },
        );

        let accumulated = status.accumulate();
        assert_eq!(accumulated.status.vertices_loaded, Some(25));
        assert_eq!(accumulated.workers.len(), 1);
    }

    #[test]
    fn test_accumulate_empty_map_yields_default() {
        let accumulated = ConductorStatus::new().accumulate();
        assert_eq!(accumulated.status, Status::default());
        assert!(accumulated.workers.is_empty());
    }

    #[test]
    fn test_status_absent_fields_are_omitted_on_the_wire() {
        let json = serde_json::to_value(Status {
            time_stamp: ts(0),
            vertices_loaded: Some(3),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(json["verticesLoaded"], 3);
        assert!(json.get("edgesLoaded").is_none());
        assert!(json.get("memoryBytesUsed").is_none());
    }

    #[test]
    fn test_message_round_trip() {
        let msg = ConductorMessage::SuperstepFinished {
            superstep: 3,
            active_vertices: 17,
            status: Status::now(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        let back: ConductorMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
        assert!(json.contains("activeVertices"));
    }

    #[test]
    fn test_status_accessor_on_messages() {
        assert!(ConductorMessage::GraphLoaded {
            status: Status::now()
        }
        .status()
        .is_some());
        assert!(ConductorMessage::CleanupFinished.status().is_none());
        assert!(ConductorMessage::Cancel.status().is_none());
    }

    #[test]
    fn test_config_defaults() {
        let config: ComputationConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.max_supersteps, DEFAULT_MAX_SUPERSTEPS);
    }
}
