//! Control operations accepted by the task queue.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use tide_core::{ChannelName, CollectionId, PartitionId, SegmentId};

use crate::error::{TaskError, TaskResult};
use crate::metrics::TaskMetrics;
use crate::queue::QueueConfig;
use crate::state::{NodeState, SegmentInfo};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchChannelsRequest {
    pub collection_id: CollectionId,
    pub channels: Vec<ChannelName>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadSegmentsRequest {
    pub collection_id: CollectionId,
    pub segments: Vec<SegmentInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseCollectionRequest {
    pub collection_id: CollectionId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleasePartitionsRequest {
    pub collection_id: CollectionId,
    pub partition_ids: Vec<PartitionId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseSegmentsRequest {
    pub segment_ids: Vec<SegmentId>,
}

/// Search request and result channels of a collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddQueryChannelRequest {
    pub collection_id: CollectionId,
    pub request_channel: ChannelName,
    pub result_channel: ChannelName,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveQueryChannelRequest {
    pub collection_id: CollectionId,
    pub request_channel: ChannelName,
    pub result_channel: ChannelName,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    WatchChannels,
    LoadSegments,
    ReleaseCollection,
    ReleasePartitions,
    ReleaseSegments,
    AddQueryChannel,
    RemoveQueryChannel,
}

impl TaskKind {
    pub const ALL: [TaskKind; 7] = [
        TaskKind::WatchChannels,
        TaskKind::LoadSegments,
        TaskKind::ReleaseCollection,
        TaskKind::ReleasePartitions,
        TaskKind::ReleaseSegments,
        TaskKind::AddQueryChannel,
        TaskKind::RemoveQueryChannel,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::WatchChannels => "watch_channels",
            TaskKind::LoadSegments => "load_segments",
            TaskKind::ReleaseCollection => "release_collection",
            TaskKind::ReleasePartitions => "release_partitions",
            TaskKind::ReleaseSegments => "release_segments",
            TaskKind::AddQueryChannel => "add_query_channel",
            TaskKind::RemoveQueryChannel => "remove_query_channel",
        }
    }

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a task sits in submission order, and when it must be answered by.
#[derive(Debug, Clone)]
pub struct TaskContext {
    /// Position in submission order; the task's identity.
    pub seq: u64,
    pub created_at: Instant,
    pub deadline: Option<Instant>,
}

impl TaskContext {
    pub fn new(seq: u64, timeout: Option<Duration>) -> Self {
        let created_at = Instant::now();
        Self {
            seq,
            created_at,
            deadline: timeout.map(|t| created_at + t),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// One queued control operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeTask {
    WatchChannels(WatchChannelsRequest),
    LoadSegments(LoadSegmentsRequest),
    ReleaseCollection(ReleaseCollectionRequest),
    ReleasePartitions(ReleasePartitionsRequest),
    ReleaseSegments(ReleaseSegmentsRequest),
    AddQueryChannel(AddQueryChannelRequest),
    RemoveQueryChannel(RemoveQueryChannelRequest),
}

impl NodeTask {
    pub fn kind(&self) -> TaskKind {
        match self {
            NodeTask::WatchChannels(_) => TaskKind::WatchChannels,
            NodeTask::LoadSegments(_) => TaskKind::LoadSegments,
            NodeTask::ReleaseCollection(_) => TaskKind::ReleaseCollection,
            NodeTask::ReleasePartitions(_) => TaskKind::ReleasePartitions,
            NodeTask::ReleaseSegments(_) => TaskKind::ReleaseSegments,
            NodeTask::AddQueryChannel(_) => TaskKind::AddQueryChannel,
            NodeTask::RemoveQueryChannel(_) => TaskKind::RemoveQueryChannel,
        }
    }

    /// Check the request shape. Touches no state.
    pub fn validate(&self) -> TaskResult<()> {
        match self {
            NodeTask::WatchChannels(req) => {
                if req.channels.is_empty() {
                    return invalid("no channels to watch");
                }
                if req.channels.iter().any(|c| c.is_empty()) {
                    return invalid("empty channel name");
                }
                let mut names: Vec<_> = req.channels.iter().collect();
                names.sort();
                names.dedup();
                if names.len() != req.channels.len() {
                    return invalid("duplicate channel in request");
                }
            }
            NodeTask::LoadSegments(req) => {
                if req.segments.is_empty() {
                    return invalid("no segments to load");
                }
                if let Some(s) = req
                    .segments
                    .iter()
                    .find(|s| s.collection_id != req.collection_id)
                {
                    return invalid(format!(
                        "segment {} belongs to collection {}, not {}",
                        s.segment_id, s.collection_id, req.collection_id
                    ));
                }
                let mut ids: Vec<_> = req.segments.iter().map(|s| s.segment_id).collect();
                ids.sort_unstable();
                if let Some(pair) = ids.windows(2).find(|w| w[0] == w[1]) {
                    return invalid(format!("segment {} listed twice", pair[0]));
                }
            }
            NodeTask::ReleaseCollection(req) => check_collection_id(req.collection_id)?,
            NodeTask::ReleasePartitions(req) => {
                check_collection_id(req.collection_id)?;
                if req.partition_ids.is_empty() {
                    return invalid("no partitions to release");
                }
            }
            NodeTask::ReleaseSegments(req) => {
                if req.segment_ids.is_empty() {
                    return invalid("no segments to release");
                }
            }
            NodeTask::AddQueryChannel(AddQueryChannelRequest {
                collection_id,
                request_channel,
                result_channel,
            })
            | NodeTask::RemoveQueryChannel(RemoveQueryChannelRequest {
                collection_id,
                request_channel,
                result_channel,
            }) => {
                check_collection_id(*collection_id)?;
                if request_channel.is_empty() || result_channel.is_empty() {
                    return invalid("empty query channel name");
                }
                if request_channel == result_channel {
                    return invalid("request and result channels must differ");
                }
            }
        }
        Ok(())
    }

    /// Apply the operation to node state.
    pub fn execute(&self, state: &mut NodeState, config: &QueueConfig) -> TaskResult<()> {
        match self {
            NodeTask::WatchChannels(req) => state.watch_channels(
                req.collection_id,
                &req.channels,
                &config.subscription_prefix,
            ),
            NodeTask::LoadSegments(req) => state.load_segments(req.collection_id, &req.segments),
            NodeTask::ReleaseCollection(req) => state.release_collection(req.collection_id),
            NodeTask::ReleasePartitions(req) => {
                state.release_partitions(req.collection_id, &req.partition_ids)
            }
            NodeTask::ReleaseSegments(req) => state.release_segments(&req.segment_ids),
            NodeTask::AddQueryChannel(req) => state.add_query_channel(
                req.collection_id,
                &req.request_channel,
                &req.result_channel,
                &config.subscription_prefix,
            ),
            NodeTask::RemoveQueryChannel(req) => state.remove_query_channel(
                req.collection_id,
                &req.request_channel,
                &req.result_channel,
            ),
        }
    }

    /// Post-execution hook. Records the outcome; never fails.
    pub fn notify(&self, ctx: &TaskContext, result: &TaskResult<()>, metrics: &TaskMetrics) {
        let kind = self.kind();
        metrics.record(kind, result);
        match result {
            Ok(()) => debug!(seq = ctx.seq, %kind, elapsed = ?ctx.created_at.elapsed(), "task completed"),
            Err(e) => warn!(seq = ctx.seq, %kind, error = %e, "task failed"),
        }
    }
}

fn invalid<T>(reason: impl Into<String>) -> TaskResult<T> {
    Err(TaskError::Validation(reason.into()))
}

fn check_collection_id(id: CollectionId) -> TaskResult<()> {
    if id <= 0 {
        return invalid(format!("collection id must be positive, got {id}"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(segment_id: SegmentId, collection_id: CollectionId) -> SegmentInfo {
        SegmentInfo {
            segment_id,
            collection_id,
            partition_id: 1,
            num_rows: 10,
            mem_size: 1,
        }
    }

    #[test]
    fn watch_channels_validation() {
        let ok = NodeTask::WatchChannels(WatchChannelsRequest {
            collection_id: 1,
            channels: vec!["dml_0".into()],
        });
        assert!(ok.validate().is_ok());

        for channels in [vec![], vec!["".to_string()], vec!["a".into(), "a".into()]] {
            let task = NodeTask::WatchChannels(WatchChannelsRequest {
                collection_id: 1,
                channels,
            });
            assert!(matches!(task.validate(), Err(TaskError::Validation(_))));
        }
    }

    #[test]
    fn load_segments_must_match_collection() {
        let task = NodeTask::LoadSegments(LoadSegmentsRequest {
            collection_id: 1,
            segments: vec![segment(10, 1), segment(11, 2)],
        });
        let err = task.validate().unwrap_err();
        assert!(err.to_string().contains("segment 11 belongs to collection 2"));
    }

    #[test]
    fn load_segments_rejects_repeated_ids() {
        let task = NodeTask::LoadSegments(LoadSegmentsRequest {
            collection_id: 1,
            segments: vec![segment(10, 1), segment(11, 1), segment(10, 1)],
        });
        let err = task.validate().unwrap_err();
        assert_eq!(err, TaskError::Validation("segment 10 listed twice".into()));

        let mut state = NodeState::new();
        let config = QueueConfig::default();
        assert!(task.validate().and_then(|()| task.execute(&mut state, &config)).is_err());
        assert_eq!(state.loaded_mem_bytes(), 0);
    }

    #[test]
    fn release_requests_need_targets() {
        let bad = [
            NodeTask::ReleaseCollection(ReleaseCollectionRequest { collection_id: 0 }),
            NodeTask::ReleasePartitions(ReleasePartitionsRequest {
                collection_id: 1,
                partition_ids: vec![],
            }),
            NodeTask::ReleaseSegments(ReleaseSegmentsRequest { segment_ids: vec![] }),
        ];
        for task in bad {
            assert!(task.validate().is_err(), "{:?} should be rejected", task.kind());
        }
    }

    #[test]
    fn query_channel_validation() {
        let add = |request: &str, result: &str| {
            NodeTask::AddQueryChannel(AddQueryChannelRequest {
                collection_id: 1,
                request_channel: request.into(),
                result_channel: result.into(),
            })
        };
        assert!(add("search-1", "search-result-1").validate().is_ok());
        for task in [add("", "r"), add("q", ""), add("same", "same")] {
            assert!(matches!(task.validate(), Err(TaskError::Validation(_))));
        }

        let remove = NodeTask::RemoveQueryChannel(RemoveQueryChannelRequest {
            collection_id: -1,
            request_channel: "search-1".into(),
            result_channel: "search-result-1".into(),
        });
        assert!(remove.validate().is_err());
        assert_eq!(remove.kind().to_string(), "remove_query_channel");
    }

    #[test]
    fn kind_names_are_snake_case() {
        assert_eq!(TaskKind::ReleasePartitions.to_string(), "release_partitions");
        assert_eq!(
            serde_json::to_string(&TaskKind::WatchChannels).unwrap(),
            "\"watch_channels\""
        );
        for (i, kind) in TaskKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn context_deadline() {
        let ctx = TaskContext::new(0, Some(Duration::from_millis(10)));
        assert!(!ctx.is_expired());
        tokio::time::advance(Duration::from_millis(10)).await;
        assert!(ctx.is_expired());
        assert!(!TaskContext::new(1, None).is_expired());
    }
}
