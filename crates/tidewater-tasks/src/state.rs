//! Node-local state mutated by tasks.
//!
//! Only the queue executor writes to this state, so the methods here take
//! `&mut self` and do no locking of their own. Every mutating method checks
//! its preconditions before changing anything; a failed call leaves the
//! state as it was, except where documented.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use tide_core::{ChannelName, CollectionId, PartitionId, SegmentId};

use crate::error::{TaskError, TaskResult};

/// A sealed segment held in memory by this node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentInfo {
    pub segment_id: SegmentId,
    pub collection_id: CollectionId,
    pub partition_id: PartitionId,
    pub num_rows: u64,
    pub mem_size: u64,
}

/// A DM channel this node consumes, with its stream subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedChannel {
    pub collection_id: CollectionId,
    pub subscription: String,
}

/// Search requests consumed and results produced for one collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryChannel {
    pub request_channel: ChannelName,
    pub result_channel: ChannelName,
    pub subscription: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeState {
    /// collection → loaded partitions.
    collections: BTreeMap<CollectionId, BTreeSet<PartitionId>>,
    segments: BTreeMap<SegmentId, SegmentInfo>,
    channels: BTreeMap<ChannelName, WatchedChannel>,
    query_channels: BTreeMap<CollectionId, QueryChannel>,
    loaded_mem_bytes: u64,
}

impl NodeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_collection(&self, collection_id: CollectionId) -> bool {
        self.collections.contains_key(&collection_id)
    }

    pub fn collection_ids(&self) -> Vec<CollectionId> {
        self.collections.keys().copied().collect()
    }

    pub fn partition_ids(&self, collection_id: CollectionId) -> Vec<PartitionId> {
        self.collections
            .get(&collection_id)
            .map(|parts| parts.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn segment(&self, segment_id: SegmentId) -> Option<&SegmentInfo> {
        self.segments.get(&segment_id)
    }

    /// Known segments among `ids`, in request order. Unknown ids are skipped.
    pub fn segment_info(&self, ids: &[SegmentId]) -> Vec<SegmentInfo> {
        ids.iter()
            .filter_map(|id| self.segments.get(id).cloned())
            .collect()
    }

    pub fn watched_channel(&self, channel: &str) -> Option<&WatchedChannel> {
        self.channels.get(channel)
    }

    pub fn watched_channels(&self) -> Vec<ChannelName> {
        self.channels.keys().cloned().collect()
    }

    pub fn query_channel(&self, collection_id: CollectionId) -> Option<&QueryChannel> {
        self.query_channels.get(&collection_id)
    }

    /// Total `mem_size` of loaded segments.
    pub fn loaded_mem_bytes(&self) -> u64 {
        self.loaded_mem_bytes
    }

    /// Start consuming `channels` for a collection.
    ///
    /// All channels share the subscription `{prefix}-{collection_id}`.
    pub fn watch_channels(
        &mut self,
        collection_id: CollectionId,
        channels: &[ChannelName],
        subscription_prefix: &str,
    ) -> TaskResult<()> {
        if let Some(taken) = channels.iter().find(|c| self.channels.contains_key(*c)) {
            return Err(TaskError::ChannelAlreadyWatched(taken.clone()));
        }

        let subscription = format!("{subscription_prefix}-{collection_id}");
        self.collections.entry(collection_id).or_default();
        for channel in channels {
            self.channels.insert(
                channel.clone(),
                WatchedChannel {
                    collection_id,
                    subscription: subscription.clone(),
                },
            );
        }
        Ok(())
    }

    /// Attach a search request/result channel pair to a collection. A
    /// collection has at most one pair.
    pub fn add_query_channel(
        &mut self,
        collection_id: CollectionId,
        request_channel: &str,
        result_channel: &str,
        subscription_prefix: &str,
    ) -> TaskResult<()> {
        if self.query_channels.contains_key(&collection_id) {
            return Err(TaskError::QueryChannelExists(collection_id));
        }
        self.query_channels.insert(
            collection_id,
            QueryChannel {
                request_channel: request_channel.to_string(),
                result_channel: result_channel.to_string(),
                subscription: format!("{subscription_prefix}-query-{collection_id}"),
            },
        );
        Ok(())
    }

    /// Detach a collection's query channels. Both names must match the
    /// attached pair.
    pub fn remove_query_channel(
        &mut self,
        collection_id: CollectionId,
        request_channel: &str,
        result_channel: &str,
    ) -> TaskResult<()> {
        let attached = self.query_channels.get(&collection_id).is_some_and(|q| {
            q.request_channel == request_channel && q.result_channel == result_channel
        });
        if !attached {
            return Err(TaskError::QueryChannelNotFound(collection_id));
        }
        self.query_channels.remove(&collection_id);
        Ok(())
    }

    /// Load segments, creating their collection and partitions on demand.
    ///
    /// An id that is already loaded, or listed twice, fails the whole call.
    pub fn load_segments(
        &mut self,
        collection_id: CollectionId,
        segments: &[SegmentInfo],
    ) -> TaskResult<()> {
        let mut seen = BTreeSet::new();
        if let Some(dup) = segments
            .iter()
            .find(|s| self.segments.contains_key(&s.segment_id) || !seen.insert(s.segment_id))
        {
            return Err(TaskError::SegmentAlreadyLoaded(dup.segment_id));
        }

        let partitions = self.collections.entry(collection_id).or_default();
        for segment in segments {
            partitions.insert(segment.partition_id);
            self.loaded_mem_bytes += segment.mem_size;
            self.segments.insert(segment.segment_id, segment.clone());
        }
        Ok(())
    }

    /// Drop a collection with its segments, watched channels and query
    /// channels.
    pub fn release_collection(&mut self, collection_id: CollectionId) -> TaskResult<()> {
        if self.collections.remove(&collection_id).is_none() {
            return Err(TaskError::CollectionNotFound(collection_id));
        }
        self.drop_segments_where(|s| s.collection_id == collection_id);
        self.channels.retain(|_, w| w.collection_id != collection_id);
        self.query_channels.remove(&collection_id);
        Ok(())
    }

    /// Drop the listed partitions of a collection. Unknown partitions are
    /// ignored.
    pub fn release_partitions(
        &mut self,
        collection_id: CollectionId,
        partition_ids: &[PartitionId],
    ) -> TaskResult<()> {
        let partitions = self
            .collections
            .get_mut(&collection_id)
            .ok_or(TaskError::CollectionNotFound(collection_id))?;
        for id in partition_ids {
            partitions.remove(id);
        }
        self.drop_segments_where(|s| {
            s.collection_id == collection_id && partition_ids.contains(&s.partition_id)
        });
        Ok(())
    }

    /// Drop the listed segments.
    ///
    /// Segments that exist are released even when some ids are unknown;
    /// the first unknown id is then reported.
    pub fn release_segments(&mut self, segment_ids: &[SegmentId]) -> TaskResult<()> {
        let mut missing = None;
        for id in segment_ids {
            match self.segments.remove(id) {
                Some(segment) => {
                    self.loaded_mem_bytes = self.loaded_mem_bytes.saturating_sub(segment.mem_size);
                }
                None => {
                    missing.get_or_insert(*id);
                }
            }
        }
        match missing {
            Some(id) => Err(TaskError::SegmentNotFound(id)),
            None => Ok(()),
        }
    }

    fn drop_segments_where(&mut self, pred: impl Fn(&SegmentInfo) -> bool) {
        let mut freed = 0;
        self.segments.retain(|_, s| {
            if pred(s) {
                freed += s.mem_size;
                false
            } else {
                true
            }
        });
        self.loaded_mem_bytes = self.loaded_mem_bytes.saturating_sub(freed);
    }
}
