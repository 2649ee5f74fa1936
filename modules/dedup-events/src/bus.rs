//! Per-job broadcast bus. Not durable — there is no backing store and no
//! replay across process restarts; this only fans an in-memory stream of
//! [`EventFrame`]s out to whoever is currently subscribed to a job, plus a
//! short-lived `item` replay buffer for subscribers that join late (§4.9).

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};

use crate::events::EventFrame;

const CHANNEL_CAPACITY: usize = 1024;

struct JobChannel {
    tx: broadcast::Sender<EventFrame>,
    /// Accepted `item` frames only (§8 L4) — replayed in order to late joiners.
    replay: Vec<EventFrame>,
}

/// Shared, cloneable handle to the process-wide bus. One `JobChannel` per
/// active (or recently-finished) job.
#[derive(Clone)]
pub struct Bus {
    jobs: Arc<RwLock<HashMap<String, JobChannel>>>,
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus {
    pub fn new() -> Self {
        Self {
            jobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a job so frames published to it have somewhere to land even
    /// before the first subscriber connects.
    pub async fn create_job(&self, job_id: &str) {
        let mut jobs = self.jobs.write().await;
        jobs.entry(job_id.to_string()).or_insert_with(|| JobChannel {
            tx: broadcast::channel(CHANNEL_CAPACITY).0,
            replay: Vec::new(),
        });
    }

    /// Publish a frame to every current subscriber of `job_id`. Best-effort
    /// and non-blocking: if nobody is listening, the send is simply dropped.
    /// A subscriber that is too slow to keep up loses the oldest buffered
    /// frames rather than stalling the producer (`broadcast`'s lag
    /// semantics) — the producer is never blocked by a subscriber.
    pub async fn publish(&self, job_id: &str, frame: EventFrame) {
        let mut jobs = self.jobs.write().await;
        let Some(channel) = jobs.get_mut(job_id) else {
            tracing::warn!(job_id, kind = frame.kind(), "publish to unknown job");
            return;
        };
        if frame.is_replayable() {
            channel.replay.push(frame.clone());
        }
        let _ = channel.tx.send(frame);
    }

    /// Subscribe to a job. The returned [`Subscription`] yields `connected`
    /// first, then the replay buffer, then live frames — matching the order
    /// the broadcast bus promises in §4.9 and the replay law in §8 (L4).
    pub async fn subscribe(&self, job_id: &str) -> Subscription {
        let mut jobs = self.jobs.write().await;
        let channel = jobs.entry(job_id.to_string()).or_insert_with(|| JobChannel {
            tx: broadcast::channel(CHANNEL_CAPACITY).0,
            replay: Vec::new(),
        });
        Subscription {
            connected_frame: Some(EventFrame::Connected {
                webset_id: job_id.to_string(),
            }),
            replay: channel.replay.clone().into(),
            rx: channel.tx.subscribe(),
        }
    }

    /// Drop a job's channel once its history has no more use for live
    /// delivery (history queries read persisted items instead).
    pub async fn remove_job(&self, job_id: &str) {
        self.jobs.write().await.remove(job_id);
    }
}

/// One subscriber's view of a job's event stream.
pub struct Subscription {
    connected_frame: Option<EventFrame>,
    replay: VecDeque<EventFrame>,
    rx: broadcast::Receiver<EventFrame>,
}

impl Subscription {
    /// Pull the next frame, in `connected → replay → live` order. Returns
    /// `None` once the job's channel has been dropped with no more frames
    /// pending.
    pub async fn recv(&mut self) -> Option<EventFrame> {
        if let Some(frame) = self.connected_frame.take() {
            return Some(frame);
        }
        if let Some(frame) = self.replay.pop_front() {
            return Some(frame);
        }
        loop {
            return match self.rx.recv().await {
                Ok(frame) => Some(frame),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "subscriber lagged, skipping buffered frames");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => None,
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dedup_common::Item;

    fn item_frame(id: &str) -> EventFrame {
        EventFrame::Item {
            item: Item {
                id: id.to_string(),
                url: None,
                name: None,
                title: None,
                source: None,
                properties: serde_json::Value::Null,
            },
        }
    }

    #[tokio::test]
    async fn subscriber_sees_connected_then_replay_then_live() {
        let bus = Bus::new();
        bus.create_job("job-1").await;
        bus.publish("job-1", item_frame("a")).await;

        let mut sub = bus.subscribe("job-1").await;
        bus.publish("job-1", item_frame("b")).await;

        assert!(matches!(sub.recv().await, Some(EventFrame::Connected { .. })));
        assert!(matches!(sub.recv().await, Some(EventFrame::Item { item }) if item.id == "a"));
        assert!(matches!(sub.recv().await, Some(EventFrame::Item { item }) if item.id == "b"));
    }

    #[tokio::test]
    async fn only_item_frames_are_replayed_to_late_subscribers() {
        let bus = Bus::new();
        bus.create_job("job-2").await;
        bus.publish("job-2", item_frame("a")).await;
        bus.publish(
            "job-2",
            EventFrame::Pending {
                tmp_id: "tmp-1".into(),
            },
        )
        .await;
        bus.publish(
            "job-2",
            EventFrame::Rejected {
                item: Item {
                    id: "b".into(),
                    url: None,
                    name: None,
                    title: None,
                    source: None,
                    properties: serde_json::Value::Null,
                },
                reason: dedup_common::RejectionReason::ExactMatch,
                details: "dup".into(),
                existing_item: Some("a".into()),
            },
        )
        .await;

        let mut sub = bus.subscribe("job-2").await;
        assert!(matches!(sub.recv().await, Some(EventFrame::Connected { .. })));
        assert!(matches!(sub.recv().await, Some(EventFrame::Item { item }) if item.id == "a"));
        // No pending/rejected frame is replayed — only the live stream going forward.
    }

    #[tokio::test]
    async fn publish_to_unknown_job_does_not_panic() {
        let bus = Bus::new();
        bus.publish("ghost", item_frame("a")).await;
    }
}
