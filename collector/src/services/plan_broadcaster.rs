//! Fan-out of plan snapshots to live observers

use crate::services::plan_tracer::models::PlanMessage;
use tokio::sync::broadcast;

pub struct PlanBroadcaster {
    sender: broadcast::Sender<PlanMessage>,
}

impl PlanBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish to every current subscriber; returns how many received it
    pub fn publish(&self, message: PlanMessage) -> usize {
        self.sender.send(message).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlanMessage> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
