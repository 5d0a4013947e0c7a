use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio::sync::{oneshot, Mutex};
use tracing::info;

use switchyard_core::error::{Result, SwitchyardError};
use switchyard_core::event::EventBus;
use switchyard_core::traits::Approver;
use switchyard_core::types::{ApprovalDecision, ApprovalRequest, RunEvent};

type PendingMap = HashMap<String, (ApprovalRequest, oneshot::Sender<ApprovalDecision>)>;

/// Manages pending approval requests with oneshot channels.
///
/// A node awaiting [`Approver::request`] stays suspended until someone calls
/// [`respond`](ApprovalBroker::respond) with the request id. If the node stops
/// waiting first (timeout or cancel), its entry is withdrawn.
pub struct ApprovalBroker {
    pending: Mutex<PendingMap>,
    event_bus: Arc<EventBus>,
}

/// Withdraws a request from the pending map when its waiter goes away.
struct Withdraw<'a> {
    pending: &'a Mutex<PendingMap>,
    id: String,
}

impl Drop for Withdraw<'_> {
    fn drop(&mut self) {
        // Contended lock: the closed sender is pruned on the next access instead.
        if let Ok(mut pending) = self.pending.try_lock() {
            pending.remove(&self.id);
        }
    }
}

impl ApprovalBroker {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            event_bus,
        }
    }

    /// Register a request, publish it, and return the receiver to await.
    pub async fn submit(&self, req: ApprovalRequest) -> oneshot::Receiver<ApprovalDecision> {
        let (tx, rx) = oneshot::channel();
        let id = req.id.clone();

        // Insert before publishing so a fast responder always finds the entry.
        {
            let mut pending = self.pending.lock().await;
            pending.retain(|_, (_, sender)| !sender.is_closed());
            pending.insert(id, (req.clone(), tx));
        }
        self.event_bus.publish(RunEvent::ApprovalRequested { request: req });
        rx
    }

    /// Resolve a pending request. Returns true if it was still waiting.
    pub async fn respond(&self, request_id: &str, decision: ApprovalDecision) -> bool {
        let entry = self.pending.lock().await.remove(request_id);
        match entry {
            Some((_req, tx)) if !tx.is_closed() => {
                let approved = matches!(decision, ApprovalDecision::Approved);
                self.event_bus.publish(RunEvent::ApprovalResolved {
                    request_id: request_id.to_string(),
                    approved,
                });
                tx.send(decision).is_ok()
            }
            _ => false,
        }
    }

    /// Requests still waiting for an answer. Abandoned ones are dropped.
    pub async fn pending_requests(&self) -> Vec<ApprovalRequest> {
        let mut pending = self.pending.lock().await;
        pending.retain(|_, (_, tx)| !tx.is_closed());
        pending.values().map(|(req, _)| req.clone()).collect()
    }

    /// Find a pending request by prefix match on the ID.
    pub async fn find_by_prefix(&self, prefix: &str) -> Option<String> {
        self.pending
            .lock()
            .await
            .iter()
            .find(|(key, (_, tx))| key.starts_with(prefix) && !tx.is_closed())
            .map(|(key, _)| key.clone())
    }
}

impl Approver for ApprovalBroker {
    fn request(&self, request: ApprovalRequest) -> BoxFuture<'_, Result<ApprovalDecision>> {
        Box::pin(async move {
            let subject = request.subject.clone();
            let id = request.id.clone();
            let rx = self.submit(request).await;
            let _withdraw = Withdraw {
                pending: &self.pending,
                id,
            };
            rx.await.map_err(|_| {
                SwitchyardError::node(format!("approval request for {subject} was dropped"))
            })
        })
    }
}

/// Answers every request with a fixed decision, optionally after a delay.
/// Stands in for a manager clicking the button.
pub struct AutoApprover {
    decision: ApprovalDecision,
    delay: Duration,
}

impl AutoApprover {
    pub fn approve() -> Self {
        Self {
            decision: ApprovalDecision::Approved,
            delay: Duration::ZERO,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            decision: ApprovalDecision::Denied {
                reason: reason.into(),
            },
            delay: Duration::ZERO,
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl Approver for AutoApprover {
    fn request(&self, request: ApprovalRequest) -> BoxFuture<'_, Result<ApprovalDecision>> {
        Box::pin(async move {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            info!(
                subject = %request.subject,
                approved = matches!(self.decision, ApprovalDecision::Approved),
                "Simulated manager decision"
            );
            Ok(self.decision.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_core::types::RunId;

    fn test_request(subject: &str) -> ApprovalRequest {
        ApprovalRequest::new(subject, "Team dinner, $150", &RunId::from_string("run-1"))
    }

    #[tokio::test]
    async fn respond_approve() {
        let broker = ApprovalBroker::new(Arc::new(EventBus::default()));
        let req = test_request("dinner");
        let id = req.id.clone();

        let rx = broker.submit(req).await;
        assert!(broker.respond(&id, ApprovalDecision::Approved).await);
        assert_eq!(rx.await.unwrap(), ApprovalDecision::Approved);
    }

    #[tokio::test]
    async fn respond_deny() {
        let broker = ApprovalBroker::new(Arc::new(EventBus::default()));
        let req = test_request("laptop");
        let id = req.id.clone();

        let rx = broker.submit(req).await;
        let denied = ApprovalDecision::Denied {
            reason: "over budget".into(),
        };
        assert!(broker.respond(&id, denied.clone()).await);
        assert_eq!(rx.await.unwrap(), denied);
    }

    #[tokio::test]
    async fn respond_unknown_id() {
        let broker = ApprovalBroker::new(Arc::new(EventBus::default()));
        assert!(!broker.respond("missing", ApprovalDecision::Approved).await);
    }

    #[tokio::test]
    async fn abandoned_requests_are_pruned() {
        let broker = ApprovalBroker::new(Arc::new(EventBus::default()));
        let kept = broker.submit(test_request("a")).await;
        let dropped = broker.submit(test_request("b")).await;
        drop(dropped);

        let pending = broker.pending_requests().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].subject, "a");
        drop(kept);
    }

    #[tokio::test]
    async fn prefix_lookup() {
        let broker = ApprovalBroker::new(Arc::new(EventBus::default()));
        let req = test_request("coffee");
        let id = req.id.clone();
        let _rx = broker.submit(req).await;
        assert_eq!(broker.find_by_prefix(&id[..8]).await, Some(id));
        assert_eq!(broker.find_by_prefix("zzzz-not-a-uuid").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_request_is_withdrawn() {
        let broker = ApprovalBroker::new(Arc::new(EventBus::default()));
        let wait = broker.request(test_request("dinner"));
        let gave_up = tokio::time::timeout(Duration::from_millis(10), wait).await;

        assert!(gave_up.is_err());
        assert_eq!(broker.find_by_prefix("").await, None);
        assert!(broker.pending_requests().await.is_empty());
    }

    #[tokio::test]
    async fn closed_entries_are_invisible_to_prefix_lookup() {
        let broker = ApprovalBroker::new(Arc::new(EventBus::default()));
        let req = test_request("taxi");
        let id = req.id.clone();
        drop(broker.submit(req).await);

        assert_eq!(broker.find_by_prefix(&id[..8]).await, None);
        assert!(!broker.respond(&id, ApprovalDecision::Approved).await);
    }

    #[tokio::test]
    async fn approver_trait_waits_for_response() {
        let bus = Arc::new(EventBus::default());
        let mut events = bus.subscribe();
        let broker = Arc::new(ApprovalBroker::new(bus));

        let responder = broker.clone();
        let answer = tokio::spawn(async move {
            let id = match events.recv().await.unwrap() {
                RunEvent::ApprovalRequested { request } => request.id,
                other => panic!("unexpected event: {other:?}"),
            };
            responder.respond(&id, ApprovalDecision::Approved).await
        });

        let decision = broker.request(test_request("dinner")).await.unwrap();
        assert_eq!(decision, ApprovalDecision::Approved);
        assert!(answer.await.unwrap());
    }

    #[tokio::test]
    async fn auto_approver_returns_fixed_decision() {
        let yes = AutoApprover::approve();
        assert_eq!(
            yes.request(test_request("x")).await.unwrap(),
            ApprovalDecision::Approved
        );
        let no = AutoApprover::deny("nope");
        assert!(matches!(
            no.request(test_request("x")).await.unwrap(),
            ApprovalDecision::Denied { .. }
        ));
    }
}
