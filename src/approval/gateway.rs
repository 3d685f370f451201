// ABOUTME: Approval gateway tracking pending decisions per run.
// ABOUTME: Sends prompts, resolves decide() calls, and applies the optional timeout.

use nonempty::NonEmpty;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

use super::{ApprovalPrompt, Notifier, NotifyError};
use crate::events::Decision;
use crate::types::{DistributionId, HeaderPredicate, RunId, ServiceName};

/// How a pending approval ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalOutcome {
    Accepted,
    Rejected,
    /// The approval timeout elapsed; handled as a rejection.
    Expired,
}

impl ApprovalOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, ApprovalOutcome::Accepted)
    }
}

/// Result of a `decide` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecideResult {
    Delivered,
    /// The run was already decided; the repeat was ignored.
    Duplicate,
}

/// Decided runs remembered for duplicate detection.
const DECISIONS_RETAINED: usize = 1024;

/// Most recent decisions, oldest evicted first.
struct DecisionLog {
    limit: usize,
    order: VecDeque<RunId>,
    decisions: HashMap<RunId, Decision>,
}

impl DecisionLog {
    fn new(limit: usize) -> Self {
        Self {
            limit,
            order: VecDeque::new(),
            decisions: HashMap::new(),
        }
    }

    fn record(&mut self, run_id: &RunId, decision: Decision) {
        if self.decisions.insert(run_id.clone(), decision).is_none() {
            self.order.push_back(run_id.clone());
        }
        while self.order.len() > self.limit {
            if let Some(oldest) = self.order.pop_front() {
                self.decisions.remove(&oldest);
            }
        }
    }

    fn get(&self, run_id: &RunId) -> Option<Decision> {
        self.decisions.get(run_id).copied()
    }
}

struct Inner {
    pending: Mutex<HashMap<RunId, oneshot::Sender<Decision>>>,
    decided: Mutex<DecisionLog>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            pending: Mutex::default(),
            decided: Mutex::new(DecisionLog::new(DECISIONS_RETAINED)),
        }
    }
}

impl Inner {
    fn settle(&self, run_id: &RunId, decision: Decision) -> Option<oneshot::Sender<Decision>> {
        let sender = self.pending.lock().remove(run_id);
        if sender.is_some() {
            self.decided.lock().record(run_id, decision);
        }
        sender
    }
}

/// Delivers approval prompts and routes decisions back to waiting runs.
#[derive(Clone)]
pub struct ApprovalGateway {
    notifier: Arc<dyn Notifier>,
    console_url: String,
    recipients: NonEmpty<String>,
    timeout: Option<Duration>,
    inner: Arc<Inner>,
}

impl std::fmt::Debug for ApprovalGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApprovalGateway")
            .field("console_url", &self.console_url)
            .field("recipients", &self.recipients)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ApprovalGateway {
    pub fn new(
        notifier: Arc<dyn Notifier>,
        console_url: impl Into<String>,
        recipients: NonEmpty<String>,
    ) -> Self {
        Self {
            notifier,
            console_url: console_url.into(),
            recipients,
            timeout: None,
            inner: Arc::default(),
        }
    }

    /// Treat an approval still open after `timeout` as rejected.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the prompt for a run whose staging is ready.
    pub fn prompt(
        &self,
        run_id: &RunId,
        service: &ServiceName,
        staging: &DistributionId,
        predicate: &HeaderPredicate,
    ) -> ApprovalPrompt {
        ApprovalPrompt {
            run_id: run_id.clone(),
            service: service.clone(),
            link: format!(
                "{}{}",
                self.console_url,
                urlencoding::encode(staging.as_str())
            ),
            instructions: format!(
                "Send requests with header '{}: {}' to reach staging distribution {staging}, \
                 then accept or reject run {run_id}.",
                predicate.header(),
                predicate.value(),
            ),
            recipients: self.recipients.clone(),
        }
    }

    /// Register the run as awaiting a decision and deliver the prompt.
    pub async fn request(&self, prompt: ApprovalPrompt) -> Result<PendingApproval, NotifyError> {
        let run_id = prompt.run_id.clone();
        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self.inner.pending.lock();
            if pending.contains_key(&run_id) {
                return Err(NotifyError::AlreadyPending(run_id));
            }
            pending.insert(run_id.clone(), tx);
        }

        if let Err(e) = self.notifier.notify(&prompt).await {
            self.inner.pending.lock().remove(&run_id);
            return Err(e);
        }

        tracing::info!(run_id = %run_id, link = %prompt.link, "approval requested");
        Ok(PendingApproval {
            run_id,
            rx,
            timeout: self.timeout,
            inner: self.inner.clone(),
        })
    }

    /// Resolve the pending approval for `run_id`.
    pub fn decide(&self, run_id: &RunId, decision: Decision) -> Result<DecideResult, NotifyError> {
        if let Some(sender) = self.inner.settle(run_id, decision) {
            // The waiter may be gone already; the decision is recorded either way.
            let _ = sender.send(decision);
            tracing::info!(run_id = %run_id, %decision, "approval decided");
            return Ok(DecideResult::Delivered);
        }

        if let Some(first) = self.inner.decided.lock().get(run_id) {
            tracing::debug!(
                run_id = %run_id,
                %decision,
                first = %first,
                "duplicate decision ignored"
            );
            return Ok(DecideResult::Duplicate);
        }

        Err(NotifyError::UnknownRun(run_id.clone()))
    }

    /// Whether `run_id` is waiting for a decision.
    pub fn is_pending(&self, run_id: &RunId) -> bool {
        self.inner.pending.lock().contains_key(run_id)
    }
}

/// A run suspended at Approve.
#[must_use = "a pending approval must be awaited"]
pub struct PendingApproval {
    run_id: RunId,
    rx: oneshot::Receiver<Decision>,
    timeout: Option<Duration>,
    inner: Arc<Inner>,
}

impl std::fmt::Debug for PendingApproval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingApproval")
            .field("run_id", &self.run_id)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl PendingApproval {
    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Suspend until a decision arrives or the timeout elapses.
    pub async fn wait(self) -> ApprovalOutcome {
        let PendingApproval {
            run_id,
            rx,
            timeout,
            inner,
        } = self;

        let received = match timeout {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(received) => received,
                Err(_) => {
                    // A decide() racing the deadline wins if it settled first.
                    if inner.settle(&run_id, Decision::Reject).is_some() {
                        tracing::warn!(run_id = %run_id, "approval timed out, rejecting");
                        return ApprovalOutcome::Expired;
                    }
                    return match inner.decided.lock().get(&run_id) {
                        Some(Decision::Accept) => ApprovalOutcome::Accepted,
                        _ => ApprovalOutcome::Rejected,
                    };
                }
            },
            None => rx.await,
        };

        match received {
            Ok(Decision::Accept) => ApprovalOutcome::Accepted,
            Ok(Decision::Reject) => ApprovalOutcome::Rejected,
            // Sender dropped without a decision: nobody can approve any more.
            Err(_) => ApprovalOutcome::Rejected,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::MemoryNotifier;
    use nonempty::nonempty;

    fn gateway(notifier: Arc<MemoryNotifier>) -> ApprovalGateway {
        ApprovalGateway::new(
            notifier,
            "https://console.example.com/distributions/",
            nonempty!["ops@example.com".to_string()],
        )
    }

    fn prompt(gateway: &ApprovalGateway, run: &str) -> ApprovalPrompt {
        gateway.prompt(
            &RunId::new(run),
            &ServiceName::new("shop").unwrap(),
            &DistributionId::new("ESTAGE 1"),
            &HeaderPredicate::default(),
        )
    }

    #[test]
    fn link_encodes_distribution_id() {
        let gateway = gateway(Arc::new(MemoryNotifier::new()));
        let prompt = prompt(&gateway, "run-1");
        assert_eq!(
            prompt.link,
            "https://console.example.com/distributions/ESTAGE%201"
        );
        assert!(prompt.instructions.contains("aws-cf-cd-staging: true"));
    }

    #[tokio::test]
    async fn unknown_run_is_an_error() {
        let gateway = gateway(Arc::new(MemoryNotifier::new()));
        let err = gateway
            .decide(&RunId::new("nope"), Decision::Accept)
            .unwrap_err();
        assert!(matches!(err, NotifyError::UnknownRun(_)));
    }

    #[tokio::test]
    async fn repeated_decision_is_ignored() {
        let notifier = Arc::new(MemoryNotifier::new());
        let gateway = gateway(notifier.clone());
        let pending = gateway.request(prompt(&gateway, "run-1")).await.unwrap();
        assert_eq!(notifier.prompts().len(), 1);

        let run = RunId::new("run-1");
        assert_eq!(
            gateway.decide(&run, Decision::Accept).unwrap(),
            DecideResult::Delivered
        );
        assert_eq!(
            gateway.decide(&run, Decision::Reject).unwrap(),
            DecideResult::Duplicate
        );
        assert_eq!(pending.wait().await, ApprovalOutcome::Accepted);
    }

    #[test]
    fn decision_log_forgets_the_oldest_runs() {
        let mut log = DecisionLog::new(2);
        let runs: Vec<RunId> = (1..=3).map(|n| RunId::new(format!("run-{n}"))).collect();
        for run in &runs {
            log.record(run, Decision::Reject);
        }
        log.record(&runs[2], Decision::Accept);

        assert_eq!(log.get(&runs[0]), None);
        assert_eq!(log.get(&runs[1]), Some(Decision::Reject));
        assert_eq!(log.get(&runs[2]), Some(Decision::Accept));
        assert_eq!(log.order.len(), 2);
    }

    #[tokio::test]
    async fn settled_runs_stay_bounded() {
        let gateway = gateway(Arc::new(MemoryNotifier::new()));
        for n in 0..DECISIONS_RETAINED + 5 {
            let run = format!("run-{n}");
            let _pending = gateway.request(prompt(&gateway, &run)).await.unwrap();
            gateway.decide(&RunId::new(&run), Decision::Reject).unwrap();
        }
        assert_eq!(gateway.inner.decided.lock().order.len(), DECISIONS_RETAINED);
        assert!(gateway.inner.pending.lock().is_empty());
    }

    #[tokio::test]
    async fn timeout_expires_as_rejection() {
        let gateway = gateway(Arc::new(MemoryNotifier::new()))
            .with_timeout(Some(Duration::from_millis(50)));
        let pending = gateway.request(prompt(&gateway, "run-2")).await.unwrap();

        assert_eq!(pending.wait().await, ApprovalOutcome::Expired);
        assert_eq!(
            gateway
                .decide(&RunId::new("run-2"), Decision::Accept)
                .unwrap(),
            DecideResult::Duplicate
        );
    }
}
