// ABOUTME: Notifier implementations delivering approval prompts.
// ABOUTME: Tracing-based delivery for the CLI and a recording notifier for tests.

use async_trait::async_trait;
use tokio::sync::watch;

use super::{ApprovalPrompt, NotifyError};

/// Delivers approval prompts to reviewers.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, prompt: &ApprovalPrompt) -> Result<(), NotifyError>;
}

/// Logs prompts through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

#[async_trait]
impl Notifier for TracingNotifier {
    async fn notify(&self, prompt: &ApprovalPrompt) -> Result<(), NotifyError> {
        let recipients: Vec<&str> = prompt.recipients.iter().map(String::as_str).collect();
        tracing::warn!(
            run_id = %prompt.run_id,
            service = %prompt.service,
            link = %prompt.link,
            recipients = %recipients.join(", "),
            "approval required: {}",
            prompt.instructions
        );
        Ok(())
    }
}

/// Records every prompt; tests wait on it to know a run reached Approve.
#[derive(Debug)]
pub struct MemoryNotifier {
    prompts: watch::Sender<Vec<ApprovalPrompt>>,
}

impl Default for MemoryNotifier {
    fn default() -> Self {
        Self {
            prompts: watch::Sender::new(Vec::new()),
        }
    }
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prompts(&self) -> Vec<ApprovalPrompt> {
        self.prompts.borrow().clone()
    }

    /// Wait until the `nth` prompt (1-based) was delivered and return it.
    pub async fn wait_for_prompt(&self, nth: usize) -> Option<ApprovalPrompt> {
        let mut rx = self.prompts.subscribe();
        let prompts = rx.wait_for(|prompts| prompts.len() >= nth).await.ok()?;
        prompts.get(nth.saturating_sub(1)).cloned()
    }
}

#[async_trait]
impl Notifier for MemoryNotifier {
    async fn notify(&self, prompt: &ApprovalPrompt) -> Result<(), NotifyError> {
        self.prompts.send_modify(|prompts| prompts.push(prompt.clone()));
        Ok(())
    }
}
