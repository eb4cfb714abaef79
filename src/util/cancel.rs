// cooperative cancellation on top of channel closing: tokens hold senders and
// dropping the trigger's receiver closes the channel for every clone
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// Checked by the chunkers between elements and sections
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    sender: Option<UnboundedSender<()>>,
}

impl CancelToken {
    /// Token that is never cancelled
    pub fn none() -> CancelToken {
        CancelToken { sender: None }
    }

    pub fn is_cancelled(&self) -> bool {
        self.sender.as_ref().is_some_and(|s| s.is_closed())
    }

    /// Resolves once the paired trigger fires (never for [`CancelToken::none`])
    pub async fn cancelled(&self) {
        match &self.sender {
            Some(sender) => sender.closed().await,
            None => std::future::pending().await,
        }
    }
}

/// Cancels every clone of its paired token
#[derive(Debug)]
pub struct CancelTrigger {
    receiver: UnboundedReceiver<()>,
}

impl CancelTrigger {
    pub fn cancel(self) {
        tracing::debug!("cancellation requested");
        drop(self.receiver)
    }
}

pub fn cancel_pair() -> (CancelToken, CancelTrigger) {
    let (send, recv) = mpsc::unbounded_channel();
    (
        CancelToken { sender: Some(send) },
        CancelTrigger { receiver: recv },
    )
}
