use tokio::sync::mpsc;
use tracing::warn;

use crate::application::ports::DisconnectNotifier;
use crate::domain::SessionId;

/// A session that ended on a fatal error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disconnection {
    pub session_id: SessionId,
    pub reason: String,
}

/// Hands disconnections to the application over an unbounded channel
pub struct ChannelDisconnectNotifier {
    sender: mpsc::UnboundedSender<Disconnection>,
}

impl ChannelDisconnectNotifier {
    pub fn new(sender: mpsc::UnboundedSender<Disconnection>) -> Self {
        Self { sender }
    }

    /// Notifier plus the receiving end the application drains
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Disconnection>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self::new(sender), receiver)
    }
}

impl DisconnectNotifier for ChannelDisconnectNotifier {
    fn on_disconnected(&self, session_id: &SessionId, reason: &str) {
        let disconnection = Disconnection {
            session_id: session_id.clone(),
            reason: reason.to_string(),
        };
        if self.sender.send(disconnection).is_err() {
            warn!(session_id = %session_id, "Nobody is listening for disconnections");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disconnections_are_forwarded() {
        let (notifier, mut receiver) = ChannelDisconnectNotifier::channel();
        let session_id = SessionId::generate();

        notifier.on_disconnected(&session_id, "host error: encoder crashed");

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.session_id, session_id);
        assert_eq!(received.reason, "host error: encoder crashed");
    }

    #[test]
    fn test_closed_receiver_is_tolerated() {
        let (notifier, receiver) = ChannelDisconnectNotifier::channel();
        drop(receiver);
        notifier.on_disconnected(&SessionId::generate(), "gone");
    }
}
