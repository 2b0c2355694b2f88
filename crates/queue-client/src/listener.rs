//! Push-style delivery on top of [`MessageConsumer::receive`].
//!
//! [`spawn_listener`] registers a [`MessageListener`] on a consumer: a
//! delivery task pulls messages and invokes the callback for each one until
//! the token is cancelled. A message handed to the callback is always
//! processed to the end before the task exits.

use crate::client::MessageConsumer;
use crate::error::Error;
use crate::message::Message;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[async_trait]
pub trait MessageListener: Send + Sync + 'static {
    /// Handle one message. The next receive waits until this returns.
    async fn on_message(&self, message: Message);

    /// Called when receiving fails. Delivery continues after `poll_interval`.
    fn on_error(&self, error: Error);
}

/// Start delivering messages from `consumer` to `listener`.
///
/// `poll_interval` bounds each receive call, so cancellation is observed at
/// least that often even while the destination is idle.
pub fn spawn_listener<L: MessageListener>(
    consumer: Arc<dyn MessageConsumer>,
    listener: Arc<L>,
    token: CancellationToken,
    poll_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                _ = token.cancelled() => break,
                received = consumer.receive(poll_interval) => received,
            };

            match received {
                Ok(Some(message)) => listener.on_message(message).await,
                Ok(None) => {}
                Err(e) => {
                    listener.on_error(e);
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = tokio::time::sleep(poll_interval) => {}
                    }
                }
            }
        }
    })
}
