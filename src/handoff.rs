// Single-producer, single-consumer rendezvous channel between the generator and the
// dispatcher.
//
// tokio's mpsc channels need at least one slot, so we can't get an unbuffered
// channel out of them directly. Instead, every item travels together with a oneshot
// sender, and the receiving side fires it the moment it takes the item out of the
// slot. A full `send` waits for that acknowledgement, which means the producer can
// never be more than the one item the consumer is about to take ahead of it.
//
// Sending is split in two steps so the producer knows exactly when an item left its
// hands: `offer` resolves once the item is in the slot (from then on the consumer
// may get it, so the producer has to count it), and `Taken::wait` resolves once the
// consumer actually took it.
//
// Closing is implicit: dropping the sender closes the channel, and the receiver
// reports end-of-stream after the last item has been taken.

use tokio::sync::{mpsc, oneshot};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};

type Slot<T> = (T, oneshot::Sender<()>);

#[derive(Debug, thiserror::Error)]
#[error("handoff receiver was dropped")]
pub struct HandoffClosed;

pub fn channel<T>() -> (HandoffSender<T>, HandoffReceiver<T>) {
    let (tx, rx) = mpsc::channel(1);
    (HandoffSender { tx }, HandoffReceiver { rx })
}

#[derive(Debug)]
pub struct HandoffSender<T> {
    tx: mpsc::Sender<Slot<T>>,
}

impl<T> HandoffSender<T> {
    // Waits for the slot to be free and puts `item` in it. If this future is dropped
    // before it resolves, the item was not enqueued (mpsc `send` is cancel safe).
    pub async fn offer(&self, item: T) -> Result<Taken, HandoffClosed> {
        let (taken_tx, taken_rx) = oneshot::channel();
        self.tx
            .send((item, taken_tx))
            .await
            .map_err(|_| HandoffClosed)?;
        Ok(Taken(taken_rx))
    }

    #[cfg(test)]
    pub async fn send(&self, item: T) -> Result<(), HandoffClosed> {
        self.offer(item).await?.wait().await
    }
}

#[derive(Debug)]
pub struct Taken(oneshot::Receiver<()>);

impl Taken {
    pub async fn wait(self) -> Result<(), HandoffClosed> {
        // If the receiver goes away with our item still in the slot, the oneshot
        // sender is dropped together with it and this fails.
        self.0.await.map_err(|_| HandoffClosed)
    }
}

#[derive(Debug)]
pub struct HandoffReceiver<T> {
    rx: mpsc::Receiver<Slot<T>>,
}

impl<T> HandoffReceiver<T> {
    #[cfg(test)]
    pub async fn recv(&mut self) -> Option<T> {
        let (item, taken) = self.rx.recv().await?;
        let _ = taken.send(());
        Some(item)
    }

    pub fn into_stream(self) -> impl Stream<Item = T> + Unpin {
        ReceiverStream::new(self.rx).map(|(item, taken)| {
            let _ = taken.send(());
            item
        })
    }
}
