use std::sync::mpsc;

/// Sending half of a frame-event queue. Cloned into worker jobs and session
/// callbacks; everything sent here is applied on the next frame tick.
pub struct EventSender<T> {
    tx: mpsc::Sender<T>,
}

/// Receiving half, owned by the frame tick.
pub struct EventReceiver<T> {
    rx: mpsc::Receiver<T>,
}

pub fn channel<T>() -> (EventSender<T>, EventReceiver<T>) {
    let (tx, rx) = mpsc::channel();
    (EventSender { tx }, EventReceiver { rx })
}

impl<T> Clone for EventSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<T> EventSender<T> {
    pub fn send(&self, event: T) -> Result<(), mpsc::SendError<T>> {
        self.tx.send(event)
    }

    /// Sends and drops the event if the tick side is gone. Used by workers that
    /// may outlive the frame loop during shutdown.
    pub fn send_or_drop(&self, event: T) -> bool {
        if self.tx.send(event).is_err() {
            tracing::debug!("frame event dropped: receiver closed");
            return false;
        }
        true
    }
}

impl<T> EventReceiver<T> {
    pub fn try_recv(&self) -> Result<T, mpsc::TryRecvError> {
        self.rx.try_recv()
    }

    /// Takes every event queued so far without blocking, in send order.
    pub fn drain(&self) -> Vec<T> {
        self.rx.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::channel;

    #[test]
    fn drain_preserves_send_order_across_senders() {
        let (tx, rx) = channel();
        let tx2 = tx.clone();
        tx.send(1).expect("send 1");
        tx2.send(2).expect("send 2");
        tx.send(3).expect("send 3");

        assert_eq!(rx.drain(), vec![1, 2, 3]);
        assert!(rx.drain().is_empty());
    }

    #[test]
    fn send_or_drop_reports_closed_receiver() {
        let (tx, rx) = channel::<u8>();
        assert!(tx.send_or_drop(7));
        drop(rx);
        assert!(!tx.send_or_drop(8));
    }
}
