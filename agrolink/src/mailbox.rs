use futures::channel::oneshot;
use parking_lot::Mutex;
use std::{collections::VecDeque, mem, result, sync::Arc};

#[derive(Debug)]
struct MailboxInner<T: Send + 'static> {
    send_closed: bool,
    recv_closed: bool,
    notify: Option<oneshot::Sender<()>>,
    queue: VecDeque<T>,
    depth: usize,
    conflated: u64,
}

#[derive(Debug)]
struct MailboxSenderInner<T: Send + 'static>(Arc<Mutex<MailboxInner<T>>>);

impl<T: Send + 'static> Drop for MailboxSenderInner<T> {
    fn drop(&mut self) {
        let mut inner = self.0.lock();
        inner.send_closed = true;
        if let Some(tx) = inner.notify.take() {
            let _: result::Result<_, _> = tx.send(());
        }
    }
}

/// The producer side of a mailbox. Cloning is cheap; the mailbox
/// closes for the receiver once every clone is dropped.
#[derive(Debug)]
pub struct MailboxSender<T: Send + 'static>(Arc<MailboxSenderInner<T>>);

impl<T: Send + 'static> Clone for MailboxSender<T> {
    fn clone(&self) -> Self {
        MailboxSender(Arc::clone(&self.0))
    }
}

impl<T: Send + 'static> MailboxSender<T> {
    /// Queue a message without blocking. When the mailbox already
    /// holds `depth` messages the oldest queued message is dropped to
    /// admit the newest. Returns false once the receiver has closed.
    pub fn send(&self, m: T) -> bool {
        let mut inner = self.0 .0.lock();
        if inner.recv_closed {
            false
        } else {
            if inner.queue.len() == inner.depth {
                inner.queue.pop_front();
                inner.conflated += 1;
            }
            inner.queue.push_back(m);
            if let Some(tx) = inner.notify.take() {
                let _: result::Result<_, _> = tx.send(());
            }
            true
        }
    }

    pub fn is_closed(&self) -> bool {
        self.0 .0.lock().recv_closed
    }
}

/// The consumer side of a mailbox.
#[derive(Debug)]
pub struct Mailbox<T: Send + 'static>(Arc<Mutex<MailboxInner<T>>>);

impl<T: Send + 'static> Drop for Mailbox<T> {
    fn drop(&mut self) {
        self.close()
    }
}

impl<T: Send + 'static> Mailbox<T> {
    /// Detach from the senders. Pending messages are discarded and
    /// every subsequent send returns false.
    pub fn close(&self) {
        let mut inner = self.0.lock();
        inner.recv_closed = true;
        inner.queue.clear();
        inner.notify = None;
    }

    pub fn len(&self) -> usize {
        self.0.lock().queue.len()
    }

    /// How many messages were conflated away because this consumer
    /// fell behind.
    pub fn conflated(&self) -> u64 {
        self.0.lock().conflated
    }

    /// Receive everything queued, in arrival order. Waits if the
    /// queue is empty, returns None once every sender is gone and the
    /// queue has drained.
    pub async fn recv(&self) -> Option<VecDeque<T>> {
        loop {
            let receiver = {
                let mut inner = self.0.lock();
                if !inner.queue.is_empty() {
                    return Some(mem::take(&mut inner.queue));
                } else if inner.send_closed {
                    return None;
                } else {
                    let (tx, rx) = oneshot::channel();
                    inner.notify = Some(tx);
                    rx
                }
            };
            let _: result::Result<_, _> = receiver.await;
        }
    }
}

/// Create a mailbox holding at most `depth` undelivered messages.
/// Producers never block; a consumer that does not drain fast enough
/// loses the oldest queued messages, freshness over completeness.
pub fn mailbox<T: Send + 'static>(depth: usize) -> (MailboxSender<T>, Mailbox<T>) {
    let inner = Arc::new(Mutex::new(MailboxInner {
        send_closed: false,
        recv_closed: false,
        notify: None,
        queue: VecDeque::with_capacity(depth),
        depth,
        conflated: 0,
    }));
    let sender = MailboxSender(Arc::new(MailboxSenderInner(inner.clone())));
    let receiver = Mailbox(inner);
    (sender, receiver)
}
