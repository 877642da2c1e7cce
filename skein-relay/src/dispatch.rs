use std::collections::VecDeque;

use libp2p::PeerId;
use skein_types::Message;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Spawn the dispatch task for one connected peer.
///
/// Messages are forwarded to `sink` in the order they are queued. A full sink
/// blocks this task and nobody else. Every time the task takes a message off
/// its queue it reports `peer` on `ready`, so held-back frames can move up.
/// Without a sink messages are logged and dropped.
pub(crate) fn spawn_dispatcher(
    peer: PeerId,
    sink: Option<mpsc::Sender<Message>>,
    ready: mpsc::UnboundedSender<PeerId>,
    capacity: usize,
    cancel: CancellationToken,
) -> mpsc::Sender<Message> {
    let (tx, mut rx) = mpsc::channel::<Message>(capacity);

    tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = rx.recv() => match next {
                    Some(message) => message,
                    None => break,
                },
            };
            // The event loop may be gone already; queued messages still drain.
            let _ = ready.send(peer);

            match &sink {
                Some(sink) => {
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        sent = sink.send(message) => {
                            if sent.is_err() {
                                debug!(%peer, "inbound receiver closed, message dropped");
                            }
                        }
                    }
                }
                None => {
                    debug!(%peer, %message, "no inbound channel, message dropped");
                }
            }
        }
        debug!(%peer, "dispatcher stopped");
    });

    tx
}

/// The swarm task's side of one peer's dispatcher.
///
/// A frame is acknowledged as soon as its message is in the queue. While the
/// queue is full, later frames wait in `held` together with their ack, in
/// arrival order.
pub(crate) struct PeerQueue<A> {
    tx: mpsc::Sender<Message>,
    held: VecDeque<(Message, A)>,
}

impl<A> PeerQueue<A> {
    pub(crate) fn new(tx: mpsc::Sender<Message>) -> Self {
        Self {
            tx,
            held: VecDeque::new(),
        }
    }

    /// Queue a decoded message. Returns the ack when it can be sent right
    /// away, `None` when it is held until the queue drains.
    pub(crate) fn offer(&mut self, message: Message, ack: A) -> Option<A> {
        if !self.held.is_empty() {
            self.held.push_back((message, ack));
            return None;
        }
        match self.tx.try_send(message) {
            Ok(()) => Some(ack),
            Err(TrySendError::Full(message)) => {
                self.held.push_back((message, ack));
                None
            }
            Err(TrySendError::Closed(_)) => Some(ack),
        }
    }

    /// Move held messages into the queue while it has room. Entries whose
    /// sender no longer waits (`is_live` false) are dropped undelivered.
    /// Returns the acks to send, in order.
    pub(crate) fn flush(&mut self, is_live: impl Fn(&A) -> bool) -> Vec<A> {
        let mut acks = Vec::new();
        while let Some((message, ack)) = self.held.pop_front() {
            if !is_live(&ack) {
                debug!("held frame abandoned by its sender, dropped");
                continue;
            }
            match self.tx.try_send(message) {
                Ok(()) => acks.push(ack),
                Err(TrySendError::Full(message)) => {
                    self.held.push_front((message, ack));
                    break;
                }
                Err(TrySendError::Closed(_)) => acks.push(ack),
            }
        }
        acks
    }

    pub(crate) fn held(&self) -> usize {
        self.held.len()
    }
}
