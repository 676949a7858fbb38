//! Delivery of external solver replies to a waiting session.
//!
//! The external process answers queries asynchronously. A single
//! [`ResponseDispatcher`] (usually the process reader thread) stamps every
//! reply with a sequential ticket; the session's [`ResponseReceiver`] hands
//! out the same sequence of tickets to the queries it emits. A wait only
//! accepts the reply carrying its own ticket, so the answer to a query that
//! timed out is discarded instead of being mistaken for the next one.
//!
//! A solver error printed while a query is outstanding is delivered as
//! [`Reply::Error`] so it consumes that query's ticket; otherwise every
//! later reply would be stamped one behind and discarded.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};

use crate::model::Model;
use crate::result::Outcome;

/// An answer to one query.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    CheckSat(Outcome),
    Model(Model),
    /// The solver rejected the query or answered with unparseable output.
    Error(String),
}

#[derive(Debug)]
enum Envelope {
    Reply { ticket: u64, reply: Reply },
    Cancel { ticket: u64 },
    Closed,
}

/// Create a connected dispatcher/receiver pair.
pub fn response_channel() -> (ResponseDispatcher, ResponseReceiver) {
    let (tx, rx) = channel::unbounded();
    let issued = Arc::new(AtomicU64::new(0));
    let dispatcher = ResponseDispatcher {
        tx: tx.clone(),
        next_ticket: 0,
        issued: Arc::clone(&issued),
    };
    let receiver = ResponseReceiver {
        rx,
        tx,
        issued,
        pending: Arc::new(AtomicU64::new(0)),
        closed: false,
    };
    (dispatcher, receiver)
}

/// Writing side: delivers each reply exactly once, in arrival order.
#[derive(Debug)]
pub struct ResponseDispatcher {
    tx: Sender<Envelope>,
    next_ticket: u64,
    /// Tickets issued by the receiver so far.
    issued: Arc<AtomicU64>,
}

impl ResponseDispatcher {
    /// Deliver the next reply. Returns `false` once the receiver is gone.
    pub fn deliver(&mut self, reply: Reply) -> bool {
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        tracing::trace!(ticket, ?reply, "Dispatching solver reply");
        self.tx.send(Envelope::Reply { ticket, reply }).is_ok()
    }

    /// Deliver a `check-sat` answer.
    pub fn deliver_outcome(&mut self, outcome: Outcome) -> bool {
        self.deliver(Reply::CheckSat(outcome))
    }

    /// Deliver a solver error as the answer to the oldest unanswered query.
    ///
    /// With no query outstanding the error belongs to a command that takes
    /// no ticket; it is logged and dropped.
    pub fn deliver_error(&mut self, msg: String) -> bool {
        if self.has_outstanding() {
            return self.deliver(Reply::Error(msg));
        }
        tracing::warn!("Solver error outside any query: {msg}");
        true
    }

    /// Whether a ticket has been issued that no reply has answered yet.
    pub fn has_outstanding(&self) -> bool {
        self.next_ticket < self.issued.load(Ordering::Acquire)
    }

    /// Number of replies delivered so far.
    pub fn delivered(&self) -> u64 {
        self.next_ticket
    }
}

impl Drop for ResponseDispatcher {
    fn drop(&mut self) {
        let _ = self.tx.send(Envelope::Closed);
    }
}

/// Result of waiting for one reply.
#[derive(Debug, PartialEq)]
pub(crate) enum WaitResult {
    Reply(Reply),
    TimedOut,
    Cancelled,
    Disconnected,
}

/// Reading side, owned by the session's context.
#[derive(Debug)]
pub struct ResponseReceiver {
    rx: Receiver<Envelope>,
    tx: Sender<Envelope>,
    /// Tickets issued so far; the next ticket is this value.
    issued: Arc<AtomicU64>,
    /// Outstanding ticket + 1, or 0 when nothing is awaited.
    pending: Arc<AtomicU64>,
    closed: bool,
}

impl ResponseReceiver {
    /// Reserve the ticket for a query that is about to be emitted.
    ///
    /// Must be called before the query is sent so the dispatcher can tell
    /// an error answering it from one answering an earlier command.
    pub(crate) fn issue_ticket(&mut self) -> u64 {
        self.issued.fetch_add(1, Ordering::AcqRel)
    }

    /// Handle that can abort an outstanding wait from another thread.
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: self.tx.clone(),
            pending: Arc::clone(&self.pending),
        }
    }

    /// Block until the reply for `ticket` arrives, the timeout elapses, the
    /// wait is cancelled or the dispatcher goes away. Logs a heartbeat every
    /// `heartbeat` while waiting.
    pub(crate) fn wait(&mut self, ticket: u64, timeout: Duration, heartbeat: Duration) -> WaitResult {
        if self.closed {
            return WaitResult::Disconnected;
        }
        self.pending.store(ticket + 1, Ordering::Release);
        let result = self.wait_inner(ticket, timeout, heartbeat);
        self.pending.store(0, Ordering::Release);
        result
    }

    fn wait_inner(&mut self, ticket: u64, timeout: Duration, heartbeat: Duration) -> WaitResult {
        let start = Instant::now();
        loop {
            // Queued replies are drained even once the deadline has passed.
            let remaining = timeout.saturating_sub(start.elapsed());
            let received = if remaining.is_zero() {
                match self.rx.try_recv() {
                    Ok(envelope) => Ok(envelope),
                    Err(TryRecvError::Empty) => return WaitResult::TimedOut,
                    Err(TryRecvError::Disconnected) => Err(RecvTimeoutError::Disconnected),
                }
            } else {
                self.rx.recv_timeout(heartbeat.min(remaining))
            };
            match received {
                Ok(Envelope::Reply { ticket: got, reply }) if got == ticket => {
                    return WaitResult::Reply(reply);
                }
                Ok(Envelope::Reply { ticket: got, reply }) if got < ticket => {
                    tracing::debug!(got, ticket, ?reply, "Discarding reply to an abandoned query");
                }
                Ok(Envelope::Reply { ticket: got, reply }) => {
                    tracing::warn!(got, ticket, "Reply ticket ahead of the awaited query");
                    return WaitResult::Reply(reply);
                }
                Ok(Envelope::Cancel { ticket: got }) if got == ticket => {
                    return WaitResult::Cancelled;
                }
                Ok(Envelope::Cancel { .. }) => {}
                Ok(Envelope::Closed) | Err(RecvTimeoutError::Disconnected) => {
                    self.closed = true;
                    return WaitResult::Disconnected;
                }
                Err(RecvTimeoutError::Timeout) => {
                    tracing::debug!(
                        ticket,
                        elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                        "Still waiting for external solver reply"
                    );
                }
            }
        }
    }
}

/// Aborts the wait of whichever query is outstanding when `cancel` is called.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Sender<Envelope>,
    pending: Arc<AtomicU64>,
}

impl CancelHandle {
    /// Cancel the outstanding wait. Returns `false` if nothing was waiting.
    pub fn cancel(&self) -> bool {
        match self.pending.load(Ordering::Acquire) {
            0 => false,
            marker => self
                .tx
                .send(Envelope::Cancel { ticket: marker - 1 })
                .is_ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    const LONG: Duration = Duration::from_secs(5);
    const BEAT: Duration = Duration::from_millis(10);

    #[test]
    fn reply_with_matching_ticket_is_returned() {
        let (mut dispatcher, mut receiver) = response_channel();
        let ticket = receiver.issue_ticket();
        assert!(dispatcher.deliver_outcome(Outcome::Unsat));
        assert_eq!(
            receiver.wait(ticket, LONG, BEAT),
            WaitResult::Reply(Reply::CheckSat(Outcome::Unsat))
        );
    }

    #[test]
    fn wait_times_out_without_reply() {
        let (_dispatcher, mut receiver) = response_channel();
        let ticket = receiver.issue_ticket();
        let start = Instant::now();
        assert_eq!(
            receiver.wait(ticket, Duration::from_millis(50), BEAT),
            WaitResult::TimedOut
        );
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn late_reply_is_not_consumed_by_next_query() {
        let (mut dispatcher, mut receiver) = response_channel();
        let first = receiver.issue_ticket();
        assert_eq!(
            receiver.wait(first, Duration::from_millis(20), BEAT),
            WaitResult::TimedOut
        );
        let second = receiver.issue_ticket();
        dispatcher.deliver_outcome(Outcome::Sat); // late answer to `first`
        dispatcher.deliver_outcome(Outcome::Unsat);
        assert_eq!(
            receiver.wait(second, LONG, BEAT),
            WaitResult::Reply(Reply::CheckSat(Outcome::Unsat))
        );
    }

    #[test]
    fn reply_from_another_thread_wakes_waiter() {
        let (mut dispatcher, mut receiver) = response_channel();
        let ticket = receiver.issue_ticket();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            dispatcher.deliver_outcome(Outcome::Sat);
            dispatcher
        });
        assert_eq!(
            receiver.wait(ticket, LONG, BEAT),
            WaitResult::Reply(Reply::CheckSat(Outcome::Sat))
        );
        handle.join().unwrap();
    }

    #[test]
    fn dropped_dispatcher_disconnects() {
        let (dispatcher, mut receiver) = response_channel();
        drop(dispatcher);
        let ticket = receiver.issue_ticket();
        assert_eq!(receiver.wait(ticket, LONG, BEAT), WaitResult::Disconnected);
        let ticket = receiver.issue_ticket();
        assert_eq!(receiver.wait(ticket, LONG, BEAT), WaitResult::Disconnected);
    }

    #[test]
    fn queued_reply_is_taken_with_zero_timeout() {
        let (mut dispatcher, mut receiver) = response_channel();
        let ticket = receiver.issue_ticket();
        dispatcher.deliver_outcome(Outcome::Sat);
        assert_eq!(
            receiver.wait(ticket, Duration::ZERO, BEAT),
            WaitResult::Reply(Reply::CheckSat(Outcome::Sat))
        );
        let ticket = receiver.issue_ticket();
        assert_eq!(receiver.wait(ticket, Duration::ZERO, BEAT), WaitResult::TimedOut);
    }

    #[test]
    fn error_answers_the_outstanding_query() {
        let (mut dispatcher, mut receiver) = response_channel();
        let first = receiver.issue_ticket();
        assert!(dispatcher.has_outstanding());
        dispatcher.deliver_error("line 1: boom".into());
        assert!(!dispatcher.has_outstanding());
        assert_eq!(
            receiver.wait(first, LONG, BEAT),
            WaitResult::Reply(Reply::Error("line 1: boom".into()))
        );

        // The next answer lines up with the next query.
        let second = receiver.issue_ticket();
        dispatcher.deliver_outcome(Outcome::Sat);
        assert_eq!(
            receiver.wait(second, LONG, BEAT),
            WaitResult::Reply(Reply::CheckSat(Outcome::Sat))
        );
    }

    #[test]
    fn error_without_outstanding_query_takes_no_ticket() {
        let (mut dispatcher, mut receiver) = response_channel();
        assert!(dispatcher.deliver_error("unknown constant x".into()));
        assert_eq!(dispatcher.delivered(), 0);
        let ticket = receiver.issue_ticket();
        dispatcher.deliver_outcome(Outcome::Unsat);
        assert_eq!(
            receiver.wait(ticket, LONG, BEAT),
            WaitResult::Reply(Reply::CheckSat(Outcome::Unsat))
        );
    }

    #[test]
    fn cancel_without_waiter_is_a_no_op() {
        let (_dispatcher, receiver) = response_channel();
        assert!(!receiver.cancel_handle().cancel());
    }

    #[test]
    fn cancel_aborts_outstanding_wait() {
        let (_dispatcher, mut receiver) = response_channel();
        let cancel = receiver.cancel_handle();
        let canceller = thread::spawn(move || {
            while !cancel.cancel() {
                thread::sleep(Duration::from_millis(5));
            }
        });
        let ticket = receiver.issue_ticket();
        assert_eq!(receiver.wait(ticket, LONG, BEAT), WaitResult::Cancelled);
        canceller.join().unwrap();
    }
}
