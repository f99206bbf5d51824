use crate::dead_letters::{DeadLetter, DeadLetters};
use crate::errors::ActorFault;
use crate::message::Message;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// What a bounded mailbox does with a message that arrives while full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Discard the queued head to make room for the new message.
    DropOldest,
    /// Discard the incoming message.
    DropNewest,
    /// Turn the incoming message away: its deferred rejects with
    /// "mailbox overflow" and a dead letter is recorded.
    Reject,
}

struct MailboxState {
    queue: VecDeque<Message>,
    suspended: bool,
    closed: bool,
    dropped: u64,
}

/// Per-actor FIFO of pending messages.
///
/// Strictly ordered within one mailbox; no ordering holds across mailboxes.
/// While suspended or closed the dispatcher does not run. Once closed, the
/// queue is drained to dead letters and every later send is diverted there
/// too; closing and re-resuming are no-ops after that.
pub struct Mailbox {
    state: Mutex<MailboxState>,
    capacity: Option<usize>,
    policy: OverflowPolicy,
    signal: Notify,
    dead_letters: Arc<DeadLetters>,
}

impl Mailbox {
    pub(crate) fn unbounded(dead_letters: Arc<DeadLetters>) -> Self {
        Self::build(None, OverflowPolicy::Reject, dead_letters)
    }

    pub(crate) fn bounded(
        capacity: usize,
        policy: OverflowPolicy,
        dead_letters: Arc<DeadLetters>,
    ) -> Self {
        Self::build(Some(capacity.max(1)), policy, dead_letters)
    }

    fn build(capacity: Option<usize>, policy: OverflowPolicy, dead_letters: Arc<DeadLetters>) -> Self {
        Self {
            state: Mutex::new(MailboxState {
                queue: VecDeque::new(),
                suspended: false,
                closed: false,
                dropped: 0,
            }),
            capacity,
            policy,
            signal: Notify::new(),
            dead_letters,
        }
    }

    /// Enqueue a message under the capacity rules, waking the dispatcher if
    /// the mailbox is active. Sends to a closed mailbox become dead letters
    /// with reason "actor stopped" and reject the caller's deferred.
    pub(crate) fn send(&self, message: Message) {
        let mut state = self.state.lock().expect("mailbox state poisoned");
        if state.closed {
            drop(state);
            self.divert(message, "actor stopped", ActorFault::Stopped);
            return;
        }
        if let Some(capacity) = self.capacity {
            if state.queue.len() >= capacity {
                state.dropped += 1;
                match self.policy {
                    OverflowPolicy::DropOldest => {
                        state.queue.pop_front();
                        state.queue.push_back(message);
                    }
                    OverflowPolicy::DropNewest => {}
                    OverflowPolicy::Reject => {
                        drop(state);
                        self.divert(message, "mailbox overflow", ActorFault::MailboxOverflow);
                        return;
                    }
                }
                return;
            }
        }
        state.queue.push_back(message);
        let wake = !state.suspended;
        drop(state);
        if wake {
            self.signal.notify_one();
        }
    }

    /// Stop dispatching user messages. Idempotent.
    pub fn suspend(&self) {
        self.state.lock().expect("mailbox state poisoned").suspended = true;
    }

    /// Allow dispatching again and wake the dispatcher if work is queued.
    /// A no-op once the mailbox is closed. Idempotent.
    pub fn resume(&self) {
        let mut state = self.state.lock().expect("mailbox state poisoned");
        if state.closed {
            return;
        }
        state.suspended = false;
        let wake = !state.queue.is_empty();
        drop(state);
        if wake {
            self.signal.notify_one();
        }
    }

    /// Close the mailbox and drain everything queued to dead letters with
    /// reason "actor stopped"; drained deferreds reject with the same fault.
    /// Idempotent.
    pub(crate) fn close(&self) {
        let drained: Vec<Message> = {
            let mut state = self.state.lock().expect("mailbox state poisoned");
            if state.closed {
                return;
            }
            state.closed = true;
            state.queue.drain(..).collect()
        };
        for message in drained {
            self.divert(message, "actor stopped", ActorFault::Stopped);
        }
    }

    /// True iff a dispatch turn would find work: not suspended, not closed,
    /// and non-empty.
    pub fn is_receivable(&self) -> bool {
        let state = self.state.lock().expect("mailbox state poisoned");
        !state.suspended && !state.closed && !state.queue.is_empty()
    }

    pub fn is_suspended(&self) -> bool {
        self.state.lock().expect("mailbox state poisoned").suspended
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().expect("mailbox state poisoned").closed
    }

    /// Messages discarded or turned away under the overflow policy so far.
    pub fn dropped_count(&self) -> u64 {
        self.state.lock().expect("mailbox state poisoned").dropped
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().expect("mailbox state poisoned").queue.len()
    }

    /// Pop the head message if the mailbox is receivable.
    pub(crate) fn take_next(&self) -> Option<Message> {
        let mut state = self.state.lock().expect("mailbox state poisoned");
        if state.suspended || state.closed {
            return None;
        }
        state.queue.pop_front()
    }

    /// Wait until a send or resume signals possible work.
    pub(crate) async fn ready(&self) {
        self.signal.notified().await;
    }

    /// Re-arm the dispatch signal; used by the dispatcher after a turn that
    /// left the mailbox receivable.
    pub(crate) fn wake(&self) {
        self.signal.notify_one();
    }

    fn divert(&self, message: Message, reason: &str, fault: ActorFault) {
        self.dead_letters.failed_delivery(DeadLetter::new(
            message.target.clone(),
            message.representation(),
            reason,
        ));
        message.reject(fault);
    }
}
