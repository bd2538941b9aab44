use crate::errors::Result;
use crate::events::JobEvent;
use crate::types::OutputLine;
use std::collections::VecDeque;
use tokio::sync::oneshot;

type Waiter = oneshot::Sender<Result<Vec<JobEvent>>>;

/// Buffers a job's events until a consumer takes them, and keeps a bounded
/// history of its output.
///
/// Events leave the outbox exactly once, in the order they were pushed.
/// Once the terminal event has been taken the outbox is drained and hands
/// out empty batches from then on.
pub struct Outbox {
    pending: VecDeque<JobEvent>,
    transcript: VecDeque<OutputLine>,
    transcript_limit: usize,
    waiters: VecDeque<Waiter>,
    drained: bool,
}

impl Outbox {
    pub fn new(transcript_limit: usize) -> Self {
        Self {
            pending: VecDeque::new(),
            transcript: VecDeque::new(),
            transcript_limit,
            waiters: VecDeque::new(),
            drained: false,
        }
    }

    pub fn push_output(&mut self, line: OutputLine) {
        if self.transcript_limit > 0 {
            if self.transcript.len() == self.transcript_limit {
                self.transcript.pop_front();
            }
            self.transcript.push_back(line.clone());
        }
        self.pending.push_back(JobEvent::Output(line));
    }

    pub fn push_terminal(&mut self, event: JobEvent) {
        debug_assert!(event.is_terminal());
        self.pending.push_back(event);
    }

    pub fn is_drained(&self) -> bool {
        self.drained
    }

    fn is_ready(&self) -> bool {
        self.drained || !self.pending.is_empty()
    }

    /// Take every buffered event.
    pub fn take(&mut self) -> Vec<JobEvent> {
        if self.drained {
            return Vec::new();
        }
        let events: Vec<_> = self.pending.drain(..).collect();
        if events.last().map_or(false, JobEvent::is_terminal) {
            self.drained = true;
        }
        events
    }

    /// Put back events a consumer never received, ahead of anything newer.
    pub fn restore(&mut self, events: Vec<JobEvent>) {
        if events.last().map_or(false, JobEvent::is_terminal) {
            self.drained = false;
        }
        for event in events.into_iter().rev() {
            self.pending.push_front(event);
        }
    }

    /// Queue a consumer that wants the next batch, answering at once if one is ready.
    pub fn wait(&mut self, waiter: Waiter) {
        self.waiters.push_back(waiter);
        self.serve_waiters();
    }

    /// Hand ready batches to queued consumers, oldest consumer first.
    pub fn serve_waiters(&mut self) {
        while self.is_ready() {
            let waiter = match self.waiters.pop_front() {
                Some(waiter) => waiter,
                None => break,
            };
            if waiter.is_closed() {
                continue;
            }
            let events = self.take();
            if let Err(Ok(events)) = waiter.send(Ok(events)) {
                self.restore(events);
            }
        }
    }

    pub fn transcript(&self) -> Vec<OutputLine> {
        self.transcript.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::Termination;
    use crate::types::Stream;

    fn line(text: &'static str) -> OutputLine {
        OutputLine::new(Stream::Stdout, text)
    }

    #[test]
    fn take_is_exactly_once() {
        let mut outbox = Outbox::new(16);
        outbox.push_output(line("a"));
        outbox.push_output(line("b"));
        assert_eq!(
            outbox.take(),
            vec![JobEvent::Output(line("a")), JobEvent::Output(line("b"))]
        );
        assert!(outbox.take().is_empty());
        assert!(!outbox.is_drained());

        outbox.push_terminal(JobEvent::Failed(Termination::Exited(2)));
        assert_eq!(outbox.take(), vec![JobEvent::Failed(Termination::Exited(2))]);
        assert!(outbox.is_drained());
        assert!(outbox.take().is_empty());
    }

    #[test]
    fn transcript_keeps_the_most_recent_lines() {
        let mut outbox = Outbox::new(2);
        for text in ["one", "two", "three"] {
            outbox.push_output(line(text));
        }
        assert_eq!(outbox.transcript(), vec![line("two"), line("three")]);
        // the transcript limit never drops undelivered events
        assert_eq!(outbox.take().len(), 3);
    }

    #[tokio::test]
    async fn events_for_a_vanished_waiter_are_kept() {
        let mut outbox = Outbox::new(16);

        let (gone_tx, gone_rx) = oneshot::channel();
        drop(gone_rx);
        outbox.wait(gone_tx);
        let (tx, rx) = oneshot::channel();
        outbox.wait(tx);

        outbox.push_output(line("kept"));
        outbox.serve_waiters();
        let events = rx.await.unwrap().unwrap();
        assert_eq!(events, vec![JobEvent::Output(line("kept"))]);
    }

    #[tokio::test]
    async fn drained_outbox_answers_waiters_immediately() {
        let mut outbox = Outbox::new(16);
        outbox.push_terminal(JobEvent::Succeeded);
        assert_eq!(outbox.take(), vec![JobEvent::Succeeded]);

        let (tx, rx) = oneshot::channel();
        outbox.wait(tx);
        assert!(rx.await.unwrap().unwrap().is_empty());
    }
}
