use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

struct QueryEntry {
    responses: Vec<String>,
    responders: HashSet<String>,
    wake: Option<mpsc::Sender<()>>,
    completed: bool,
}

/// Registry of in-flight queries keyed by query id.
///
/// Each entry accumulates reply payloads in arrival order, at most one
/// per peer, and wakes the registered waiter through a bounded channel
/// sized to the expected confirmation count. Once a query completes
/// the entry stays behind (for `get_reply`) but further appends are
/// dropped.
#[derive(Default)]
pub struct PendingQueries {
    queries: Mutex<HashMap<String, QueryEntry>>,
}

/// The client half of one pending query: awaits wake tokens sent by
/// the reply path.
pub struct QueryWaiter {
    rx: mpsc::Receiver<()>,
}

impl QueryWaiter {
    /// Waits for one more response, up to `wait`. `false` on timeout.
    pub async fn next_response(&mut self, wait: Duration) -> bool {
        matches!(timeout(wait, self.rx.recv()).await, Ok(Some(())))
    }
}

impl PendingQueries {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a query expecting up to `expected` responses and
    /// returns the waiter for it. Re-registering an id replaces the
    /// previous entry.
    pub fn register(&self, id: &str, expected: usize) -> QueryWaiter {
        let (tx, rx) = mpsc::channel(expected.max(1));
        let entry = QueryEntry {
            responses: Vec::new(),
            responders: HashSet::new(),
            wake: Some(tx),
            completed: false,
        };
        self.queries.lock().insert(id.to_string(), entry);
        QueryWaiter { rx }
    }

    /// Appends a reply from `peer`, waking the waiter. Replies for
    /// unknown or completed queries and duplicate replies from the same
    /// peer are dropped.
    pub fn add_response(&self, id: &str, peer: &str, payload: String) -> bool {
        let mut queries = self.queries.lock();
        let Some(entry) = queries.get_mut(id) else {
            return false;
        };
        if entry.completed || !entry.responders.insert(peer.to_string()) {
            return false;
        }
        entry.responses.push(payload);
        if let Some(wake) = &entry.wake {
            let _ = wake.try_send(());
        }
        true
    }

    /// Snapshot of the responses gathered so far, in arrival order.
    pub fn responses(&self, id: &str) -> Vec<String> {
        self.queries
            .lock()
            .get(id)
            .map(|entry| entry.responses.clone())
            .unwrap_or_default()
    }

    /// Marks the query finished: the waiter is torn down and any reply
    /// arriving from now on is ignored. Responses are retained.
    pub fn complete(&self, id: &str) {
        if let Some(entry) = self.queries.lock().get_mut(id) {
            entry.completed = true;
            entry.wake = None;
        }
    }

    /// Drops gathered responses and responders, keeping the query
    /// live. Used between retries that reuse the same query id.
    pub fn clear_responses(&self, id: &str) {
        if let Some(entry) = self.queries.lock().get_mut(id) {
            entry.responses.clear();
            entry.responders.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn responses_accumulate_in_arrival_order_and_wake_the_waiter() {
        let queries = PendingQueries::new();
        let mut waiter = queries.register("q1", 2);

        assert!(queries.add_response("q1", "peer-a", "A".into()));
        assert!(queries.add_response("q1", "peer-b", "B".into()));
        assert!(waiter.next_response(Duration::from_millis(50)).await);
        assert!(waiter.next_response(Duration::from_millis(50)).await);
        assert!(!waiter.next_response(Duration::from_millis(10)).await);

        assert_eq!(queries.responses("q1"), vec!["A".to_string(), "B".to_string()]);
    }

    #[tokio::test]
    async fn one_response_per_peer() {
        let queries = PendingQueries::new();
        let _waiter = queries.register("q1", 3);

        assert!(queries.add_response("q1", "peer-a", "A1".into()));
        assert!(!queries.add_response("q1", "peer-a", "A2".into()));
        assert_eq!(queries.responses("q1"), vec!["A1".to_string()]);
    }

    #[tokio::test]
    async fn late_replies_after_completion_are_dropped() {
        let queries = PendingQueries::new();
        let _waiter = queries.register("q1", 1);

        assert!(queries.add_response("q1", "peer-a", "A".into()));
        queries.complete("q1");
        assert!(!queries.add_response("q1", "peer-b", "B".into()));
        // The gathered responses survive completion for get_reply.
        assert_eq!(queries.responses("q1"), vec!["A".to_string()]);
    }

    #[tokio::test]
    async fn unknown_query_ids_are_ignored() {
        let queries = PendingQueries::new();
        assert!(!queries.add_response("nope", "peer-a", "A".into()));
        assert!(queries.responses("nope").is_empty());
    }

    #[tokio::test]
    async fn clear_responses_allows_the_next_attempt() {
        let queries = PendingQueries::new();
        let _waiter = queries.register("q1", 1);
        assert!(queries.add_response("q1", "peer-a", "bad".into()));
        queries.clear_responses("q1");
        assert!(queries.responses("q1").is_empty());
        // The same peer may answer the retried attempt.
        assert!(queries.add_response("q1", "peer-a", "good".into()));
    }
}
