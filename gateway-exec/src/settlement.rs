//! Settlement poller.
//!
//! Withdrawals and deposits settle asynchronously. The venue only exposes a
//! history endpoint, so the poller fetches it repeatedly until the entry for
//! one id reaches a terminal status.
//!
//! ```text
//! Submitted → Polling ─┬→ Success
//!                      ├→ Failure   (SettlementFailed)
//!                      ├→ Timeout   (SettlementTimeout)
//!                      └→ Cancelled
//! ```
//!
//! Transient fetch errors (connection, 5xx, 429) are retried with a short
//! backoff and do not consume the attempt budget. Every wait races the
//! caller's [`CancellationToken`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use gateway_domain::{HistoryEntry, SettlementDirection, SettlementStatus, Venue};

use crate::error::{GatewayError, GatewayResult};
use crate::events::{EventBus, GatewayEvent};
use crate::ports::Clock;

/// Default number of history polls before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 500;

// =============================================================================
// Poll Policy
// =============================================================================

/// How often and how long to poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollPolicy {
    /// History polls before `SettlementTimeout`
    pub max_attempts: u32,
    /// Wait between polls
    pub interval: Duration,
    /// Consecutive transient fetch errors tolerated
    pub max_transient_errors: u32,
    /// Wait after a transient fetch error
    pub transient_backoff: Duration,
}

impl PollPolicy {
    /// Withdrawal defaults: 500 polls, 10 s apart.
    pub fn withdrawal() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            interval: Duration::from_secs(10),
            max_transient_errors: 3,
            transient_backoff: Duration::from_secs(2),
        }
    }

    /// Deposit defaults: 500 polls, 5 s apart.
    pub fn deposit() -> Self {
        Self {
            interval: Duration::from_secs(5),
            ..Self::withdrawal()
        }
    }

    /// Defaults for `direction`.
    pub fn for_direction(direction: SettlementDirection) -> Self {
        match direction {
            SettlementDirection::Withdrawal => Self::withdrawal(),
            SettlementDirection::Deposit => Self::deposit(),
        }
    }

    /// Override the attempt budget.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Override the poll interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Override the transient-error tolerance.
    pub fn with_transient_errors(mut self, max: u32, backoff: Duration) -> Self {
        self.max_transient_errors = max;
        self.transient_backoff = backoff;
        self
    }
}

/// Successful settlement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementOutcome {
    /// Matching history entry at the time it succeeded
    pub entry: HistoryEntry,
    /// Transaction hash from the classifier, else from the entry
    pub tx_hash: Option<String>,
    /// History polls performed
    pub attempts: u32,
}

// =============================================================================
// Poller
// =============================================================================

/// Polls venue history until a settlement resolves.
pub struct SettlementPoller {
    venue: Venue,
    clock: Arc<dyn Clock>,
    events: Arc<EventBus>,
}

impl SettlementPoller {
    /// Create a poller.
    pub fn new(venue: Venue, clock: Arc<dyn Clock>, events: Arc<EventBus>) -> Self {
        Self { venue, clock, events }
    }

    /// Wait for the settlement identified by `id`.
    ///
    /// - `fetch_history` issues one history call
    /// - `classify` maps an entry's raw status to a [`SettlementStatus`]
    /// - `match_by` extracts the field compared (exactly) with `id`
    ///
    /// # Errors
    ///
    /// - `SettlementFailed` on the first terminal failure
    /// - `SettlementTimeout` after `policy.max_attempts` polls
    /// - `Cancelled` when `cancel` fires during a fetch or a wait
    /// - any non-transient fetch error, or a transient one past the tolerance
    #[allow(clippy::too_many_arguments)]
    pub async fn await_settlement<F, Fut, C, M>(
        &self,
        direction: SettlementDirection,
        id: &str,
        policy: &PollPolicy,
        mut fetch_history: F,
        classify: C,
        match_by: M,
        cancel: &CancellationToken,
    ) -> GatewayResult<SettlementOutcome>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = GatewayResult<Vec<HistoryEntry>>>,
        C: Fn(&HistoryEntry) -> SettlementStatus,
        M: Fn(&HistoryEntry) -> Option<&str>,
    {
        info!(
            venue = %self.venue,
            %direction,
            id,
            max_attempts = policy.max_attempts,
            interval_secs = policy.interval.as_secs(),
            "Awaiting settlement"
        );

        let mut attempts: u32 = 0;
        let mut transient_errors: u32 = 0;
        let mut last_status: Option<String> = None;

        while attempts < policy.max_attempts {
            if cancel.is_cancelled() {
                return Err(self.cancelled(direction, id));
            }

            let fetched = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(self.cancelled(direction, id)),
                result = fetch_history() => result,
            };

            let entries = match fetched {
                Ok(entries) => {
                    transient_errors = 0;
                    entries
                },
                Err(err) if err.is_transient() && transient_errors < policy.max_transient_errors => {
                    transient_errors += 1;
                    warn!(
                        venue = %self.venue,
                        id,
                        error = %err,
                        retry = transient_errors,
                        "Transient error polling history"
                    );
                    self.pause(policy.transient_backoff, direction, id, cancel).await?;
                    continue;
                },
                Err(err) => return Err(err),
            };

            attempts += 1;

            match entries.into_iter().find(|entry| match_by(entry) == Some(id)) {
                Some(entry) => {
                    if last_status.as_deref() != Some(entry.status.as_str()) {
                        info!(
                            venue = %self.venue,
                            %direction,
                            id,
                            previous = ?last_status,
                            current = %entry.status,
                            "Settlement status changed"
                        );
                        self.events.send(GatewayEvent::SettlementStatusChanged {
                            venue: self.venue,
                            direction,
                            id: id.to_string(),
                            previous: last_status.take(),
                            current: entry.status.clone(),
                        });
                        last_status = Some(entry.status.clone());
                    }

                    match classify(&entry) {
                        SettlementStatus::Success { tx_hash } => {
                            let tx_hash = tx_hash.or_else(|| entry.tx_hash.clone());
                            info!(venue = %self.venue, %direction, id, attempts, tx_hash = ?tx_hash, "Settlement succeeded");
                            self.resolved(direction, id, true, attempts);
                            return Ok(SettlementOutcome { entry, tx_hash, attempts });
                        },
                        SettlementStatus::Failure { reason } => {
                            error!(venue = %self.venue, %direction, id, attempts, %reason, "Settlement failed");
                            self.resolved(direction, id, false, attempts);
                            return Err(GatewayError::SettlementFailed {
                                id: id.to_string(),
                                reason,
                            });
                        },
                        SettlementStatus::Pending => {},
                    }
                },
                None => debug!(venue = %self.venue, id, attempts, "Settlement not yet in history"),
            }

            if attempts < policy.max_attempts {
                self.pause(policy.interval, direction, id, cancel).await?;
            }
        }

        error!(venue = %self.venue, %direction, id, attempts, "Settlement timed out");
        Err(GatewayError::SettlementTimeout {
            id: id.to_string(),
            attempts,
        })
    }

    async fn pause(
        &self,
        duration: Duration,
        direction: SettlementDirection,
        id: &str,
        cancel: &CancellationToken,
    ) -> GatewayResult<()> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(self.cancelled(direction, id)),
            _ = self.clock.sleep(duration) => Ok(()),
        }
    }

    fn cancelled(&self, direction: SettlementDirection, id: &str) -> GatewayError {
        warn!(venue = %self.venue, %direction, id, "Settlement wait cancelled");
        GatewayError::Cancelled { id: id.to_string() }
    }

    fn resolved(&self, direction: SettlementDirection, id: &str, success: bool, attempts: u32) {
        self.events.send(GatewayEvent::SettlementResolved {
            venue: self.venue,
            direction,
            id: id.to_string(),
            success,
            attempts,
        });
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stub::ManualClock;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    type Script = Arc<Mutex<VecDeque<GatewayResult<Vec<HistoryEntry>>>>>;

    fn entry(id: &str, status: &str) -> HistoryEntry {
        HistoryEntry {
            id: id.to_string(),
            tx_hash: None,
            status: status.to_string(),
            amount: None,
        }
    }

    fn classify(entry: &HistoryEntry) -> SettlementStatus {
        match entry.status.as_str() {
            "done" => SettlementStatus::Success { tx_hash: Some("0xabc".into()) },
            "failed" => SettlementStatus::Failure { reason: "rejected by risk".into() },
            _ => SettlementStatus::Pending,
        }
    }

    fn by_id(entry: &HistoryEntry) -> Option<&str> {
        Some(entry.id.as_str())
    }

    struct Harness {
        poller: SettlementPoller,
        clock: Arc<ManualClock>,
        events: Arc<EventBus>,
        calls: Arc<AtomicU32>,
        script: Script,
    }

    impl Harness {
        fn new(responses: Vec<GatewayResult<Vec<HistoryEntry>>>) -> Self {
            let clock = Arc::new(ManualClock::new(0));
            let events = Arc::new(EventBus::new(100));
            Self {
                poller: SettlementPoller::new(Venue::Binance, clock.clone(), events.clone()),
                clock,
                events,
                calls: Arc::new(AtomicU32::new(0)),
                script: Arc::new(Mutex::new(responses.into())),
            }
        }

        /// Fetch closure: pops the script, repeating `Pending` once empty.
        fn fetch(&self) -> impl FnMut() -> std::future::Ready<GatewayResult<Vec<HistoryEntry>>> {
            let script = self.script.clone();
            let calls = self.calls.clone();
            move || {
                calls.fetch_add(1, Ordering::SeqCst);
                let next = script
                    .lock()
                    .unwrap()
                    .pop_front()
                    .unwrap_or_else(|| Ok(vec![entry("W1", "pending")]));
                std::future::ready(next)
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    fn pending() -> GatewayResult<Vec<HistoryEntry>> {
        Ok(vec![entry("W1", "pending")])
    }

    fn connection_error() -> GatewayResult<Vec<HistoryEntry>> {
        Err(GatewayError::Connection {
            endpoint: "GET /history".into(),
            message: "connection reset".into(),
        })
    }

    #[tokio::test]
    async fn test_success_after_three_polls() {
        let h = Harness::new(vec![pending(), pending(), Ok(vec![entry("W1", "done")])]);

        let outcome = h
            .poller
            .await_settlement(
                SettlementDirection::Withdrawal,
                "W1",
                &PollPolicy::withdrawal(),
                h.fetch(),
                classify,
                by_id,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.tx_hash.as_deref(), Some("0xabc"));
        assert_eq!(outcome.attempts, 3);
        assert_eq!(h.calls(), 3);
        // Two waits between three polls, none after the last
        assert_eq!(h.clock.sleeps(), vec![Duration::from_secs(10); 2]);
    }

    #[tokio::test]
    async fn test_timeout_after_exactly_max_attempts() {
        let h = Harness::new(Vec::new());

        let err = h
            .poller
            .await_settlement(
                SettlementDirection::Withdrawal,
                "W1",
                &PollPolicy::withdrawal(),
                h.fetch(),
                classify,
                by_id,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        match err {
            GatewayError::SettlementTimeout { id, attempts } => {
                assert_eq!(id, "W1");
                assert_eq!(attempts, 500);
            },
            other => panic!("Expected SettlementTimeout, got {:?}", other),
        }
        assert_eq!(h.calls(), 500);
        assert_eq!(h.clock.sleeps().len(), 499);
    }

    #[tokio::test]
    async fn test_first_failure_is_terminal() {
        let h = Harness::new(vec![pending(), Ok(vec![entry("W1", "failed")]), Ok(vec![entry("W1", "done")])]);

        let err = h
            .poller
            .await_settlement(
                SettlementDirection::Withdrawal,
                "W1",
                &PollPolicy::withdrawal(),
                h.fetch(),
                classify,
                by_id,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            GatewayError::SettlementFailed { ref id, ref reason } if id == "W1" && reason == "rejected by risk"
        ));
        assert_eq!(h.calls(), 2);
    }

    #[tokio::test]
    async fn test_matching_is_exact() {
        // "W10" must not satisfy a wait for "W1"
        let h = Harness::new(vec![
            Ok(vec![entry("W10", "done")]),
            Ok(vec![entry("W10", "done"), entry("W1", "done")]),
        ]);

        let outcome = h
            .poller
            .await_settlement(
                SettlementDirection::Withdrawal,
                "W1",
                &PollPolicy::withdrawal(),
                h.fetch(),
                classify,
                by_id,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.entry.id, "W1");
        assert_eq!(outcome.attempts, 2);
    }

    #[tokio::test]
    async fn test_transient_errors_do_not_consume_attempts() {
        let h = Harness::new(vec![
            connection_error(),
            connection_error(),
            Ok(vec![entry("W1", "done")]),
        ]);

        let outcome = h
            .poller
            .await_settlement(
                SettlementDirection::Deposit,
                "W1",
                &PollPolicy::deposit(),
                h.fetch(),
                classify,
                by_id,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcome.attempts, 1);
        assert_eq!(h.calls(), 3);
        assert_eq!(h.clock.sleeps(), vec![Duration::from_secs(2); 2]);
    }

    #[tokio::test]
    async fn test_transient_errors_past_tolerance_surface() {
        let h = Harness::new(vec![
            connection_error(),
            connection_error(),
            connection_error(),
            connection_error(),
        ]);

        let err = h
            .poller
            .await_settlement(
                SettlementDirection::Withdrawal,
                "W1",
                &PollPolicy::withdrawal(),
                h.fetch(),
                classify,
                by_id,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Connection { .. }));
        assert_eq!(h.calls(), 4);
    }

    #[tokio::test]
    async fn test_non_transient_error_surfaces_immediately() {
        let h = Harness::new(vec![Err(GatewayError::Deserialization {
            endpoint: "GET /history".into(),
            message: "missing field".into(),
            raw_body: "{}".into(),
        })]);

        let err = h
            .poller
            .await_settlement(
                SettlementDirection::Withdrawal,
                "W1",
                &PollPolicy::withdrawal(),
                h.fetch(),
                classify,
                by_id,
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Deserialization { .. }));
        assert_eq!(h.calls(), 1);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_poll() {
        let h = Harness::new(Vec::new());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = h
            .poller
            .await_settlement(
                SettlementDirection::Withdrawal,
                "W1",
                &PollPolicy::withdrawal(),
                h.fetch(),
                classify,
                by_id,
                &cancel,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Cancelled { ref id } if id == "W1"));
        assert_eq!(h.calls(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_during_fetch() {
        let h = Harness::new(Vec::new());
        let cancel = CancellationToken::new();
        let calls = h.calls.clone();
        let trigger = cancel.clone();
        let mut inner = h.fetch();

        // Cancel while the second poll is in flight
        let fetch = move || {
            if calls.load(Ordering::SeqCst) == 1 {
                trigger.cancel();
            }
            inner()
        };

        let err = h
            .poller
            .await_settlement(
                SettlementDirection::Withdrawal,
                "W1",
                &PollPolicy::withdrawal(),
                fetch,
                classify,
                by_id,
                &cancel,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, GatewayError::Cancelled { .. }));
        assert_eq!(h.calls(), 2);
    }

    #[tokio::test]
    async fn test_status_changes_are_published_once() {
        let h = Harness::new(vec![
            pending(),
            pending(),
            Ok(vec![entry("W1", "processing")]),
            Ok(vec![entry("W1", "done")]),
        ]);
        let mut rx = h.events.subscribe();

        h.poller
            .await_settlement(
                SettlementDirection::Withdrawal,
                "W1",
                &PollPolicy::withdrawal(),
                h.fetch(),
                classify,
                by_id,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        let changes: Vec<_> = rx
            .drain()
            .into_iter()
            .filter_map(|e| match e {
                GatewayEvent::SettlementStatusChanged { previous, current, .. } => {
                    Some((previous, current))
                },
                _ => None,
            })
            .collect();

        assert_eq!(
            changes,
            vec![
                (None, "pending".to_string()),
                (Some("pending".to_string()), "processing".to_string()),
                (Some("processing".to_string()), "done".to_string()),
            ]
        );
    }

    #[test]
    fn test_policy_defaults() {
        let w = PollPolicy::withdrawal();
        assert_eq!(w.max_attempts, 500);
        assert_eq!(w.interval, Duration::from_secs(10));

        let d = PollPolicy::for_direction(SettlementDirection::Deposit);
        assert_eq!(d.interval, Duration::from_secs(5));
        assert_eq!(d.max_transient_errors, 3);

        let custom = PollPolicy::deposit().with_max_attempts(3).with_interval(Duration::ZERO);
        assert_eq!(custom.max_attempts, 3);
        assert_eq!(custom.interval, Duration::ZERO);
    }
}
