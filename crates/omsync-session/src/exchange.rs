//! One request/response exchange with the controller.

use std::time::{Duration, Instant};

use bytes::BytesMut;
use omsync_frame::{
    decode_payload, encode_command, om_query, scan, BraceMode, Payload, ScanOutcome, Verbosity,
};
use omsync_model::{Snapshot, UpdateMode};
use omsync_transport::{Clock, Transport};
use tracing::{debug, trace, warn};

use crate::config::NullResultPolicy;
use crate::error::Result;

/// An object-model request in flight.
///
/// Only one exists at a time; it lives for a single request/response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingExchange {
    /// Key the reply envelope must carry.
    pub key: String,
    /// Flag the request was sent with.
    pub verbosity: Verbosity,
    /// Send time plus the request timeout.
    pub deadline: Instant,
}

impl PendingExchange {
    /// Decode `blocks` in order and return the first envelope for this key.
    ///
    /// Candidates that fail to decode, or that belong to another key, are
    /// skipped.
    pub fn select(&self, blocks: &[String]) -> Option<Payload> {
        blocks.iter().find_map(|block| match decode_payload(block) {
            Ok(payload) if payload.key == self.key => Some(payload),
            Ok(payload) => {
                debug!(
                    expected = %self.key,
                    got = %payload.key,
                    "ignoring reply for another key"
                );
                None
            }
            Err(err) => {
                debug!(error = %err, "skipping undecodable candidate");
                None
            }
        })
    }
}

/// Result of fetching one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The result was folded into the snapshot.
    Applied(UpdateMode),
    /// A frequent reply with a `null` result: nothing new.
    Unchanged,
    /// A verbose `null` result accepted by [`NullResultPolicy::Accept`].
    NullAccepted,
    /// A verbose `null` result refused by [`NullResultPolicy::Fail`].
    NullRejected,
    /// No matching envelope arrived before the deadline.
    NoReply,
}

impl FetchOutcome {
    pub fn is_success(self) -> bool {
        matches!(
            self,
            FetchOutcome::Applied(_) | FetchOutcome::Unchanged | FetchOutcome::NullAccepted
        )
    }
}

/// Transport plus clock, with command framing.
pub(crate) struct Link<T, C> {
    transport: T,
    clock: C,
    brace_mode: BraceMode,
    buf: BytesMut,
}

impl<T: Transport, C: Clock> Link<T, C> {
    pub(crate) fn new(transport: T, clock: C, brace_mode: BraceMode) -> Self {
        Self {
            transport,
            clock,
            brace_mode,
            buf: BytesMut::with_capacity(64),
        }
    }

    pub(crate) fn transport(&self) -> &T {
        &self.transport
    }

    pub(crate) fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub(crate) fn into_transport(self) -> T {
        self.transport
    }

    pub(crate) fn clock(&self) -> &C {
        &self.clock
    }

    /// Write raw bytes, unframed.
    pub(crate) fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.transport.write_all(bytes)?;
        self.transport.flush()?;
        Ok(())
    }

    /// Drop unread input, then frame and send `command`.
    pub(crate) fn send(&mut self, command: &str) -> Result<()> {
        self.transport.discard_input()?;
        self.buf.clear();
        encode_command(command, &mut self.buf);
        trace!(command, "sending");
        self.transport.write_all(&self.buf)?;
        self.transport.flush()?;
        Ok(())
    }

    /// Read one reply until the terminator or `deadline`.
    pub(crate) fn receive(&mut self, deadline: Instant) -> Result<ScanOutcome> {
        Ok(scan(
            &mut self.transport,
            &self.clock,
            deadline,
            self.brace_mode,
        )?)
    }

    /// Send `command` and read its reply, allowing `timeout` for it.
    pub(crate) fn exchange(&mut self, command: &str, timeout: Duration) -> Result<ScanOutcome> {
        self.send(command)?;
        let deadline = self.clock.now() + timeout;
        self.receive(deadline)
    }

    /// Query one object-model key and fold the reply into `snapshot`.
    ///
    /// The reply's own flags decide between merge and replace. `Err` is
    /// returned only when the link fails.
    pub(crate) fn fetch(
        &mut self,
        snapshot: &mut Snapshot,
        key: &str,
        verbosity: Verbosity,
        timeout: Duration,
        null_result: NullResultPolicy,
    ) -> Result<FetchOutcome> {
        self.send(&om_query(key, verbosity))?;
        let pending = PendingExchange {
            key: key.to_string(),
            verbosity,
            deadline: self.clock.now() + timeout,
        };
        let reply = self.receive(pending.deadline)?;

        let Some(payload) = pending.select(&reply.blocks) else {
            warn!(
                key,
                verbosity = ?pending.verbosity,
                terminated = reply.terminated,
                "no reply for key"
            );
            return Ok(FetchOutcome::NoReply);
        };

        let outcome = apply_payload(snapshot, payload, null_result);
        if outcome == FetchOutcome::NullRejected {
            warn!(key, "verbose reply carried a null result");
        }
        Ok(outcome)
    }
}

/// Fold one decoded envelope into the snapshot.
fn apply_payload(
    snapshot: &mut Snapshot,
    payload: Payload,
    null_result: NullResultPolicy,
) -> FetchOutcome {
    let mode = if payload.is_frequent() {
        UpdateMode::Merge
    } else {
        UpdateMode::Replace
    };

    if payload.result.is_null() {
        return match (mode, null_result) {
            (UpdateMode::Merge, _) => FetchOutcome::Unchanged,
            (UpdateMode::Replace, NullResultPolicy::Accept) => FetchOutcome::NullAccepted,
            (UpdateMode::Replace, NullResultPolicy::Fail) => FetchOutcome::NullRejected,
        };
    }

    snapshot.apply(&payload.key, payload.result, mode);
    FetchOutcome::Applied(mode)
}

#[cfg(test)]
mod tests {
    use omsync_frame::frame;
    use omsync_transport::{ManualClock, MockTransport};
    use serde_json::json;

    use super::*;
    use crate::config::NullResultPolicy::{Accept, Fail};

    const TIMEOUT: Duration = Duration::from_millis(500);

    fn link_with(reply: &'static str) -> Link<MockTransport, ManualClock> {
        let clock = ManualClock::new();
        let mock =
            MockTransport::new(clock.clone()).with_responder(move |_| reply.as_bytes().to_vec());
        Link::new(mock, clock, BraceMode::Naive)
    }

    fn fetch_job(
        link: &mut Link<MockTransport, ManualClock>,
        snapshot: &mut Snapshot,
        verbosity: Verbosity,
        null_result: NullResultPolicy,
    ) -> FetchOutcome {
        link.fetch(snapshot, "job", verbosity, TIMEOUT, null_result).unwrap()
    }

    fn pending(key: &str) -> PendingExchange {
        PendingExchange {
            key: key.to_string(),
            verbosity: Verbosity::Verbose,
            deadline: ManualClock::new().now(),
        }
    }

    #[test]
    fn select_skips_garbage_and_other_keys() {
        let blocks = vec![
            "{not json}".to_string(),
            r#"{"key":"heat","flags":"v","result":1}"#.to_string(),
            r#"{"status":"idle"}"#.to_string(),
            r#"{"key":"job","flags":"v","result":2}"#.to_string(),
            r#"{"key":"job","flags":"v","result":3}"#.to_string(),
        ];
        let payload = pending("job").select(&blocks).unwrap();
        assert_eq!(payload.result, json!(2));
        assert!(pending("tools").select(&blocks).is_none());
    }

    #[test]
    fn fetch_sends_framed_query_and_replaces() {
        let mut link = link_with(
            "{\"key\":\"job\",\"flags\":\"vnd99\",\"result\":{\"file\":\"a.g\"}}\r\nok\r\n",
        );
        let mut snapshot = Snapshot::new();
        snapshot.apply("job", json!({"file": "old.g", "layer": 3}), UpdateMode::Replace);

        let outcome = fetch_job(&mut link, &mut snapshot, Verbosity::Verbose, Fail);

        assert_eq!(outcome, FetchOutcome::Applied(UpdateMode::Replace));
        assert_eq!(snapshot.get("job"), Some(&json!({"file": "a.g"})));
        assert_eq!(
            link.transport().written(),
            frame(r#"M409 F"vnd99" K"job""#).as_ref()
        );
    }

    #[test]
    fn frequent_reply_merges() {
        let mut link =
            link_with("{\"key\":\"job\",\"flags\":\"fnd99\",\"result\":{\"layer\":4}}ok");
        let mut snapshot = Snapshot::new();
        snapshot.apply("job", json!({"file": "a.g", "layer": 3}), UpdateMode::Replace);

        let outcome = fetch_job(&mut link, &mut snapshot, Verbosity::Frequent, Fail);

        assert_eq!(outcome, FetchOutcome::Applied(UpdateMode::Merge));
        assert_eq!(snapshot.get("job"), Some(&json!({"file": "a.g", "layer": 4})));
    }

    #[test]
    fn null_results_follow_policy() {
        let mut snapshot = Snapshot::new();
        snapshot.apply("job", json!({"file": "a.g"}), UpdateMode::Replace);

        let mut link = link_with("{\"key\":\"job\",\"flags\":\"fnd99\",\"result\":null}ok");
        let outcome = fetch_job(&mut link, &mut snapshot, Verbosity::Frequent, Fail);
        assert_eq!(outcome, FetchOutcome::Unchanged);
        assert!(outcome.is_success());

        let mut link = link_with("{\"key\":\"job\",\"flags\":\"vnd99\"}ok");
        let outcome = fetch_job(&mut link, &mut snapshot, Verbosity::Verbose, Fail);
        assert_eq!(outcome, FetchOutcome::NullRejected);
        assert!(!outcome.is_success());

        let outcome = fetch_job(&mut link, &mut snapshot, Verbosity::Verbose, Accept);
        assert_eq!(outcome, FetchOutcome::NullAccepted);
        assert!(outcome.is_success());

        assert_eq!(snapshot.get("job"), Some(&json!({"file": "a.g"})));
    }

    #[test]
    fn silence_times_out_without_touching_snapshot() {
        let clock = ManualClock::new();
        let mock = MockTransport::new(clock.clone());
        let mut link = Link::new(mock, clock.clone(), BraceMode::Naive);
        let mut snapshot = Snapshot::new();
        let start = clock.now();

        let outcome = link
            .fetch(&mut snapshot, "heat", Verbosity::Verbose, TIMEOUT, NullResultPolicy::Fail)
            .unwrap();

        assert_eq!(outcome, FetchOutcome::NoReply);
        assert!(snapshot.is_empty());
        assert_eq!(clock.now() - start, TIMEOUT);
    }

    #[test]
    fn stale_input_is_discarded_before_sending() {
        let mut link = link_with("{\"key\":\"job\",\"flags\":\"vnd99\",\"result\":1}ok");
        link.transport_mut()
            .push_input(b"{\"key\":\"job\",\"flags\":\"vnd99\",\"result\":0}ok");
        let mut snapshot = Snapshot::new();

        fetch_job(&mut link, &mut snapshot, Verbosity::Verbose, Fail);

        assert_eq!(snapshot.get("job"), Some(&json!(1)));
    }

    #[test]
    fn write_failure_is_an_error() {
        let mut link = link_with("ok");
        link.transport_mut().set_fail_writes(true);
        let mut snapshot = Snapshot::new();
        let err = link
            .fetch(&mut snapshot, "job", Verbosity::Verbose, TIMEOUT, NullResultPolicy::Fail)
            .unwrap_err();
        assert!(err.is_transport());
    }
}
