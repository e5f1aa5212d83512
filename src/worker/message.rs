//! Messages exchanged between the caller, the coordinator and its workers.

use serde::{Deserialize, Serialize};

use crate::matcher::Criteria;

use super::MatchResult;

/// Inbound request: batch size per worker per cycle, and what to look for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub count: u64,
    pub criteria: Criteria,
}

/// Outbound message, one JSON object per event:
/// `{"match":[..64 bytes..]}`, `{"exit":N}` or `{"error":"..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outbound {
    /// Secret seed (bytes 0..32) followed by public key (bytes 32..64)
    Match(Vec<u8>),
    /// A batch of this many keypairs was processed
    Exit(u64),
    /// Non-fatal failure report
    Error(String),
}

/// Coordinator -> worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Command {
    Batch(u64),
    Cancel,
}

/// Worker -> coordinator.
#[derive(Debug)]
pub(crate) enum WorkerEvent {
    Match(MatchResult),
    Exhausted(u64),
    Error(String),
    Retired(String),
}

#[derive(Debug)]
pub(crate) struct Envelope {
    pub worker_id: usize,
    pub event: WorkerEvent,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_json() {
        let req: SearchRequest =
            serde_json::from_str(r#"{"count":1024,"criteria":{"start":"gg"}}"#).unwrap();
        assert_eq!(req.count, 1024);
        assert_eq!(req.criteria, Criteria::Start("gg".into()));

        let pow: SearchRequest = serde_json::from_str(r#"{"count":5,"criteria":{}}"#).unwrap();
        assert_eq!(pow.criteria, Criteria::Pow);
    }

    #[test]
    fn test_outbound_json() {
        assert_eq!(
            serde_json::to_string(&Outbound::Exit(100)).unwrap(),
            r#"{"exit":100}"#
        );
        assert_eq!(
            serde_json::to_string(&Outbound::Error("op1 fail".into())).unwrap(),
            r#"{"error":"op1 fail"}"#
        );
        assert_eq!(
            serde_json::to_string(&Outbound::Match(vec![1, 2, 3])).unwrap(),
            r#"{"match":[1,2,3]}"#
        );
    }
}
