//! Connection admission control.
//!
//! Every connection attempt is approved or rejected here before the server
//! creates any session state for it. The payload length bound is checked
//! first and short-circuits, so an oversized payload is never inspected.

use log::debug;
use shared::{ConnectionId, MAX_CONNECT_PAYLOAD};

#[derive(Debug, Clone)]
pub struct ApprovalRequest {
    pub connection_id: ConnectionId,
    /// Opaque, application-defined bytes sent by the client.
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalResponse {
    pub approved: bool,
    /// False when the decision is final. Always false for this controller.
    pub pending: bool,
    pub rejection: Option<AdmissionRejected>,
}

impl ApprovalResponse {
    pub fn accept() -> Self {
        Self {
            approved: true,
            pending: false,
            rejection: None,
        }
    }

    pub fn reject(reason: AdmissionRejected) -> Self {
        Self {
            approved: false,
            pending: false,
            rejection: Some(reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionRejected {
    #[error("approval payload of {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("rejected by admission policy: {0}")]
    Policy(String),
}

/// Content check run after the length bound has passed.
pub trait AdmissionPolicy: Send + Sync {
    fn check(&self, request: &ApprovalRequest) -> Result<(), AdmissionRejected>;
}

/// Accepts any payload within the length bound.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl AdmissionPolicy for AcceptAll {
    fn check(&self, _request: &ApprovalRequest) -> Result<(), AdmissionRejected> {
        Ok(())
    }
}

pub struct AdmissionController {
    max_payload: usize,
    policy: Box<dyn AdmissionPolicy>,
}

impl AdmissionController {
    pub fn new(max_payload: usize) -> Self {
        Self {
            max_payload,
            policy: Box::new(AcceptAll),
        }
    }

    pub fn with_policy(mut self, policy: impl AdmissionPolicy + 'static) -> Self {
        self.policy = Box::new(policy);
        self
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Decides synchronously whether `request` may become a session.
    pub fn approve(&self, request: &ApprovalRequest) -> ApprovalResponse {
        let size = request.payload.len();
        if size > self.max_payload {
            return ApprovalResponse::reject(AdmissionRejected::PayloadTooLarge {
                size,
                max: self.max_payload,
            });
        }

        match self.policy.check(request) {
            Ok(()) => {
                debug!(
                    "Approved connection {} ({} byte payload)",
                    request.connection_id, size
                );
                ApprovalResponse::accept()
            }
            Err(reason) => ApprovalResponse::reject(reason),
        }
    }
}

impl Default for AdmissionController {
    fn default() -> Self {
        Self::new(MAX_CONNECT_PAYLOAD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn request(len: usize) -> ApprovalRequest {
        ApprovalRequest {
            connection_id: ConnectionId(1),
            payload: vec![0xAB; len],
        }
    }

    struct CountingPolicy {
        calls: Arc<AtomicUsize>,
        verdict: Result<(), AdmissionRejected>,
    }

    impl AdmissionPolicy for CountingPolicy {
        fn check(&self, _request: &ApprovalRequest) -> Result<(), AdmissionRejected> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.verdict.clone()
        }
    }

    #[test]
    fn test_payload_at_limit_is_accepted() {
        let controller = AdmissionController::default();

        let response = controller.approve(&request(MAX_CONNECT_PAYLOAD));

        assert_eq!(response, ApprovalResponse::accept());
    }

    #[test]
    fn test_payload_over_limit_is_rejected() {
        let controller = AdmissionController::default();

        let response = controller.approve(&request(MAX_CONNECT_PAYLOAD + 1));

        assert!(!response.approved);
        assert!(!response.pending);
        assert_eq!(
            response.rejection,
            Some(AdmissionRejected::PayloadTooLarge {
                size: 1025,
                max: 1024
            })
        );
    }

    #[test]
    fn test_empty_and_arbitrary_payloads_are_accepted() {
        let controller = AdmissionController::default();

        assert!(controller.approve(&request(0)).approved);
        let garbage = ApprovalRequest {
            connection_id: ConnectionId(2),
            payload: vec![0xFF, 0x00, 0x13, 0x37],
        };
        assert!(controller.approve(&garbage).approved);
    }

    #[test]
    fn test_policy_not_consulted_for_oversized_payload() {
        let calls = Arc::new(AtomicUsize::new(0));
        let controller = AdmissionController::default().with_policy(CountingPolicy {
            calls: Arc::clone(&calls),
            verdict: Ok(()),
        });

        assert!(!controller.approve(&request(4096)).approved);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert!(controller.approve(&request(16)).approved);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_policy_rejection_is_reported() {
        let controller = AdmissionController::default().with_policy(CountingPolicy {
            calls: Arc::new(AtomicUsize::new(0)),
            verdict: Err(AdmissionRejected::Policy("bad token".to_string())),
        });

        let response = controller.approve(&request(8));

        assert_eq!(
            response,
            ApprovalResponse::reject(AdmissionRejected::Policy("bad token".to_string()))
        );
    }
}
