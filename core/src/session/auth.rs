//! Per-transport mutual authentication
//!
//! Once the datagram channel opens, each side sends exactly one challenge
//! and answers exactly one. The transport is authenticated only when both
//! bits are set:
//!
//! - *remote verified*: the remote returned a valid HMAC over **our**
//!   outstanding challenge. This is the security root for everything we
//!   accept from (and reveal to) the remote.
//! - *accepted*: the remote told us our response verified. `auth-success`
//!   is advisory - it sequences the start of replication, it proves
//!   nothing.
//!
//! The machine is pure: it consumes frames and emits actions, the runner
//! does the I/O. Anything unexpected is a [`AuthOutcome::Violation`] and
//! the runner closes the transport; the remote never learns which check
//! failed.

use subtle::ConstantTimeEq;

use cove_proto::peer::{decode_challenge, decode_payload, PeerFrame, CHALLENGE_LEN};

use crate::security::{new_challenge, sign, verify, AuthKey};

/// What the runner must do after feeding a frame to the machine.
#[derive(Debug, PartialEq)]
pub enum AuthOutcome {
    /// Send these frames, in order. `authenticated` flips to true on the
    /// action that completed the handshake.
    Continue {
        send: Vec<PeerFrame>,
        authenticated: bool,
    },
    /// Close the transport. The reason goes to the log, never the wire.
    Violation(&'static str),
}

impl AuthOutcome {
    fn send(frames: Vec<PeerFrame>, authenticated: bool) -> Self {
        AuthOutcome::Continue {
            send: frames,
            authenticated,
        }
    }
}

/// Authentication state for one transport.
#[derive(Debug)]
pub struct AuthExchange {
    /// The challenge we sent; responses must match it exactly.
    out_challenge: [u8; CHALLENGE_LEN],
    /// We answered the remote's (single) challenge.
    answered: bool,
    /// The remote proved knowledge of the room password.
    remote_verified: bool,
    /// The remote accepted our response (advisory).
    accepted: bool,
}

impl AuthExchange {
    pub fn new() -> Self {
        Self {
            out_challenge: new_challenge(),
            answered: false,
            remote_verified: false,
            accepted: false,
        }
    }

    /// The frame to send as soon as the channel opens.
    pub fn opening_frame(&self) -> PeerFrame {
        PeerFrame::challenge(&self.out_challenge)
    }

    /// Both directions verified.
    pub fn is_authenticated(&self) -> bool {
        self.remote_verified && self.accepted
    }

    /// Whether the remote has proven password knowledge. Replication
    /// frames from an unverified remote are violations even if `accepted`
    /// arrives first.
    pub fn remote_verified(&self) -> bool {
        self.remote_verified
    }

    /// Feed one received frame through the machine.
    pub fn on_frame(&mut self, frame: &PeerFrame, auth_key: &AuthKey) -> AuthOutcome {
        match frame {
            PeerFrame::AuthChallenge { challenge } => self.on_challenge(challenge, auth_key),
            PeerFrame::AuthResponse {
                challenge,
                response,
            } => self.on_response(challenge, response, auth_key),
            PeerFrame::AuthSuccess => self.on_success(),
            other if other.is_replication() => {
                AuthOutcome::Violation("replication frame before authentication")
            }
            _ => AuthOutcome::Violation("unexpected frame during authentication"),
        }
    }

    fn on_challenge(&mut self, challenge: &str, auth_key: &AuthKey) -> AuthOutcome {
        if self.answered {
            return AuthOutcome::Violation("second challenge on one transport");
        }
        let Ok(challenge) = decode_challenge(challenge) else {
            return AuthOutcome::Violation("undecodable challenge");
        };
        // Never sign our own outbound challenge: a reflected challenge
        // would let the remote replay our signature back at us.
        if bool::from(challenge.ct_eq(&self.out_challenge)) {
            return AuthOutcome::Violation("reflected challenge");
        }

        self.answered = true;
        let response = sign(&challenge, auth_key);
        AuthOutcome::send(vec![PeerFrame::response(&challenge, &response)], false)
    }

    fn on_response(&mut self, challenge: &str, response: &str, auth_key: &AuthKey) -> AuthOutcome {
        if self.remote_verified {
            return AuthOutcome::Violation("second response on one transport");
        }
        let (Ok(challenge), Ok(response)) =
            (decode_challenge(challenge), decode_payload(response))
        else {
            return AuthOutcome::Violation("undecodable response");
        };
        // Only the challenge we actually issued counts; an unsolicited
        // "valid" signature over some other value proves nothing.
        if !bool::from(challenge.ct_eq(&self.out_challenge)) {
            return AuthOutcome::Violation("response to a challenge we did not send");
        }
        if !verify(&self.out_challenge, &response, auth_key) {
            return AuthOutcome::Violation("challenge response failed verification");
        }

        self.remote_verified = true;
        AuthOutcome::send(vec![PeerFrame::AuthSuccess], self.is_authenticated())
    }

    fn on_success(&mut self) -> AuthOutcome {
        if self.accepted {
            return AuthOutcome::Violation("duplicate auth-success");
        }
        self.accepted = true;
        AuthOutcome::send(Vec::new(), self.is_authenticated())
    }
}

impl Default for AuthExchange {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cove_proto::peer::FrameDecodeError;

    fn key(seed: u8) -> AuthKey {
        AuthKey::from_bytes([seed; 32])
    }

    /// Drive both machines to completion, returning every frame each side
    /// sent. Mirrors two channels delivering frames in order.
    fn run_handshake(
        a: &mut AuthExchange,
        b: &mut AuthExchange,
        a_key: &AuthKey,
        b_key: &AuthKey,
    ) -> Result<(), &'static str> {
        let mut to_b = vec![a.opening_frame()];
        let mut to_a = vec![b.opening_frame()];

        // Alternate until both queues drain.
        while !to_a.is_empty() || !to_b.is_empty() {
            let mut next_to_a = Vec::new();
            let mut next_to_b = Vec::new();
            for frame in to_b.drain(..) {
                match b.on_frame(&frame, b_key) {
                    AuthOutcome::Continue { send, .. } => next_to_a.extend(send),
                    AuthOutcome::Violation(why) => return Err(why),
                }
            }
            for frame in to_a.drain(..) {
                match a.on_frame(&frame, a_key) {
                    AuthOutcome::Continue { send, .. } => next_to_b.extend(send),
                    AuthOutcome::Violation(why) => return Err(why),
                }
            }
            to_a = next_to_a;
            to_b = next_to_b;
        }
        Ok(())
    }

    #[test]
    fn test_mutual_handshake_succeeds() {
        let mut a = AuthExchange::new();
        let mut b = AuthExchange::new();
        run_handshake(&mut a, &mut b, &key(1), &key(1)).unwrap();
        assert!(a.is_authenticated());
        assert!(b.is_authenticated());
    }

    #[test]
    fn test_wrong_password_is_rejected_before_any_data() {
        let mut a = AuthExchange::new();
        let mut b = AuthExchange::new();
        // Different keys: the first verification fails and the handshake
        // dies with a violation, not a distinguishable error.
        let result = run_handshake(&mut a, &mut b, &key(1), &key(2));
        assert_eq!(result, Err("challenge response failed verification"));
        assert!(!a.is_authenticated());
        assert!(!b.is_authenticated());
    }

    #[test]
    fn test_replication_frame_before_auth_is_violation() {
        let mut a = AuthExchange::new();
        assert_eq!(
            a.on_frame(&PeerFrame::SyncRequest, &key(1)),
            AuthOutcome::Violation("replication frame before authentication")
        );
        assert_eq!(
            a.on_frame(&PeerFrame::update(b"bytes"), &key(1)),
            AuthOutcome::Violation("replication frame before authentication")
        );
    }

    #[test]
    fn test_response_to_unissued_challenge_is_violation() {
        let mut a = AuthExchange::new();
        let stray = new_challenge();
        let forged = sign(&stray, &key(1));
        let frame = PeerFrame::response(&stray, &forged);
        // A valid signature over the wrong challenge proves nothing.
        assert_eq!(
            a.on_frame(&frame, &key(1)),
            AuthOutcome::Violation("response to a challenge we did not send")
        );
    }

    #[test]
    fn test_reflected_challenge_is_violation() {
        let mut a = AuthExchange::new();
        let reflected = a.opening_frame();
        assert_eq!(
            a.on_frame(&reflected, &key(1)),
            AuthOutcome::Violation("reflected challenge")
        );
    }

    #[test]
    fn test_second_challenge_is_violation() {
        let mut a = AuthExchange::new();
        let b = AuthExchange::new();
        let c1 = b.opening_frame();
        assert!(matches!(
            a.on_frame(&c1, &key(1)),
            AuthOutcome::Continue { .. }
        ));
        let c2 = AuthExchange::new().opening_frame();
        assert_eq!(
            a.on_frame(&c2, &key(1)),
            AuthOutcome::Violation("second challenge on one transport")
        );
        let _ = b;
    }

    #[test]
    fn test_duplicate_success_is_violation() {
        let mut a = AuthExchange::new();
        assert!(matches!(
            a.on_frame(&PeerFrame::AuthSuccess, &key(1)),
            AuthOutcome::Continue { .. }
        ));
        assert_eq!(
            a.on_frame(&PeerFrame::AuthSuccess, &key(1)),
            AuthOutcome::Violation("duplicate auth-success")
        );
    }

    #[test]
    fn test_undecodable_fields_are_violations() {
        let mut a = AuthExchange::new();
        let bad = PeerFrame::AuthChallenge {
            challenge: "not base64!!!".into(),
        };
        assert_eq!(
            a.on_frame(&bad, &key(1)),
            AuthOutcome::Violation("undecodable challenge")
        );

        let mut a = AuthExchange::new();
        let bad = PeerFrame::AuthResponse {
            challenge: "AAAA".into(),
            response: "AAAA".into(),
        };
        assert_eq!(
            a.on_frame(&bad, &key(1)),
            AuthOutcome::Violation("undecodable response")
        );
    }

    #[test]
    fn test_success_alone_does_not_authenticate() {
        // `auth-success` is advisory: without verifying the remote's
        // response ourselves the transport must stay unauthenticated.
        let mut a = AuthExchange::new();
        match a.on_frame(&PeerFrame::AuthSuccess, &key(1)) {
            AuthOutcome::Continue { authenticated, .. } => assert!(!authenticated),
            other => panic!("unexpected {:?}", other),
        }
        assert!(!a.is_authenticated());
        assert!(!a.remote_verified());
    }

    #[test]
    fn test_frame_decode_error_types_are_stable() {
        // The runner maps these to transport closure; make sure decoding
        // distinguishes malformed frames from bad payloads.
        assert_eq!(
            PeerFrame::decode("junk").unwrap_err(),
            FrameDecodeError::Malformed
        );
    }
}
