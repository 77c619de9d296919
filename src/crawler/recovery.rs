//! Bounded recovery protocol for stale or invalid identifiers
//!
//! The games endpoint answers with ambiguous payload codes when an identity
//! has gone stale (nickname changes move the mapping) or when a player
//! simply has no games. Recovery re-resolves the originating seed nickname
//! and resumes with a fresh identifier when one appears.
//!
//! Two independent, seed-scoped guardrails bound the loop; whichever trips
//! first halts further recovery for that seed:
//! - at most [`UID_VARIANT_LIMIT`] distinct identifiers are attempted
//! - at most [`RESOLVE_ATTEMPT_LIMIT`] re-resolution calls are issued
//!
//! The controller is a pure step machine: the caller owns the fetch loop and
//! the lookup I/O, the controller owns the decisions. That keeps the
//! termination bound visible here and testable without any network.

use crate::api::AmbiguityReason;
use crate::crawler::resolve::Resolution;
use std::collections::HashSet;

/// Maximum distinct identifiers attempted per seed
pub const UID_VARIANT_LIMIT: usize = 3;

/// Maximum nickname re-resolution calls issued per seed
pub const RESOLVE_ATTEMPT_LIMIT: u32 = 5;

/// Per-seed recovery bookkeeping
///
/// Created when the first ambiguous response for a seed is observed,
/// dropped when the seed's node succeeds or is given up on. Never persisted.
#[derive(Debug, Default)]
pub struct RecoveryState {
    tried: HashSet<String>,
    resolve_attempts: u32,
    recovered: bool,
}

impl RecoveryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a resume with a fresh identifier has already happened
    pub fn has_recovered(&self) -> bool {
        self.recovered
    }

    /// Identifiers attempted so far (for logging)
    pub fn variants_tried(&self) -> usize {
        self.tried.len()
    }

    /// Re-resolution calls issued so far (for logging)
    pub fn resolve_attempts(&self) -> u32 {
        self.resolve_attempts
    }
}

/// What the crawler should do next for this node
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryVerdict {
    /// Fetch the games list again with this identifier
    Resume { uid: String },

    /// The node legitimately has zero games; terminate it gracefully
    EmptyResult,

    /// Give up on this node's sub-traversal; nothing is emitted for it
    Abandon,
}

/// Decision taken before any lookup is issued
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryStep {
    /// Issue one re-resolution of the seed nickname, then call
    /// [`RecoveryController::apply_resolution`]
    Resolve,

    /// A guardrail tripped; stop with this verdict
    Stop(RecoveryVerdict),
}

/// The recovery decision logic, configured with its guardrail ceilings
#[derive(Debug, Clone)]
pub struct RecoveryController {
    uid_variant_limit: usize,
    resolve_attempt_limit: u32,
}

impl Default for RecoveryController {
    fn default() -> Self {
        Self {
            uid_variant_limit: UID_VARIANT_LIMIT,
            resolve_attempt_limit: RESOLVE_ATTEMPT_LIMIT,
        }
    }
}

impl RecoveryController {
    #[cfg(test)]
    fn with_limits(uid_variant_limit: usize, resolve_attempt_limit: u32) -> Self {
        Self {
            uid_variant_limit,
            resolve_attempt_limit,
        }
    }

    /// Records the failing identifier and checks the resolve budget.
    ///
    /// Returns [`RecoveryStep::Resolve`] when the caller may issue one more
    /// lookup; the attempt is counted here so the budget bounds calls
    /// actually issued.
    pub fn begin_attempt(
        &self,
        state: &mut RecoveryState,
        current_uid: &str,
        reason: AmbiguityReason,
    ) -> RecoveryStep {
        state.tried.insert(current_uid.to_string());

        if state.resolve_attempts >= self.resolve_attempt_limit {
            tracing::warn!(
                "Resolve budget exhausted ({} attempts); giving up on recovery",
                state.resolve_attempts
            );
            return RecoveryStep::Stop(exhausted(reason));
        }
        state.resolve_attempts += 1;
        RecoveryStep::Resolve
    }

    /// Folds a fresh resolution into the state and produces the verdict.
    pub fn apply_resolution(
        &self,
        state: &mut RecoveryState,
        current_uid: &str,
        reason: AmbiguityReason,
        resolution: &Resolution,
    ) -> RecoveryVerdict {
        match resolution {
            // The seed nickname no longer maps to anyone: for the "no
            // games" ambiguity that confirms an empty node; for an invalid
            // identifier there is nothing left to recover with.
            Resolution::Unresolved => match reason {
                AmbiguityReason::NoGames => RecoveryVerdict::EmptyResult,
                AmbiguityReason::UidInvalid => RecoveryVerdict::Abandon,
            },
            Resolution::Resolved(fresh) if fresh == current_uid => match reason {
                // Same identifier and "no games": a valid empty result.
                AmbiguityReason::NoGames => RecoveryVerdict::EmptyResult,
                // Same identifier while the server insists it is invalid:
                // eventual consistency may still catch up, so retry. The
                // resolve budget bounds this loop.
                AmbiguityReason::UidInvalid => RecoveryVerdict::Resume {
                    uid: fresh.clone(),
                },
            },
            Resolution::Resolved(fresh) => {
                if !state.tried.contains(fresh) && state.tried.len() >= self.uid_variant_limit {
                    tracing::warn!(
                        "Identifier variant budget exhausted ({} tried); giving up on recovery",
                        state.tried.len()
                    );
                    return exhausted(reason);
                }
                state.recovered = true;
                RecoveryVerdict::Resume {
                    uid: fresh.clone(),
                }
            }
        }
    }
}

/// Exhaustion keeps the ambiguity's meaning: an exhausted "no games" node
/// ends as a valid empty result, an exhausted invalid-identifier node is
/// abandoned.
fn exhausted(reason: AmbiguityReason) -> RecoveryVerdict {
    match reason {
        AmbiguityReason::NoGames => RecoveryVerdict::EmptyResult,
        AmbiguityReason::UidInvalid => RecoveryVerdict::Abandon,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drives the controller the way the crawler does, with a scripted
    /// resolver instead of the network.
    fn drive<F>(controller: &RecoveryController, reason: AmbiguityReason, mut resolver: F) -> Drive
    where
        F: FnMut(u32) -> Resolution,
    {
        let mut state = RecoveryState::new();
        let mut uid = "uid-1".to_string();
        let mut resolve_calls = 0;

        loop {
            match controller.begin_attempt(&mut state, &uid, reason) {
                RecoveryStep::Stop(verdict) => {
                    return Drive {
                        verdict,
                        resolve_calls,
                        distinct_uids_fetched: distinct_fetched(&state, &uid),
                    }
                }
                RecoveryStep::Resolve => {
                    resolve_calls += 1;
                    let resolution = resolver(resolve_calls);
                    match controller.apply_resolution(&mut state, &uid, reason, &resolution) {
                        RecoveryVerdict::Resume { uid: next } => {
                            uid = next;
                            // The re-fetch fails again in these scenarios;
                            // loop back into recovery.
                        }
                        verdict => {
                            return Drive {
                                verdict,
                                resolve_calls,
                                distinct_uids_fetched: distinct_fetched(&state, &uid),
                            }
                        }
                    }
                }
            }
        }
    }

    struct Drive {
        verdict: RecoveryVerdict,
        resolve_calls: u32,
        distinct_uids_fetched: usize,
    }

    /// Identifiers the crawler actually fetched with: everything recorded in
    /// the tried set plus the identifier in hand when recovery stopped.
    fn distinct_fetched(state: &RecoveryState, current: &str) -> usize {
        let mut tried = state.tried.clone();
        tried.insert(current.to_string());
        tried.len()
    }

    #[test]
    fn always_new_identifier_stops_after_exactly_three_variants() {
        let controller = RecoveryController::default();
        let outcome = drive(&controller, AmbiguityReason::UidInvalid, |n| {
            Resolution::Resolved(format!("uid-{}", n + 1))
        });

        assert_eq!(outcome.verdict, RecoveryVerdict::Abandon);
        assert_eq!(outcome.distinct_uids_fetched, UID_VARIANT_LIMIT);
    }

    #[test]
    fn always_same_identifier_stops_after_exactly_five_resolves() {
        let controller = RecoveryController::default();
        let outcome = drive(&controller, AmbiguityReason::UidInvalid, |_| {
            Resolution::Resolved("uid-1".to_string())
        });

        assert_eq!(outcome.verdict, RecoveryVerdict::Abandon);
        assert_eq!(outcome.resolve_calls, RESOLVE_ATTEMPT_LIMIT);
    }

    #[test]
    fn no_games_with_same_identifier_is_a_valid_empty_result() {
        let controller = RecoveryController::default();
        let outcome = drive(&controller, AmbiguityReason::NoGames, |_| {
            Resolution::Resolved("uid-1".to_string())
        });

        assert_eq!(outcome.verdict, RecoveryVerdict::EmptyResult);
        assert_eq!(outcome.resolve_calls, 1);
    }

    #[test]
    fn no_games_with_unresolved_nickname_is_empty() {
        let controller = RecoveryController::default();
        let outcome = drive(&controller, AmbiguityReason::NoGames, |_| {
            Resolution::Unresolved
        });
        assert_eq!(outcome.verdict, RecoveryVerdict::EmptyResult);
    }

    #[test]
    fn uid_invalid_with_unresolved_nickname_abandons() {
        let controller = RecoveryController::default();
        let outcome = drive(&controller, AmbiguityReason::UidInvalid, |_| {
            Resolution::Unresolved
        });
        assert_eq!(outcome.verdict, RecoveryVerdict::Abandon);
    }

    #[test]
    fn fresh_identifier_resumes_and_marks_recovery() {
        let controller = RecoveryController::default();
        let mut state = RecoveryState::new();

        assert_eq!(
            controller.begin_attempt(&mut state, "uid-1", AmbiguityReason::NoGames),
            RecoveryStep::Resolve
        );
        let verdict = controller.apply_resolution(
            &mut state,
            "uid-1",
            AmbiguityReason::NoGames,
            &Resolution::Resolved("uid-2".to_string()),
        );

        assert_eq!(
            verdict,
            RecoveryVerdict::Resume {
                uid: "uid-2".to_string()
            }
        );
        assert!(state.has_recovered());
    }

    #[test]
    fn exhaustion_of_no_games_ends_as_empty_not_abandoned() {
        // Keep getting new identifiers for a "no games" seed: when the
        // variant budget trips, the node ends empty rather than abandoned.
        let controller = RecoveryController::default();
        let outcome = drive(&controller, AmbiguityReason::NoGames, |n| {
            Resolution::Resolved(format!("uid-{}", n + 1))
        });
        assert_eq!(outcome.verdict, RecoveryVerdict::EmptyResult);
    }

    #[test]
    fn limits_are_independent() {
        // With a tiny resolve budget the variant budget never comes into
        // play, and vice versa.
        let controller = RecoveryController::with_limits(100, 2);
        let outcome = drive(&controller, AmbiguityReason::UidInvalid, |n| {
            Resolution::Resolved(format!("uid-{}", n + 1))
        });
        assert_eq!(outcome.resolve_calls, 2);

        let controller = RecoveryController::with_limits(2, 100);
        let outcome = drive(&controller, AmbiguityReason::UidInvalid, |n| {
            Resolution::Resolved(format!("uid-{}", n + 1))
        });
        assert_eq!(outcome.distinct_uids_fetched, 2);
    }

    #[test]
    fn state_is_seed_scoped_and_fresh_per_seed() {
        let controller = RecoveryController::default();
        let mut first = RecoveryState::new();
        let mut second = RecoveryState::new();

        for _ in 0..RESOLVE_ATTEMPT_LIMIT {
            assert_eq!(
                controller.begin_attempt(&mut first, "uid-1", AmbiguityReason::UidInvalid),
                RecoveryStep::Resolve
            );
        }
        assert!(matches!(
            controller.begin_attempt(&mut first, "uid-1", AmbiguityReason::UidInvalid),
            RecoveryStep::Stop(_)
        ));

        // A different seed's state is untouched.
        assert_eq!(
            controller.begin_attempt(&mut second, "uid-9", AmbiguityReason::UidInvalid),
            RecoveryStep::Resolve
        );
    }
}
