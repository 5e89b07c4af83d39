//! Quality Evaluator - decides whether the last response deserves a retry

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::RetrySettings;
use crate::host::ChatMessage;

use super::session::{InitialTrigger, SwipeBaseline};

/// How a retry should be carried out
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetryMechanism {
    /// Regenerate the last assistant turn from scratch
    Regenerate,
    /// Swipe back and forward again to re-run the current variant slot
    SwipeCycle,
    /// Swipe forward to generate a new variant
    SwipeAdvance,
}

impl RetryMechanism {
    /// True when the action changes the displayed swipe index
    pub fn moves_swipe(&self) -> bool {
        matches!(self, RetryMechanism::SwipeCycle | RetryMechanism::SwipeAdvance)
    }
}

/// Which check flagged the response
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum RetryReason {
    /// No assistant turn was produced at all
    UserMessageLast,
    /// A swipe left the index unchanged and produced nothing
    SwipeFailed,
    Empty,
    TooShort { length: usize, min_length: u32 },
    MissingString { required: String },
    TooFast { elapsed_ms: i64, min_ms: u64 },
}

impl fmt::Display for RetryReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryReason::UserMessageLast => write!(f, "last message is from the user"),
            RetryReason::SwipeFailed => write!(f, "swipe produced no new variant"),
            RetryReason::Empty => write!(f, "empty response"),
            RetryReason::TooShort { length, min_length } => {
                write!(f, "response too short ({} < {})", length, min_length)
            }
            RetryReason::MissingString { required } => write!(f, "missing required string \"{}\"", required),
            RetryReason::TooFast { elapsed_ms, min_ms } => {
                write!(f, "generated too fast ({}ms < {}ms)", elapsed_ms, min_ms)
            }
        }
    }
}

/// Outcome of evaluating a response
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Retry {
        mechanism: RetryMechanism,
        reason: RetryReason,
    },
}

impl Verdict {
    pub fn need_retry(&self) -> bool {
        matches!(self, Verdict::Retry { .. })
    }

    pub fn mechanism(&self) -> Option<RetryMechanism> {
        match self {
            Verdict::Accept => None,
            Verdict::Retry { mechanism, .. } => Some(*mechanism),
        }
    }

    fn retry(mechanism: RetryMechanism, reason: RetryReason) -> Self {
        Verdict::Retry { mechanism, reason }
    }
}

/// What the evaluator looks at
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Observation {
    /// Newest message of the conversation
    pub last_message: Option<ChatMessage>,
    /// Current 1-based swipe index of that message
    pub swipe_index: Option<i64>,
}

/// Evaluate the last response against the enabled retry conditions
///
/// Checks run in order and the first match wins. A swipe that did produce a
/// new variant moves `baseline` forward and ends swipe tracking for the session.
pub fn evaluate(settings: &RetrySettings, observation: &Observation, baseline: &mut SwipeBaseline) -> Verdict {
    debug!(?baseline, swipe_index = ?observation.swipe_index, "evaluate: called");
    let text = observation
        .last_message
        .as_ref()
        .map(|m| m.trimmed_text())
        .unwrap_or_default();

    if observation.last_message.as_ref().is_some_and(|m| m.is_user) {
        if !settings.any_condition_enabled() {
            debug!("evaluate: last message from user but all conditions disabled");
            return Verdict::Accept;
        }
        info!("Last message is from the user, generation produced nothing");
        return Verdict::retry(RetryMechanism::Regenerate, RetryReason::UserMessageLast);
    }

    if baseline.initial_trigger == InitialTrigger::SwipeCycle && baseline.last_index >= 0 {
        match observation.swipe_index {
            Some(index) if index == baseline.last_index && text.is_empty() => {
                if !settings.any_condition_enabled() {
                    debug!("evaluate: swipe failed but all conditions disabled");
                    return Verdict::Accept;
                }
                info!(index, "Swipe failed: index unchanged and response empty");
                return Verdict::retry(RetryMechanism::SwipeCycle, RetryReason::SwipeFailed);
            }
            Some(index) if index > baseline.last_index => {
                info!(from = baseline.last_index, to = index, "Swipe produced a new variant");
                baseline.last_index = index;
                baseline.initial_trigger = InitialTrigger::Normal;
            }
            Some(_) => {}
            None => warn!("Swipe index unavailable, skipping swipe failure check"),
        }
    }

    let length = text.chars().count();
    debug!(length, "evaluate: content checks");

    if settings.retry_on_empty && length == 0 {
        return Verdict::retry(RetryMechanism::SwipeAdvance, RetryReason::Empty);
    }

    if settings.retry_on_short && length < settings.min_length as usize {
        return Verdict::retry(
            RetryMechanism::SwipeAdvance,
            RetryReason::TooShort {
                length,
                min_length: settings.min_length,
            },
        );
    }

    if settings.retry_on_missing_string
        && !settings.required_string.is_empty()
        && !text.contains(settings.required_string.as_str())
    {
        return Verdict::retry(
            RetryMechanism::SwipeAdvance,
            RetryReason::MissingString {
                required: settings.required_string.clone(),
            },
        );
    }

    if settings.retry_on_fast_generation
        && let Some(elapsed_ms) = observation.last_message.as_ref().and_then(|m| m.generation_time_ms())
        && elapsed_ms >= 0
        && (elapsed_ms as u64) < settings.min_generation_time_ms
    {
        return Verdict::retry(
            RetryMechanism::SwipeAdvance,
            RetryReason::TooFast {
                elapsed_ms,
                min_ms: settings.min_generation_time_ms,
            },
        );
    }

    Verdict::Accept
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn only(edit: impl FnOnce(&mut RetrySettings)) -> RetrySettings {
        let mut settings = RetrySettings {
            enabled: true,
            retry_on_empty: false,
            retry_on_short: false,
            retry_on_missing_string: false,
            retry_on_fast_generation: false,
            ..Default::default()
        };
        edit(&mut settings);
        settings
    }

    fn observe(message: ChatMessage) -> Observation {
        Observation {
            last_message: Some(message),
            swipe_index: None,
        }
    }

    fn run(settings: &RetrySettings, observation: &Observation) -> Verdict {
        evaluate(settings, observation, &mut SwipeBaseline::default())
    }

    #[test]
    fn test_empty_response() {
        let settings = only(|s| s.retry_on_empty = true);

        let verdict = run(&settings, &observe(ChatMessage::assistant("   \n\t")));
        assert_eq!(verdict.mechanism(), Some(RetryMechanism::SwipeAdvance));

        assert!(!run(&settings, &observe(ChatMessage::assistant("x"))).need_retry());
    }

    #[test]
    fn test_missing_message_counts_as_empty() {
        let settings = only(|s| s.retry_on_empty = true);
        assert!(run(&settings, &Observation::default()).need_retry());
    }

    #[test]
    fn test_short_response_boundary() {
        let settings = only(|s| {
            s.retry_on_short = true;
            s.min_length = 10;
        });

        let verdict = run(&settings, &observe(ChatMessage::assistant("hi")));
        assert_eq!(
            verdict,
            Verdict::Retry {
                mechanism: RetryMechanism::SwipeAdvance,
                reason: RetryReason::TooShort {
                    length: 2,
                    min_length: 10
                },
            }
        );

        assert!(!run(&settings, &observe(ChatMessage::assistant("0123456789"))).need_retry());
    }

    #[test]
    fn test_length_counts_characters_after_trim() {
        let settings = only(|s| {
            s.retry_on_short = true;
            s.min_length = 5;
        });

        // Five characters, more than five bytes
        assert!(!run(&settings, &observe(ChatMessage::assistant("  héllö  "))).need_retry());
        assert!(run(&settings, &observe(ChatMessage::assistant("  日本  "))).need_retry());
    }

    #[test]
    fn test_missing_required_string() {
        let settings = only(|s| {
            s.retry_on_missing_string = true;
            s.required_string = "</answer>".to_string();
        });

        assert!(run(&settings, &observe(ChatMessage::assistant("thinking..."))).need_retry());
        assert!(!run(&settings, &observe(ChatMessage::assistant("42 </answer>"))).need_retry());
    }

    #[test]
    fn test_empty_required_string_never_triggers() {
        let settings = only(|s| s.retry_on_missing_string = true);
        assert!(!run(&settings, &observe(ChatMessage::assistant("anything"))).need_retry());
    }

    #[test]
    fn test_fast_generation() {
        let settings = only(|s| {
            s.retry_on_fast_generation = true;
            s.min_generation_time_ms = 10_000;
        });

        let fast = ChatMessage::assistant("done").with_timing(1000, 5000);
        assert_eq!(
            run(&settings, &observe(fast)),
            Verdict::Retry {
                mechanism: RetryMechanism::SwipeAdvance,
                reason: RetryReason::TooFast {
                    elapsed_ms: 4000,
                    min_ms: 10_000
                },
            }
        );

        let slow = ChatMessage::assistant("done").with_timing(1000, 12_000);
        assert!(!run(&settings, &observe(slow)).need_retry());
    }

    #[test]
    fn test_fast_generation_needs_both_timestamps() {
        let settings = only(|s| s.retry_on_fast_generation = true);

        let mut message = ChatMessage::assistant("done");
        message.gen_started = Some(1000);
        assert!(!run(&settings, &observe(message)).need_retry());

        let backwards = ChatMessage::assistant("done").with_timing(5000, 1000);
        assert!(!run(&settings, &observe(backwards)).need_retry());
    }

    #[test]
    fn test_first_match_wins() {
        let settings = only(|s| {
            s.retry_on_empty = true;
            s.retry_on_short = true;
        });

        let verdict = run(&settings, &observe(ChatMessage::assistant("")));
        assert_eq!(
            verdict,
            Verdict::Retry {
                mechanism: RetryMechanism::SwipeAdvance,
                reason: RetryReason::Empty
            }
        );
    }

    #[test]
    fn test_user_message_last_regenerates() {
        let settings = only(|s| s.retry_on_fast_generation = true);

        let verdict = run(&settings, &observe(ChatMessage::user("hello?")));
        assert_eq!(
            verdict,
            Verdict::Retry {
                mechanism: RetryMechanism::Regenerate,
                reason: RetryReason::UserMessageLast
            }
        );
    }

    #[test]
    fn test_user_message_last_with_all_conditions_disabled() {
        let settings = only(|_| {});
        assert_eq!(run(&settings, &observe(ChatMessage::user("hello?"))), Verdict::Accept);
    }

    #[test]
    fn test_failed_swipe_cycles() {
        let settings = only(|s| s.retry_on_short = true);
        let mut baseline = SwipeBaseline {
            initial_trigger: InitialTrigger::SwipeCycle,
            last_index: 2,
        };
        let observation = Observation {
            last_message: Some(ChatMessage::assistant("")),
            swipe_index: Some(2),
        };

        let verdict = evaluate(&settings, &observation, &mut baseline);

        assert_eq!(verdict.mechanism(), Some(RetryMechanism::SwipeCycle));
        assert_eq!(baseline.last_index, 2);
    }

    #[test]
    fn test_successful_swipe_moves_baseline() {
        let settings = only(|s| s.retry_on_empty = true);
        let mut baseline = SwipeBaseline {
            initial_trigger: InitialTrigger::SwipeCycle,
            last_index: 2,
        };
        let observation = Observation {
            last_message: Some(ChatMessage::assistant("a fine answer")),
            swipe_index: Some(3),
        };

        assert_eq!(evaluate(&settings, &observation, &mut baseline), Verdict::Accept);
        assert_eq!(baseline.last_index, 3);
        assert_eq!(baseline.initial_trigger, InitialTrigger::Normal);
    }

    #[test]
    fn test_new_empty_variant_falls_through_to_content_checks() {
        let settings = only(|s| s.retry_on_empty = true);
        let mut baseline = SwipeBaseline {
            initial_trigger: InitialTrigger::SwipeCycle,
            last_index: 2,
        };
        let observation = Observation {
            last_message: Some(ChatMessage::assistant("")),
            swipe_index: Some(3),
        };

        let verdict = evaluate(&settings, &observation, &mut baseline);
        assert_eq!(verdict.mechanism(), Some(RetryMechanism::SwipeAdvance));
        assert_eq!(baseline.last_index, 3);
    }

    #[test]
    fn test_swipe_check_skipped_without_baseline() {
        let settings = only(|s| s.retry_on_short = true);
        let mut baseline = SwipeBaseline {
            initial_trigger: InitialTrigger::SwipeCycle,
            last_index: -1,
        };
        let observation = Observation {
            last_message: Some(ChatMessage::assistant("")),
            swipe_index: Some(-1),
        };

        let verdict = evaluate(&settings, &observation, &mut baseline);
        assert_eq!(verdict.mechanism(), Some(RetryMechanism::SwipeAdvance));
    }

    #[test]
    fn test_reason_display() {
        let reason = RetryReason::TooFast {
            elapsed_ms: 4000,
            min_ms: 10_000,
        };
        assert_eq!(reason.to_string(), "generated too fast (4000ms < 10000ms)");
    }

    proptest! {
        #[test]
        fn prop_all_conditions_disabled_never_retries(
            text in ".{0,40}",
            is_user in any::<bool>(),
            started in proptest::option::of(0i64..100_000),
            finished in proptest::option::of(0i64..100_000),
            swipe_index in proptest::option::of(-1i64..5),
            last_index in -1i64..5,
            swipe_started in any::<bool>(),
        ) {
            let settings = only(|_| {});
            let mut message = ChatMessage::assistant(text);
            message.is_user = is_user;
            message.gen_started = started;
            message.gen_finished = finished;
            let observation = Observation { last_message: Some(message), swipe_index };
            let mut baseline = SwipeBaseline {
                initial_trigger: if swipe_started { InitialTrigger::SwipeCycle } else { InitialTrigger::Normal },
                last_index,
            };

            prop_assert!(!evaluate(&settings, &observation, &mut baseline).need_retry());
        }

        #[test]
        fn prop_short_check_matches_length(text in "\\PC{0,30}", min_length in 0u32..30) {
            let settings = only(|s| {
                s.retry_on_short = true;
                s.min_length = min_length;
            });
            let message = ChatMessage::assistant(text.clone());
            let expected = text.trim().chars().count() < min_length as usize;

            prop_assert_eq!(run(&settings, &observe(message)).need_retry(), expected);
        }
    }
}
