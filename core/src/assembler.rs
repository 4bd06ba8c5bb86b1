use crate::decoder::Token;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Where the assembler is within a transmission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyState {
    /// Waiting for a start sentinel
    Idle,
    /// Start sentinel seen, accumulating symbols until the end sentinel
    Collecting,
    /// Message was too long; skipping the rest of it up to its end sentinel
    Discarding,
}

/// Bounds on a single message
///
/// Without them a transmission that loses its end sentinel would keep the
/// assembler collecting forever. `None` disables a bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyLimits {
    pub max_symbols: Option<usize>,
    /// Longest time allowed in `Collecting`, in milliseconds of audio
    pub max_collect_ms: Option<u64>,
}

impl Default for AssemblyLimits {
    fn default() -> Self {
        Self {
            max_symbols: Some(crate::MAX_MESSAGE_SYMBOLS),
            max_collect_ms: Some(crate::MAX_COLLECT_MS),
        }
    }
}

impl AssemblyLimits {
    /// No bounds at all: a lost end sentinel leaves the assembler collecting
    pub fn unbounded() -> Self {
        Self {
            max_symbols: None,
            max_collect_ms: None,
        }
    }
}

/// Receiver-side decode state for one listen session
///
/// Idle -> (sentinel) -> Collecting -> (sentinel) -> message delivered -> Idle
///
/// A message over the symbol limit moves Collecting -> Discarding, and its
/// own end sentinel then returns the machine to Idle without a delivery.
///
/// Completion is reported through the return value of [`MessageAssembler::push`];
/// the assembler is back in `Idle` by the time the caller sees the message, so
/// one session can receive any number of transmissions.
#[derive(Debug)]
pub struct MessageAssembler {
    state: AssemblyState,
    buffer: String,
    collecting_for: Duration,
    limits: AssemblyLimits,
    abandoned: u64,
}

impl MessageAssembler {
    pub fn new(limits: AssemblyLimits) -> Self {
        Self {
            state: AssemblyState::Idle,
            buffer: String::with_capacity(limits.max_symbols.unwrap_or(crate::MAX_MESSAGE_SYMBOLS)),
            collecting_for: Duration::ZERO,
            limits,
            abandoned: 0,
        }
    }

    pub fn state(&self) -> AssemblyState {
        self.state
    }

    /// Characters collected so far for the message in progress
    pub fn partial(&self) -> &str {
        &self.buffer
    }

    /// Messages dropped for exceeding the limits
    pub fn abandoned(&self) -> u64 {
        self.abandoned
    }

    /// Feed one decoded token (`None` = no symbol in this slot).
    ///
    /// Returns the finished message when `token` is the closing sentinel.
    pub fn push(&mut self, token: Option<Token>) -> Option<String> {
        match (self.state, token) {
            (AssemblyState::Idle, Some(Token::FrameMark)) => {
                log::debug!("Start sentinel detected");
                self.state = AssemblyState::Collecting;
                self.buffer.clear();
                self.collecting_for = Duration::ZERO;
                None
            }
            (AssemblyState::Idle, _) => None,
            (AssemblyState::Collecting, Some(Token::FrameMark)) => {
                let message = self.buffer.clone();
                log::debug!("End sentinel detected, message of {} symbols", message.len());
                self.reset();
                Some(message)
            }
            (AssemblyState::Collecting, Some(Token::Symbol(c))) => {
                if let Some(max) = self.limits.max_symbols {
                    if self.buffer.len() >= max {
                        self.abandon("symbol limit reached");
                        // The transmission is still playing; its end sentinel
                        // must not be taken for the next start sentinel
                        self.state = AssemblyState::Discarding;
                        return None;
                    }
                }
                self.buffer.push(c);
                None
            }
            (AssemblyState::Collecting, None) => None,
            (AssemblyState::Discarding, Some(Token::FrameMark)) => {
                log::debug!("End sentinel of abandoned message detected");
                self.reset();
                None
            }
            (AssemblyState::Discarding, Some(Token::Symbol(_))) => {
                // Quiet time only counts once the overlong transmission stops
                self.collecting_for = Duration::ZERO;
                None
            }
            (AssemblyState::Discarding, None) => None,
        }
    }

    /// Account for `elapsed` audio time.
    ///
    /// Returns `true` when the message in progress was abandoned for staying
    /// in `Collecting` past the limit. While `Discarding`, the same limit
    /// applies to the time since the last symbol, so a lost end sentinel
    /// cannot keep the assembler skipping forever.
    pub fn advance(&mut self, elapsed: Duration) -> bool {
        if self.state == AssemblyState::Idle {
            return false;
        }

        self.collecting_for += elapsed;
        let expired = matches!(
            self.limits.max_collect_ms,
            Some(max) if self.collecting_for > Duration::from_millis(max)
        );
        if !expired {
            return false;
        }

        if self.state == AssemblyState::Discarding {
            log::debug!("Abandoned message never closed, back to idle");
            self.reset();
            return false;
        }
        self.abandon("end sentinel never arrived");
        true
    }

    /// Drop any message in progress and return to `Idle`
    pub fn reset(&mut self) {
        self.state = AssemblyState::Idle;
        self.buffer.clear();
        self.collecting_for = Duration::ZERO;
    }

    fn abandon(&mut self, reason: &str) {
        log::warn!(
            "Abandoning message after {} symbols: {}",
            self.buffer.len(),
            reason
        );
        self.abandoned += 1;
        self.reset();
    }
}

impl Default for MessageAssembler {
    fn default() -> Self {
        Self::new(AssemblyLimits::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(assembler: &mut MessageAssembler, tokens: &[Option<Token>]) -> Vec<String> {
        tokens.iter().filter_map(|&t| assembler.push(t)).collect()
    }

    #[test]
    fn test_sentinel_a_b_sentinel() {
        let mut assembler = MessageAssembler::default();
        let messages = feed(
            &mut assembler,
            &[
                Some(Token::FrameMark),
                Some(Token::Symbol('a')),
                Some(Token::Symbol('b')),
                Some(Token::FrameMark),
            ],
        );
        assert_eq!(messages, vec!["ab".to_string()]);
        assert_eq!(assembler.state(), AssemblyState::Idle);
    }

    #[test]
    fn test_symbols_without_sentinel_never_complete() {
        let mut assembler = MessageAssembler::default();
        let messages = feed(
            &mut assembler,
            &[Some(Token::Symbol('a')), Some(Token::Symbol('b')), None],
        );
        assert!(messages.is_empty());
        assert_eq!(assembler.state(), AssemblyState::Idle);
        assert_eq!(assembler.partial(), "");
    }

    #[test]
    fn test_no_symbol_is_ignored_while_collecting() {
        let mut assembler = MessageAssembler::default();
        let messages = feed(
            &mut assembler,
            &[
                None,
                Some(Token::FrameMark),
                None,
                Some(Token::Symbol('x')),
                None,
                None,
                Some(Token::Symbol('y')),
                Some(Token::FrameMark),
            ],
        );
        assert_eq!(messages, vec!["xy".to_string()]);
    }

    #[test]
    fn test_heartbeat_delivers_empty_message() {
        let mut assembler = MessageAssembler::default();
        let messages = feed(&mut assembler, &[Some(Token::FrameMark), Some(Token::FrameMark)]);
        assert_eq!(messages, vec![String::new()]);
    }

    #[test]
    fn test_back_to_back_transmissions() {
        let mut assembler = MessageAssembler::default();
        let messages = feed(
            &mut assembler,
            &[
                Some(Token::FrameMark),
                Some(Token::Symbol('1')),
                Some(Token::FrameMark),
                Some(Token::Symbol('z')),
                Some(Token::FrameMark),
                Some(Token::Symbol('2')),
                Some(Token::FrameMark),
            ],
        );
        assert_eq!(messages, vec!["1".to_string(), "2".to_string()]);
    }

    #[test]
    fn test_partial_tracks_progress() {
        let mut assembler = MessageAssembler::default();
        feed(&mut assembler, &[Some(Token::FrameMark), Some(Token::Symbol('q'))]);
        assert_eq!(assembler.state(), AssemblyState::Collecting);
        assert_eq!(assembler.partial(), "q");
    }

    #[test]
    fn test_symbol_limit_abandons_message() {
        let mut assembler = MessageAssembler::new(AssemblyLimits {
            max_symbols: Some(2),
            max_collect_ms: None,
        });
        let messages = feed(
            &mut assembler,
            &[
                Some(Token::FrameMark),
                Some(Token::Symbol('a')),
                Some(Token::Symbol('b')),
                Some(Token::Symbol('c')),
            ],
        );
        assert!(messages.is_empty());
        assert_eq!(assembler.state(), AssemblyState::Discarding);
        assert_eq!(assembler.partial(), "");
        assert_eq!(assembler.abandoned(), 1);

        // The rest of the overlong message, then its end sentinel
        let messages = feed(
            &mut assembler,
            &[Some(Token::Symbol('e')), None, Some(Token::FrameMark)],
        );
        assert!(messages.is_empty());
        assert_eq!(assembler.state(), AssemblyState::Idle);

        let messages = feed(
            &mut assembler,
            &[Some(Token::FrameMark), Some(Token::Symbol('d')), Some(Token::FrameMark)],
        );
        assert_eq!(messages, vec!["d".to_string()]);
    }

    #[test]
    fn test_overlong_message_does_not_swallow_the_next_one() {
        let mut assembler = MessageAssembler::default();
        let mut tokens = vec![Some(Token::FrameMark)];
        tokens.extend(std::iter::repeat(Some(Token::Symbol('x'))).take(70));
        tokens.extend([
            Some(Token::FrameMark),
            Some(Token::FrameMark),
            Some(Token::Symbol('a')),
            Some(Token::Symbol('b')),
            Some(Token::FrameMark),
        ]);

        let messages = feed(&mut assembler, &tokens);
        assert_eq!(messages, vec!["ab".to_string()]);
        assert_eq!(assembler.state(), AssemblyState::Idle);
        assert_eq!(assembler.abandoned(), 1);
    }

    #[test]
    fn test_discarding_gives_up_after_quiet_period() {
        let mut assembler = MessageAssembler::new(AssemblyLimits {
            max_symbols: Some(1),
            max_collect_ms: Some(500),
        });
        feed(
            &mut assembler,
            &[Some(Token::FrameMark), Some(Token::Symbol('a')), Some(Token::Symbol('b'))],
        );
        assert_eq!(assembler.state(), AssemblyState::Discarding);

        // Symbols keep the overlong transmission alive
        assert!(!assembler.advance(Duration::from_millis(400)));
        assembler.push(Some(Token::Symbol('c')));
        assert!(!assembler.advance(Duration::from_millis(400)));
        assert_eq!(assembler.state(), AssemblyState::Discarding);

        // Its end sentinel was lost: silence eventually re-arms the assembler
        assert!(!assembler.advance(Duration::from_millis(200)));
        assert_eq!(assembler.state(), AssemblyState::Idle);
        assert_eq!(assembler.abandoned(), 1);

        let messages = feed(
            &mut assembler,
            &[Some(Token::FrameMark), Some(Token::FrameMark)],
        );
        assert_eq!(messages, vec![String::new()]);
    }

    #[test]
    fn test_collect_timeout_abandons_message() {
        let mut assembler = MessageAssembler::new(AssemblyLimits {
            max_symbols: None,
            max_collect_ms: Some(500),
        });
        assembler.push(Some(Token::FrameMark));
        assembler.push(Some(Token::Symbol('a')));

        assert!(!assembler.advance(Duration::from_millis(300)));
        assert_eq!(assembler.state(), AssemblyState::Collecting);
        assert!(assembler.advance(Duration::from_millis(300)));
        assert_eq!(assembler.state(), AssemblyState::Idle);
        assert_eq!(assembler.abandoned(), 1);
    }

    #[test]
    fn test_time_only_counts_while_collecting() {
        let mut assembler = MessageAssembler::new(AssemblyLimits {
            max_symbols: None,
            max_collect_ms: Some(100),
        });
        assert!(!assembler.advance(Duration::from_secs(60)));
        assembler.push(Some(Token::FrameMark));
        assert!(!assembler.advance(Duration::from_millis(50)));
        assert_eq!(assembler.push(Some(Token::FrameMark)), Some(String::new()));
        assert!(!assembler.advance(Duration::from_secs(60)));
    }

    #[test]
    fn test_unbounded_collects_forever() {
        let mut assembler = MessageAssembler::new(AssemblyLimits::unbounded());
        assembler.push(Some(Token::FrameMark));
        for _ in 0..1000 {
            assembler.push(Some(Token::Symbol('7')));
            assert!(!assembler.advance(Duration::from_millis(100)));
        }
        assert_eq!(assembler.state(), AssemblyState::Collecting);
        assert_eq!(assembler.partial().len(), 1000);
    }
}
