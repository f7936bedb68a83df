use async_trait::async_trait;
use derive_more::Constructor;
use std::time::Duration;

/// Retries while GitHub computes statistics: sleeps `base_delay * attempt` after each not-ready attempt.
#[derive(Constructor, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::new(8, Duration::from_secs(3))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryState<T> {
    Requesting { attempt: u32 },
    Backoff { attempt: u32, delay: Duration },
    Succeeded(T),
    Exhausted { attempts: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryEvent<T> {
    Ready(T),
    NotReady,
    Slept,
}

impl<T> RetryState<T> {
    pub fn start() -> Self {
        RetryState::Requesting { attempt: 1 }
    }

    /// Terminal states and events not expected in a state leave it unchanged.
    pub fn next(self, event: RetryEvent<T>, policy: &RetryPolicy) -> Self {
        match (self, event) {
            (RetryState::Requesting { .. }, RetryEvent::Ready(value)) => RetryState::Succeeded(value),
            (RetryState::Requesting { attempt }, RetryEvent::NotReady) if attempt < policy.max_attempts => {
                RetryState::Backoff {
                    attempt,
                    delay: policy.base_delay * attempt,
                }
            }
            (RetryState::Requesting { attempt }, RetryEvent::NotReady) => RetryState::Exhausted { attempts: attempt },
            (RetryState::Backoff { attempt, .. }, RetryEvent::Slept) => RetryState::Requesting { attempt: attempt + 1 },
            (state, _) => state,
        }
    }
}

/// Waits between attempts. Replaced in tests to avoid real delays.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, delay: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, delay: Duration) {
        tokio::time::sleep(delay).await;
    }
}

/// Tests

#[cfg(test)]
fn run(policy: &RetryPolicy, events: Vec<RetryEvent<&'static str>>) -> Vec<RetryState<&'static str>> {
    let mut state = RetryState::start();
    let mut states = vec![state.clone()];
    for event in events {
        state = state.next(event, policy);
        states.push(state.clone());
    }
    states
}

#[test]
fn succeeds_after_backoff_test() {
    let policy = RetryPolicy::new(3, Duration::from_secs(2));
    let states = run(
        &policy,
        vec![RetryEvent::NotReady, RetryEvent::Slept, RetryEvent::NotReady, RetryEvent::Slept, RetryEvent::Ready("stats")],
    );
    assert_eq!(
        states,
        vec![
            RetryState::Requesting { attempt: 1 },
            RetryState::Backoff {
                attempt: 1,
                delay: Duration::from_secs(2)
            },
            RetryState::Requesting { attempt: 2 },
            RetryState::Backoff {
                attempt: 2,
                delay: Duration::from_secs(4)
            },
            RetryState::Requesting { attempt: 3 },
            RetryState::Succeeded("stats"),
        ]
    );
}

#[test]
fn exhausted_without_last_backoff_test() {
    let policy = RetryPolicy::new(2, Duration::from_secs(1));
    let states = run(&policy, vec![RetryEvent::NotReady, RetryEvent::Slept, RetryEvent::NotReady]);
    assert_eq!(states.last(), Some(&RetryState::Exhausted { attempts: 2 }));

    let single = RetryPolicy::new(1, Duration::from_secs(1));
    assert_eq!(run(&single, vec![RetryEvent::NotReady]).last(), Some(&RetryState::Exhausted { attempts: 1 }));
}

#[test]
fn terminal_states_are_final_test() {
    let policy = RetryPolicy::default();
    let exhausted: RetryState<&str> = RetryState::Exhausted { attempts: 8 };
    assert_eq!(exhausted.clone().next(RetryEvent::Ready("late"), &policy), exhausted);
    let succeeded = RetryState::Succeeded("stats");
    assert_eq!(succeeded.clone().next(RetryEvent::NotReady, &policy), succeeded);
    let requesting: RetryState<&str> = RetryState::Requesting { attempt: 1 };
    assert_eq!(requesting.clone().next(RetryEvent::Slept, &policy), requesting);
}
