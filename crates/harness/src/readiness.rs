//! Readiness probe - bounded polling of the server root
//!
//! The probe is a small state machine:
//!
//! ```text
//! Probing { attempt } --answered 200--> Ready
//!                     --process gone--> ProcessDied
//!                     --no answer, attempt == max--> Timeout
//!                     --no answer--> Probing { attempt + 1 }
//! ```
//!
//! The exit check runs before the HTTP attempt on every round, and once
//! more before giving up, so a process that dies during the last attempt
//! is reported as `ProcessDied` rather than `Timeout`.

use std::fmt;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::error::HarnessResult;
use crate::server::ServerProcess;

/// Polling schedule
#[derive(Debug, Clone, Copy)]
pub struct ProbePolicy {
    pub max_attempts: u32,
    pub interval: Duration,
    pub attempt_timeout: Duration,
}

impl Default for ProbePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            interval: Duration::from_millis(500),
            attempt_timeout: Duration::from_secs(2),
        }
    }
}

impl ProbePolicy {
    /// Upper bound on time spent sleeping between attempts
    pub fn sleep_budget(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

/// What one polling round saw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    Exited,
    Answered,
    NotReady,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeState {
    Probing { attempt: u32 },
    Ready { attempts: u32 },
    Timeout { attempts: u32 },
    ProcessDied { attempts: u32 },
}

impl ProbeState {
    pub fn initial(max_attempts: u32) -> Self {
        if max_attempts == 0 {
            ProbeState::Timeout { attempts: 0 }
        } else {
            ProbeState::Probing { attempt: 0 }
        }
    }

    pub fn step(self, observation: Observation, max_attempts: u32) -> Self {
        let ProbeState::Probing { attempt } = self else {
            return self;
        };
        let attempts = attempt + 1;

        match observation {
            Observation::Exited => ProbeState::ProcessDied { attempts },
            Observation::Answered => ProbeState::Ready { attempts },
            Observation::NotReady if attempts >= max_attempts => ProbeState::Timeout { attempts },
            Observation::NotReady => ProbeState::Probing { attempt: attempts },
        }
    }

    pub fn is_final(&self) -> bool {
        !matches!(self, ProbeState::Probing { .. })
    }
}

/// Final outcome of the probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready { attempts: u32 },
    Timeout { attempts: u32 },
    ProcessDied { attempts: u32 },
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready { .. })
    }
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Readiness::Ready { attempts } => write!(f, "ready after {} attempt(s)", attempts),
            Readiness::Timeout { attempts } => {
                write!(f, "no answer after {} attempt(s)", attempts)
            }
            Readiness::ProcessDied { attempts } => {
                write!(f, "server process exited (attempt {})", attempts)
            }
        }
    }
}

/// Anything the probe can ask "are you still alive?"
pub trait ProcessWatch {
    fn has_exited(&mut self) -> bool;
}

impl ProcessWatch for ServerProcess {
    fn has_exited(&mut self) -> bool {
        ServerProcess::has_exited(self)
    }
}

/// Poll `base_url` until it answers 200, the process dies, or the attempts
/// run out.
pub async fn await_ready<P: ProcessWatch>(
    process: &mut P,
    base_url: &str,
    policy: &ProbePolicy,
) -> HarnessResult<Readiness> {
    let client = reqwest::Client::builder()
        .timeout(policy.attempt_timeout)
        .build()?;
    let url = format!("{}/", base_url.trim_end_matches('/'));

    info!("Waiting for server at {}...", url);
    let mut state = ProbeState::initial(policy.max_attempts);

    while !state.is_final() {
        sleep(policy.interval).await;

        let observation = if process.has_exited() {
            Observation::Exited
        } else {
            probe_once(&client, &url).await
        };
        state = state.step(observation, policy.max_attempts);

        if let ProbeState::Timeout { attempts } = state {
            if process.has_exited() {
                state = ProbeState::ProcessDied { attempts };
            }
        }
    }

    let readiness = match state {
        ProbeState::Ready { attempts } => Readiness::Ready { attempts },
        ProbeState::ProcessDied { attempts } => Readiness::ProcessDied { attempts },
        ProbeState::Timeout { attempts } | ProbeState::Probing { attempt: attempts } => {
            Readiness::Timeout { attempts }
        }
    };
    debug!("Readiness for {}: {}", url, readiness);
    Ok(readiness)
}

async fn probe_once(client: &reqwest::Client, url: &str) -> Observation {
    match client.get(url).send().await {
        Ok(resp) if resp.status() == reqwest::StatusCode::OK => Observation::Answered,
        Ok(resp) => {
            debug!("Readiness check returned {}", resp.status());
            Observation::NotReady
        }
        Err(e) => {
            // Connection refused is expected while the server is binding
            if !e.is_connect() {
                warn!("Readiness check error: {}", e);
            }
            Observation::NotReady
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    struct Alive;

    impl ProcessWatch for Alive {
        fn has_exited(&mut self) -> bool {
            false
        }
    }

    /// Exits after a fixed number of checks
    struct DiesAfter(u32);

    impl ProcessWatch for DiesAfter {
        fn has_exited(&mut self) -> bool {
            if self.0 == 0 {
                return true;
            }
            self.0 -= 1;
            false
        }
    }

    fn closed_port_url() -> String {
        let port = crate::server::find_free_port().unwrap();
        format!("http://127.0.0.1:{}", port)
    }

    fn fast_policy(max_attempts: u32) -> ProbePolicy {
        ProbePolicy {
            max_attempts,
            interval: Duration::from_millis(20),
            attempt_timeout: Duration::from_millis(200),
        }
    }

    #[test]
    fn test_step_transitions() {
        let s = ProbeState::initial(3);
        assert_eq!(s, ProbeState::Probing { attempt: 0 });

        let s = s.step(Observation::NotReady, 3);
        assert_eq!(s, ProbeState::Probing { attempt: 1 });
        assert_eq!(s.step(Observation::Answered, 3), ProbeState::Ready { attempts: 2 });
        assert_eq!(s.step(Observation::Exited, 3), ProbeState::ProcessDied { attempts: 2 });

        let s = s.step(Observation::NotReady, 3).step(Observation::NotReady, 3);
        assert_eq!(s, ProbeState::Timeout { attempts: 3 });
        assert!(s.is_final());
        assert_eq!(s.step(Observation::Answered, 3), s);
    }

    #[test]
    fn test_process_death_wins_on_last_attempt() {
        let s = ProbeState::Probing { attempt: 9 };
        assert_eq!(s.step(Observation::Exited, 10), ProbeState::ProcessDied { attempts: 10 });
    }

    #[test]
    fn test_zero_attempts_times_out_immediately() {
        assert_eq!(ProbeState::initial(0), ProbeState::Timeout { attempts: 0 });
    }

    #[tokio::test]
    async fn test_never_listening_server_times_out_within_bound() {
        let policy = fast_policy(5);
        let start = Instant::now();
        let readiness = await_ready(&mut Alive, &closed_port_url(), &policy)
            .await
            .unwrap();
        assert_eq!(readiness, Readiness::Timeout { attempts: 5 });
        assert!(start.elapsed() < policy.sleep_budget() + Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_death_during_last_attempt_is_not_a_timeout() {
        let policy = fast_policy(1);
        let readiness = await_ready(&mut DiesAfter(1), &closed_port_url(), &policy)
            .await
            .unwrap();
        assert_eq!(readiness, Readiness::ProcessDied { attempts: 1 });
    }

    #[tokio::test]
    async fn test_dead_process_stops_polling() {
        let policy = fast_policy(10);
        let readiness = await_ready(&mut DiesAfter(2), &closed_port_url(), &policy)
            .await
            .unwrap();
        assert_eq!(readiness, Readiness::ProcessDied { attempts: 3 });
        assert!(!readiness.is_ready());
    }
}
