use std::fmt;
use std::time::Duration;

use log::{error, info, warn};

/// Pipeline stage names used in stage-level notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Story,
    Illustrations,
    Narration,
    Transcription,
    ReadAlong,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Story => "story",
            Stage::Illustrations => "illustrations",
            Stage::Narration => "narration",
            Stage::Transcription => "transcription",
            Stage::ReadAlong => "read-along",
        };
        f.write_str(name)
    }
}

/// Something the user should be told while the pipeline works.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    /// A transient failure; the policy is about to sleep and try again.
    Retrying {
        operation: String,
        attempt: usize,
        max_retries: usize,
        delay: Duration,
        reason: String,
    },
    RetriesExhausted {
        operation: String,
        attempts: usize,
        reason: String,
    },
    NotRetryable {
        operation: String,
        reason: String,
    },
    StageFailed {
        stage: Stage,
        reason: String,
    },
    StageSkipped {
        stage: Stage,
        reason: String,
    },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Retrying {
                operation,
                attempt,
                max_retries,
                delay,
                reason,
            } => write!(
                f,
                "{} hit a temporary problem ({}). Retrying in {:.1}s (attempt {}/{})...",
                operation,
                reason,
                delay.as_secs_f64(),
                attempt,
                max_retries
            ),
            Notice::RetriesExhausted {
                operation,
                attempts,
                reason,
            } => write!(
                f,
                "{} failed after {} attempts: {}",
                operation, attempts, reason
            ),
            Notice::NotRetryable { operation, reason } => {
                write!(f, "{} failed: {}", operation, reason)
            }
            Notice::StageFailed { stage, reason } => {
                write!(f, "Could not finish {}: {}", stage, reason)
            }
            Notice::StageSkipped { stage, reason } => {
                write!(f, "Skipped {}: {}", stage, reason)
            }
        }
    }
}

/// Receives notices on behalf of whatever is showing progress to the user.
pub trait NoticeSink: Send + Sync {
    fn notify(&self, notice: &Notice);
}

/// Default sink: forwards every notice to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotices;

impl NoticeSink for LogNotices {
    fn notify(&self, notice: &Notice) {
        match notice {
            Notice::Retrying { .. } => warn!("{}", notice),
            Notice::StageSkipped { .. } => info!("{}", notice),
            _ => error!("{}", notice),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_notice_is_readable() {
        let notice = Notice::Retrying {
            operation: "Story generation".to_string(),
            attempt: 1,
            max_retries: 3,
            delay: Duration::from_millis(1200),
            reason: "HTTP 529 overloaded".to_string(),
        };
        assert_eq!(
            notice.to_string(),
            "Story generation hit a temporary problem (HTTP 529 overloaded). Retrying in 1.2s (attempt 1/3)..."
        );
    }

    #[test]
    fn test_stage_names() {
        let notice = Notice::StageFailed {
            stage: Stage::Illustrations,
            reason: "second image failed".to_string(),
        };
        assert_eq!(
            notice.to_string(),
            "Could not finish illustrations: second image failed"
        );
    }
}
