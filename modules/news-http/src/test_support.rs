//! An injected-transport test double, used by integration tests to drive
//! [`crate::HttpClient`] through retry/circuit-breaker scenarios without
//! touching the network (spec.md §8, testable property 8).

use std::sync::Mutex;

use news_common::PipelineError;

/// A queue of canned outcomes for one endpoint. Each call to
/// [`ScriptedTransport::next`] pops the next scripted result; once
/// exhausted, further calls return the last outcome repeated.
pub struct ScriptedTransport<T> {
    outcomes: Mutex<Vec<Result<T, PipelineError>>>,
    calls: std::sync::atomic::AtomicUsize,
}

impl<T: Clone + Send> ScriptedTransport<T> {
    pub fn new(outcomes: Vec<Result<T, PipelineError>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub async fn next(&self) -> Result<T, PipelineError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let mut guard = self.outcomes.lock().expect("scripted transport poisoned");
        if guard.is_empty() {
            panic!("ScriptedTransport exhausted with no outcomes left to return");
        }
        if guard.len() == 1 {
            clone_result(&guard[0])
        } else {
            guard.remove(0)
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

fn clone_result<T: Clone>(r: &Result<T, PipelineError>) -> Result<T, PipelineError> {
    match r {
        Ok(v) => Ok(v.clone()),
        Err(e) => Err(match e {
            PipelineError::TransientUpstream(s) => PipelineError::TransientUpstream(s.clone()),
            PipelineError::RateLimited { retry_after_secs, message } => PipelineError::RateLimited {
                retry_after_secs: *retry_after_secs,
                message: message.clone(),
            },
            PipelineError::PermanentUpstream(s) => PipelineError::PermanentUpstream(s.clone()),
            PipelineError::MalformedResponse(s) => PipelineError::MalformedResponse(s.clone()),
            PipelineError::ContentRejected(s) => PipelineError::ContentRejected(s.clone()),
            PipelineError::Validation(s) => PipelineError::Validation(s.clone()),
            PipelineError::Store(s) => PipelineError::Store(s.clone()),
            PipelineError::Config(s) => PipelineError::Config(s.clone()),
            PipelineError::CircuitOpen(s) => PipelineError::CircuitOpen(s.clone()),
            PipelineError::Other(e) => PipelineError::Other(anyhow::anyhow!(e.to_string())),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replays_scripted_outcomes_in_order() {
        let script = ScriptedTransport::new(vec![
            Err(PipelineError::TransientUpstream("first".into())),
            Ok(200u32),
        ]);
        assert!(script.next().await.is_err());
        assert_eq!(script.next().await.unwrap(), 200);
        assert_eq!(script.call_count(), 2);
    }
}
