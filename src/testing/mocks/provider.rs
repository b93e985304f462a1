//! Scripted disbursement provider
//!
//! Behaves like an idempotent payment processor: an item submitted again
//! under a key it has already answered gets the original outcome back and is
//! not paid twice.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::model::ItemOutcome;
use crate::providers::{ChunkSubmission, DisbursementProvider, ItemReceipt, ProviderError};

/// Builder for creating configured scripted providers
#[derive(Default)]
pub struct ScriptedProviderBuilder {
    healthy: Option<bool>,
    call_errors: VecDeque<ProviderError>,
    failing_destinations: HashMap<String, String>,
    delay: Option<Duration>,
}

impl ScriptedProviderBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unhealthy(mut self) -> Self {
        self.healthy = Some(false);
        self
    }

    /// Fail the next submit calls, one error per call, in order
    pub fn with_call_errors(mut self, errors: Vec<ProviderError>) -> Self {
        self.call_errors.extend(errors);
        self
    }

    /// Answer items sent to `destination` with a failed outcome
    pub fn with_failing_destination(mut self, destination: &str, error: &str) -> Self {
        self.failing_destinations
            .insert(destination.to_string(), error.to_string());
        self
    }

    /// Sleep before answering each submit call
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn build(self) -> ScriptedProvider {
        ScriptedProvider {
            healthy: self.healthy.unwrap_or(true),
            call_errors: Arc::new(Mutex::new(self.call_errors)),
            failing_destinations: Arc::new(Mutex::new(self.failing_destinations)),
            delay: self.delay,
            answered: Arc::new(Mutex::new(HashMap::new())),
            paid: Arc::new(Mutex::new(HashSet::new())),
            submissions: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// Mock payment processor. Clones share their state.
#[derive(Clone)]
pub struct ScriptedProvider {
    healthy: bool,
    call_errors: Arc<Mutex<VecDeque<ProviderError>>>,
    failing_destinations: Arc<Mutex<HashMap<String, String>>>,
    delay: Option<Duration>,
    answered: Arc<Mutex<HashMap<String, ItemOutcome>>>,
    paid: Arc<Mutex<HashSet<String>>>,
    submissions: Arc<Mutex<Vec<ChunkSubmission>>>,
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> ScriptedProviderBuilder {
        ScriptedProviderBuilder::new()
    }

    /// Stop failing `destination` from now on
    pub fn heal_destination(&self, destination: &str) {
        self.failing_destinations.lock().unwrap().remove(destination);
    }

    /// Number of submit calls, including failed ones
    pub fn call_count(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }

    pub fn submissions(&self) -> Vec<ChunkSubmission> {
        self.submissions.lock().unwrap().clone()
    }

    /// Distinct idempotency keys that resulted in money moving
    pub fn paid_keys(&self) -> HashSet<String> {
        self.paid.lock().unwrap().clone()
    }

    /// Every idempotency key ever sent, with repeats
    pub fn submitted_keys(&self) -> Vec<String> {
        self.submissions
            .lock()
            .unwrap()
            .iter()
            .flat_map(|s| s.items.iter().map(|i| i.idempotency_key.clone()))
            .collect()
    }
}

#[async_trait]
impl DisbursementProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn health_check(&self) -> Result<(), ProviderError> {
        if self.healthy {
            Ok(())
        } else {
            Err(ProviderError::Unavailable("scripted outage".into()))
        }
    }

    async fn submit(&self, submission: &ChunkSubmission) -> Result<Vec<ItemReceipt>, ProviderError> {
        self.submissions.lock().unwrap().push(submission.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.call_errors.lock().unwrap().pop_front() {
            return Err(err);
        }

        let failing = self.failing_destinations.lock().unwrap().clone();
        let mut answered = self.answered.lock().unwrap();
        let mut paid = self.paid.lock().unwrap();
        let receipts = submission
            .items
            .iter()
            .map(|item| {
                let outcome = answered
                    .entry(item.idempotency_key.clone())
                    .or_insert_with(|| match failing.get(&item.destination) {
                        Some(error) => ItemOutcome::Failed {
                            error: error.clone(),
                        },
                        None => {
                            paid.insert(item.idempotency_key.clone());
                            ItemOutcome::Success {
                                reference: format!("REF-{}", item.idempotency_key),
                            }
                        }
                    })
                    .clone();
                ItemReceipt {
                    idempotency_key: item.idempotency_key.clone(),
                    outcome,
                }
            })
            .collect();
        Ok(receipts)
    }
}
