//! InMemoryLedger - テスト用のジョブ ledger
//!
//! 積まれたジョブは実行されず、`clear()` されるまでそのまま残ります。
//! Mutex で包んでいるので `&self` のまま投入でき、matcher と producer が
//! 同じ ledger を参照で共有できます。

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{DeliveryOptions, JobDescriptor, JobId, MessageDelivery};
use crate::error::MatcherError;
use crate::ports::{Clock, EnqueuedJobs, IdGenerator, SystemClock, UlidGenerator};

/// A job as it sits in the in-memory ledger.
///
/// `job_id` は ledger 内でジョブを見分けるためだけのもので、
/// `EnqueuedJobs` 経由で matcher に渡るのは `descriptor` だけです。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnqueuedJob {
    pub job_id: JobId,
    #[serde(flatten)]
    pub descriptor: JobDescriptor,
}

impl EnqueuedJob {
    pub fn new(job_id: JobId, descriptor: JobDescriptor) -> Self {
        Self { job_id, descriptor }
    }
}

impl fmt::Display for EnqueuedJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.job_id, self.descriptor)
    }
}

pub struct InMemoryLedger {
    jobs: Mutex<Vec<EnqueuedJob>>,
    clock: Arc<dyn Clock>,
    id_generator: Box<dyn IdGenerator>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }

    /// Ledger whose `wait` scheduling and job ids follow `clock`.
    pub fn with_clock(clock: impl Clock + 'static) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(clock);
        Self {
            jobs: Mutex::new(Vec::new()),
            id_generator: Box::new(UlidGenerator::new(Arc::clone(&clock))),
            clock,
        }
    }

    /// ジョブ ID の生成器を差し替える
    pub fn with_id_generator(mut self, id_generator: impl IdGenerator + 'static) -> Self {
        self.id_generator = Box::new(id_generator);
        self
    }

    /// Append a job and return the id it was given.
    pub fn enqueue(&self, descriptor: JobDescriptor) -> JobId {
        let job_id = self.id_generator.generate_job_id();
        debug!(
            %job_id,
            job = %descriptor.job,
            queue = %descriptor.queue,
            at = ?descriptor.at,
            "enqueued job"
        );
        self.lock().push(EnqueuedJob::new(job_id, descriptor));
        job_id
    }

    /// Serialize `mail` into a delivery job and enqueue it.
    pub fn deliver_later(
        &self,
        mail: &MessageDelivery,
        options: &DeliveryOptions,
    ) -> Result<JobId, MatcherError> {
        let descriptor = mail.delivery_job(options, self.clock.now())?;
        Ok(self.enqueue(descriptor))
    }

    /// Drop every enqueued job.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Jobs with the ids they were given, in enqueue order.
    pub fn entries(&self) -> Vec<EnqueuedJob> {
        self.lock().clone()
    }

    /// 積まれているジョブの数
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// ジョブが一つも積まれていないか
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<EnqueuedJob>> {
        // ledger は追記のみなので、poison されても中身は一貫している
        self.jobs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl EnqueuedJobs for InMemoryLedger {
    fn enqueued_jobs(&self) -> Vec<JobDescriptor> {
        self.lock().iter().map(|job| job.descriptor.clone()).collect()
    }
}

impl MessageDelivery {
    /// Enqueue this mail on `ledger` instead of sending it now.
    pub fn deliver_later(
        &self,
        ledger: &InMemoryLedger,
        options: &DeliveryOptions,
    ) -> Result<JobId, MatcherError> {
        ledger.deliver_later(self, options)
    }
}
