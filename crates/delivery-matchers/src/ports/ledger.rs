//! EnqueuedJobs port - ジョブ ledger の読み取り口
//!
//! ledger 自体はジョブ投入側のサブシステムが所有します。matcher は
//! 評価のたびに `enqueued_jobs()` を呼び、その時点のスナップショットだけを見ます。
//! ID やメタデータは ledger 側の都合なので、ここでは記述子だけを返します。

use std::sync::Arc;

use crate::domain::JobDescriptor;

/// Read access to the jobs currently waiting in a queue.
pub trait EnqueuedJobs {
    /// Snapshot of the pending jobs, in enqueue order.
    fn enqueued_jobs(&self) -> Vec<JobDescriptor>;
}

impl EnqueuedJobs for Vec<JobDescriptor> {
    fn enqueued_jobs(&self) -> Vec<JobDescriptor> {
        self.clone()
    }
}

impl EnqueuedJobs for [JobDescriptor] {
    fn enqueued_jobs(&self) -> Vec<JobDescriptor> {
        self.to_vec()
    }
}

impl<L: EnqueuedJobs + ?Sized> EnqueuedJobs for &L {
    fn enqueued_jobs(&self) -> Vec<JobDescriptor> {
        (**self).enqueued_jobs()
    }
}

impl<L: EnqueuedJobs + ?Sized> EnqueuedJobs for Arc<L> {
    fn enqueued_jobs(&self) -> Vec<JobDescriptor> {
        (**self).enqueued_jobs()
    }
}
