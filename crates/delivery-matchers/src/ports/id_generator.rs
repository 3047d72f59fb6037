//! IdGenerator port - ID 生成の抽象化
//!
//! ledger がジョブを積むときに `JobId` を振ります。
//! Clock を差し替えれば timestamp 部分を固定できます。

use ulid::Ulid;

use crate::domain::JobId;
use crate::ports::Clock;

pub trait IdGenerator: Send + Sync {
    fn generate_job_id(&self) -> JobId;
}

/// UlidGenerator は Clock の時刻を timestamp 部分に使う ULID 生成器
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn generate_job_id(&self) -> JobId {
        // ULID の timestamp は 48-bit のミリ秒。epoch 以前は 0 に丸める
        let timestamp_ms = self.clock.now().timestamp_millis().max(0) as u64;
        JobId::from(Ulid::from_parts(timestamp_ms, rand::random()))
    }
}
