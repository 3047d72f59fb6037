//! Ports - 外部の協調者への抽象化レイヤー
//!
//! matcher が直接触るのはこれらの trait だけです。
//! ledger も時計もグローバルには引かず、必ず注入します。
//!
//! - **EnqueuedJobs**: ジョブ ledger の読み取り口
//! - **Clock**: 現在時刻（`wait` の評価に使う）
//! - **IdGenerator**: ledger が積んだジョブに振る ID

pub mod clock;
pub mod id_generator;
pub mod ledger;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::ledger::EnqueuedJobs;
