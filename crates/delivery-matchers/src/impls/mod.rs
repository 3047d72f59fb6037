//! Impls - ports の実装（テスト用）
//!
//! # 含まれる実装
//! - **InMemoryLedger**: テストで使う in-process のジョブ ledger
//!
//! 本物のジョブ基盤はこのクレートの外にあります。ここにあるのは
//! matcher と同じプロセス内で同期的に覗ける test adapter だけです。

pub mod inmem_ledger;

pub use self::inmem_ledger::{EnqueuedJob, InMemoryLedger};
