//! Core types for the block kernel.

pub mod block;
pub mod diagnostics;
pub mod kind;
pub mod policy;
pub mod query;
pub mod sensitivity;

pub use block::{Block, BlockHash, BlockMeta, StableMeta};
pub use diagnostics::{Diagnostic, Severity};
pub use kind::BlockKind;
pub use policy::{
    AttachmentPolicy, AttachmentPurpose, CompactionPolicy, KindPriority, OverflowStrategy,
    Policy, Provider, RankCriterion, SensitivityPolicy,
};
pub use query::BlockQuery;
pub use sensitivity::Sensitivity;
