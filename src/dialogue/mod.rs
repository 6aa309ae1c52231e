//! 对话状态核心：清扫、候选裁决、槽位填充、回复组装

mod composer;
mod resolver;
mod slot_filling;
mod sweeper;

pub use composer::{fill, placeholders, render, render_with, ComposeError};
pub use resolver::{is_out_of_context, CandidateResolver, DEFAULT_SIMILARITY_THRESHOLD};
pub use slot_filling::{merge_parameters, SlotFiller, TurnOutcome};
pub use sweeper::{sweep, SweepReport};
