//! 核心层：对话引擎、错误类型、单轮结果投影

pub mod engine;
pub mod error;
pub mod state;

pub use engine::DialogueEngine;
pub use error::DialogueError;
pub use state::{InformationSource, Parameters, TurnKind, TurnResponse};
