//! CLI module - argument parsing and interactive prompts

mod args;
mod prompts;

pub use args::{Cli, Commands, CvArgs, FitArgs, PipelineArgs, Preset, TransformArgs};
pub use prompts::*;
