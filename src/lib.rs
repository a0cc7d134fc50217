pub mod error;
pub mod io;
pub mod models;
pub mod pipeline;
pub mod stages;
pub mod tools;

pub use error::{CaseError, PipelineError};
pub use io::{read_case_list, CaseList, RunReport};
pub use models::{Case, CaseIndex, RunPaths, Stage, View, DEFAULT_VOLUME_EDGE};
pub use pipeline::{run_pipeline, PipelineConfig, PipelineSummary};
pub use stages::{
    ExtractConfig, MergeConfig, NormalizeConfig, RunnerConfig, DEFAULT_WORKERS,
};
pub use tools::{B0Mode, ToolConfig, ToolSpec};
