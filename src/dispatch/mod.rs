mod core;
mod naming;


pub use self::core::{RunSummary, WorkerReport, copy_range, dispatch, run};
pub use self::naming::{OutputTarget, index_width, output_name};
