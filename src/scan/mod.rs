mod core;

#[cfg(test)]
mod tests;

pub use self::core::{
    LINE_SEPARATOR, LineStarts, PartitionPlan, plan_file, scan_bytes, scan_file, scan_reader,
};
