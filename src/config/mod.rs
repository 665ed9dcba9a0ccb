mod core;


pub use self::core::{
    NULL_SINK, RunConfig, THREADS_ENV, TOOL_NAME, available_threads, parse_thread_count,
    resolve_thread_count,
};
