pub mod compose;
pub mod config;
pub mod duration;
pub mod extensions;
pub mod judgment;
pub mod prompts;
pub mod status;
pub mod tasks;

#[cfg(test)]
mod test_support;

/// Failures a tweet may collect before it is pinned to `Error` and no longer selected.
pub const RETRY_CEILING: i32 = 3;
