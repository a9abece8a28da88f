pub mod client;
pub mod credentials;
pub mod failures;
pub mod metadata;
pub mod task_path;
