#[cfg(any(
    feature = "adapters",
    feature = "sqlx",
    feature = "reqwest",
    feature = "image"
))]
compile_error!("application must not depend on adapters/framework crates");

pub mod clock;
pub mod diff;
pub mod error;
pub mod infrastructure_config;
pub mod ingest;
pub mod ports;
pub mod projects;
pub mod rebuild;
pub mod scheduler;
pub mod stitch;
#[cfg(test)]
mod testing;
pub mod watch;
