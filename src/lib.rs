pub mod commands;
pub mod config;
pub mod db;
pub mod engagement;
pub mod feed;
pub mod library;
pub mod recommendation;
pub mod reconcile;
pub mod scroll;
pub mod types;

pub use commands::Session;
pub use config::AppConfig;
pub use engagement::EngagementTracker;
pub use feed::FeedController;
pub use library::LibraryStore;
pub use types::{Book, FeedStatus, LibraryRecord, ReadingStatus};

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. `RUST_LOG` wins when set.
pub fn init_tracing(verbose: bool) {
    // Release builds stay quiet so library contents don't end up in logs
    let default_level = if verbose {
        "debug"
    } else if cfg!(debug_assertions) {
        "info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("dewey={default_level}")));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
