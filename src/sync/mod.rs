pub mod connectivity;
pub mod engine;
pub mod page_cache;
pub mod queue;

pub use connectivity::{ConnectivityMonitor, HttpProbe};
pub use engine::{DrainOutcome, LoadMore, ReconcileEngine, SubmitOutcome};
