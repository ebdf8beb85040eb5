//! Training summaries for offline inspection

mod summary;

pub use summary::{read_events, Histogram, SummaryRecord, SummaryWriter};
