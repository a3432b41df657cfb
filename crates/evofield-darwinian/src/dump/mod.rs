//! State dumps
//!
//! - [`binary`]: versioned little-endian evolution record
//! - [`report`]: plain-text state report

pub mod binary;
pub mod report;

pub use binary::{compress_weights, expand_weights, DumpError, DumpRecord, DUMP_MAGIC, DUMP_VERSION};
pub use report::EvolutionReport;
