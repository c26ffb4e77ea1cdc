pub mod driver;
pub mod fingerprint;
pub mod outcome;
pub mod pass;

pub use driver::CrawlDriver;
pub use fingerprint::{ContentSniffer, Fingerprint, FingerprintActivity};
pub use outcome::{
    ActivityKind, ActivityRecord, IngestRequest, JobSink, MemorySink, MemorySinkState, Outcome,
    SkipReason,
};
pub use pass::{CrawlPass, Deferred, PassReport};
