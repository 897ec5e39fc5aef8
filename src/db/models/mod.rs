pub mod scan;
pub mod scan_session;

pub use scan::ScanRecord;
pub use scan_session::{ScanSessionRecord, ScanSessionStatus};
