pub mod record;

pub use record::{CallRecord, CallSite, UNKNOWN_FUNCTION};
