pub mod transport;
pub mod session_config;
pub mod remote_path;
pub mod listing_record;
pub mod listing_format;
pub mod listing_parser;
pub mod directory_plan;
pub mod ftp_connection_manager;
pub mod session;

#[cfg(test)]
pub(crate) mod memory_transport;

pub use transport::{DataReader, DataWriter, FtpCommand, FtpTransport, FtpVerb, read_to_end};
pub use session_config::{Credentials, ListingEncoding, SessionConfig, TransportOptions};
pub use remote_path::{join_remote, normalize_separators, segments, split_parent};
pub use listing_record::ListingRecord;
pub use listing_format::ListingFormat;
pub use listing_parser::ListingParser;
pub use directory_plan::{DirectoryPlan, ProvisionPolicy, ProvisionReport, SegmentStep};
pub use ftp_connection_manager::FtpConnectionManager;
pub use session::FtpSession;
