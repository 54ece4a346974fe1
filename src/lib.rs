pub mod attachment;
pub mod batch;
pub mod collect;
pub mod config;
pub mod credentials;
pub mod deliver;
pub mod report;

// Re-export commonly used types
pub use attachment::{admit, Admission, Attachment, Rejection, TransferEncoding};
pub use batch::{pack, Batch, BatchLimits};
pub use collect::{collect_files, CollectError};
pub use config::{Config, SmtpSecurity};
pub use deliver::{CancelToken, DeliveryOutcome, Dispatcher, Envelope, Mailer, SmtpMailer, Verdict};
pub use report::summarize;
