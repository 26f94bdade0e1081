pub mod aggregate_reader;
pub mod causes;
pub mod donation_queries;
pub mod idempotency;
pub mod ledger_writer;
pub mod notifications;
pub mod privacy;

pub use aggregate_reader::{run_reconciler, AggregateReader, Progress, ReconciliationReport};
pub use causes::{CauseService, CauseSubmission};
pub use donation_queries::DonationQueries;
pub use idempotency::{BoundedIdempotencyGuard, IdempotencyGuard, RedisIdempotencyGuard};
pub use ledger_writer::{DonationIntent, DonorPayload, LedgerWriter, RetryPolicy};
pub use notifications::{DonationSummary, NotificationDispatchError, NotificationDispatcher};
pub use privacy::{project, PublicDonationView, PublicDonor};
