// Service exports
pub mod postgres;
pub mod store;
pub mod webhook;

pub use postgres::PostgresStore;
pub use store::{
    ApplicantScope, ApplicantSource, ApplicantStore, InsertOutcome, MatchSink, MatchStore, MemoryStore,
    ProcessedPolicy, RecordedApplicant, RuleSource, StoreError, DEFAULT_UNSCOPED_LIMIT,
};
pub use webhook::{BatchNotifier, NoopNotifier, NotifyError, WebhookNotifier};
