pub mod api;
pub mod change;
pub mod history;
pub mod queue;
pub mod report;
pub mod snapshot;
pub mod timeline;

pub mod prelude {
    pub use crate::api::{
        ChangeDetectionMode, ChangeDetectionRequest, ChangeDetectionResponse, ErrorBody,
        HybridProcessing, RetryRequest, RetryResponse, SyncMode, SyncRequest, SyncResponse,
        SyncSummary, TimelineProcessRequest, TimelineProcessResponse,
    };
    pub use crate::change::{BusinessImpact, ChangeRecord, ChangeType, NewChangeRecord};
    pub use crate::history::{ContractPeriod, EmploymentHistory, HoursPeriod, SalaryPeriod};
    pub use crate::queue::{JobType, NewQueueEntry, ProcessingQueueEntry, QueueStatus};
    pub use crate::report::{
        CollectorResult, EntityError, ErrorList, RetryDetail, RetryResult, SyncCounts, SyncResult,
        TimelineResult,
    };
    pub use crate::snapshot::{content_hash, NewSnapshot, RawSnapshot, RetryLogEntry, SnapshotEndpoint};
    pub use crate::timeline::{NewTimelineEvent, TimelineEvent, TimelineEventType, TimelineQuery};
}
