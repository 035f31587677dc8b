mod ids;
mod job;
mod object;
mod partition;
mod progress;
mod status;
mod sync_state;

pub use ids::{JobId, RunId};
pub use job::{Job, JobUpdate, NewJob, StoragePath};
pub use object::{BatchCopyResult, CopyEvent, CopyItem, ObjectCount, ObjectEntry};
pub use partition::{partition_date, UNDATED_PARTITION};
pub use progress::{DayError, DayProgress, DayStatus, SyncProgress};
pub use status::{SyncStatus, SyncStatusResponse};
pub use sync_state::SyncState;
