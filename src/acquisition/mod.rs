// src/acquisition/mod.rs
// 采集流水线：队列 -> 组装 -> 完整性检查 -> 滤波 -> 裁剪
pub mod assembler;
pub mod buffer;
pub mod design;
pub mod error;
pub mod evictor;
pub mod filter;
pub mod integrity;
pub mod queue;
pub mod rate;
pub mod snapshot;

pub use assembler::{Assembler, DrainReport};
pub use buffer::{Row, SampleMatrix};
pub use design::{Butterworth, Coefficients, FilterDesigner};
pub use error::{AcquisitionError, PipelineWarning};
pub use evictor::{evict, evict_excess};
pub use filter::{FilterState, OnlineFilter, DESPIKE_WINDOW};
pub use integrity::{Admission, IntegrityMonitor, SequenceTracker};
pub use queue::{sample_queue, Pop, QueueConsumer, QueueProducer};
pub use rate::{estimate, RateEstimator};
pub use snapshot::{Snapshot, SnapshotHandle};
