//! 发送调度: 排期、落位、调度循环、重排与队列恢复。

pub mod dispatch_loop;
pub mod placement;
pub mod planner;
pub mod recovery;
pub mod reschedule;
#[doc(hidden)]
pub mod test_utils;

pub use dispatch_loop::{CycleReport, DispatchLoop};
pub use placement::PlacementEngine;
pub use planner::{EnrollmentReport, SequencePlanner};
pub use recovery::{QueueRecovery, RecoveryConfig};
pub use reschedule::{RescheduleParams, RescheduleService};
