//! 外联调度系统领域层: 实体、发送日历、模板渲染、仓储与网关抽象。

pub mod calendar;
pub mod entities;
pub mod ports;
pub mod repositories;
pub mod template;

pub use calendar::{us_public_holidays, SendWindow, MAX_LOOKAHEAD_DAYS};
pub use entities::*;
pub use ports::*;
pub use repositories::*;
