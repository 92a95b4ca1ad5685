//! 统一的落位引擎: 在可发送窗口内为事件挑选具体时刻, 同时维护
//! 同日间隔与单日上限。排期与重排共用同一套落位逻辑, 保证两者对
//! 同样的输入产生同样的结果。

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use outreach_core::{OutreachError, OutreachResult};
use outreach_domain::calendar::{SendWindow, MAX_LOOKAHEAD_DAYS};

#[derive(Debug, Default, Clone, Copy)]
struct DayState {
    count: u32,
    last: Option<DateTime<Utc>>,
}

/// 落位引擎, 单次批量操作内有状态
pub struct PlacementEngine {
    window: SendWindow,
    spacing: Duration,
    daily_cap: u32,
    days: HashMap<NaiveDate, DayState>,
}

impl PlacementEngine {
    pub fn new(window: SendWindow, spacing_minutes: u32, daily_cap: u32) -> Self {
        Self {
            window,
            spacing: Duration::minutes(spacing_minutes as i64),
            daily_cap,
            days: HashMap::new(),
        }
    }

    pub fn window(&self) -> &SendWindow {
        &self.window
    }

    /// 预置某天已占用的额度(账号当日已发送数、队列中已排定的事件)
    pub fn seed(&mut self, day: NaiveDate, used: u32, last: Option<DateTime<Utc>>) {
        let state = self.days.entry(day).or_default();
        state.count = state.count.max(used);
        if let Some(t) = last {
            state.last = Some(state.last.map_or(t, |cur| cur.max(t)));
        }
    }

    /// 累加某天已占用的条数(逐条预置队列中已排定的事件时使用)
    pub fn seed_count(&mut self, day: NaiveDate, count: u32) {
        self.days.entry(day).or_default().count += count;
    }

    /// 不早于`not_before`落位一个事件
    ///
    /// 返回的时刻: 在可发送窗口内、与当日前一事件间隔不小于spacing、
    /// 当日落位总数不超过daily_cap。当日满额顺延到下一个可发送日。
    pub fn place(&mut self, not_before: DateTime<Utc>) -> OutreachResult<DateTime<Utc>> {
        let mut candidate = not_before;

        // 每轮迭代要么返回要么推进candidate, 以迭代次数兜底防御死循环
        for _ in 0..(MAX_LOOKAHEAD_DAYS as usize * 2 + 16) {
            candidate = self.window.next_allowed(candidate)?;
            let day = self.window.local_date(candidate);
            let state = self.days.entry(day).or_default();

            if state.count >= self.daily_cap {
                // 当日满额, 从次日零点重新寻找窗口
                candidate = self.window.instant_at(day + Duration::days(1), 0)?;
                continue;
            }

            if let Some(last) = state.last {
                let spaced = last + self.spacing;
                if spaced > candidate {
                    candidate = spaced;
                    // 间隔可能把时刻推出窗口或推到次日, 回到循环重新校验
                    continue;
                }
            }

            state.count += 1;
            state.last = Some(candidate);
            return Ok(candidate);
        }

        Err(OutreachError::CannotSchedule(format!(
            "{MAX_LOOKAHEAD_DAYS}天内无法找到满足间隔与上限的落位 (起点: {not_before})"
        )))
    }
}
