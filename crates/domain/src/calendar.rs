//! 发送日历策略: 判定某个时刻是否允许发送, 以及寻找下一个可发送时刻。
//!
//! 时区采用账号本地的固定UTC偏移(不处理夏令时切换), 所有对外时间
//! 仍以UTC存储和传递。

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, Timelike, Utc, Weekday};
use outreach_core::{OutreachError, OutreachResult};
use std::collections::HashSet;

use crate::entities::CampaignSettings;

/// 向后寻找可发送时刻的最大天数, 超出视为排期失败
pub const MAX_LOOKAHEAD_DAYS: i64 = 366;

/// 可发送窗口
#[derive(Debug, Clone)]
pub struct SendWindow {
    offset: FixedOffset,
    start_hour: u32,
    end_hour: u32,
    skip_weekends: bool,
    holidays: HashSet<NaiveDate>,
}

impl SendWindow {
    pub fn new(
        utc_offset_minutes: i32,
        start_hour: u32,
        end_hour: u32,
        skip_weekends: bool,
        holidays: impl IntoIterator<Item = NaiveDate>,
    ) -> OutreachResult<Self> {
        let offset = FixedOffset::east_opt(utc_offset_minutes * 60).ok_or_else(|| {
            OutreachError::Configuration(format!("非法的时区偏移: {utc_offset_minutes}分钟"))
        })?;

        if end_hour > 24 || start_hour >= end_hour {
            return Err(OutreachError::Configuration(format!(
                "非法的发送窗口: {start_hour}..{end_hour}"
            )));
        }

        Ok(Self {
            offset,
            start_hour,
            end_hour,
            skip_weekends,
            holidays: holidays.into_iter().collect(),
        })
    }

    pub fn from_settings(settings: &CampaignSettings) -> OutreachResult<Self> {
        Self::new(
            settings.utc_offset_minutes,
            settings.send_start_hour,
            settings.send_end_hour,
            settings.skip_weekends,
            settings.holidays.iter().copied(),
        )
    }

    /// 该时刻对应的账号本地日期
    pub fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&self.offset).date_naive()
    }

    /// 本地日期某个整点对应的UTC时刻
    pub fn instant_at(&self, date: NaiveDate, hour: u32) -> OutreachResult<DateTime<Utc>> {
        let local = date
            .and_hms_opt(hour, 0, 0)
            .and_then(|dt| dt.and_local_timezone(self.offset).single())
            .ok_or_else(|| {
                OutreachError::Internal(format!("无法构造本地时间: {date} {hour}:00"))
            })?;
        Ok(local.with_timezone(&Utc))
    }

    fn day_blocked(&self, date: NaiveDate) -> bool {
        if self.skip_weekends && matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            return true;
        }
        self.holidays.contains(&date)
    }

    /// 该时刻是否允许发送
    pub fn is_allowed(&self, instant: DateTime<Utc>) -> bool {
        let local = instant.with_timezone(&self.offset);
        let hour = local.hour();
        hour >= self.start_hour && hour < self.end_hour && !self.day_blocked(local.date_naive())
    }

    /// 不早于给定时刻的下一个可发送时刻
    ///
    /// 单调: 返回值 >= 输入值。查找范围以[`MAX_LOOKAHEAD_DAYS`]为界,
    /// 超出时返回[`OutreachError::CannotSchedule`]。
    pub fn next_allowed(&self, instant: DateTime<Utc>) -> OutreachResult<DateTime<Utc>> {
        if self.is_allowed(instant) {
            return Ok(instant);
        }

        let start_date = self.local_date(instant);
        let horizon = start_date + Duration::days(MAX_LOOKAHEAD_DAYS);
        let mut current = instant.with_timezone(&self.offset);

        loop {
            let date = current.date_naive();
            if date > horizon {
                return Err(OutreachError::CannotSchedule(format!(
                    "{MAX_LOOKAHEAD_DAYS}天内没有可发送的时刻 (起点: {instant})"
                )));
            }

            // 当日不可用或已过窗口, 移到下一天窗口开始
            if self.day_blocked(date) || current.hour() >= self.end_hour {
                let next = self.instant_at(date + Duration::days(1), self.start_hour)?;
                current = next.with_timezone(&self.offset);
                continue;
            }

            // 未到窗口, 推进到当日窗口开始
            if current.hour() < self.start_hour {
                let next = self.instant_at(date, self.start_hour)?;
                current = next.with_timezone(&self.offset);
                continue;
            }

            return Ok(current.with_timezone(&Utc));
        }
    }
}

/// 默认节假日集合: 2025-2026年美国联邦假日
pub fn us_public_holidays() -> Vec<NaiveDate> {
    [
        (2025, 1, 1),   // 元旦
        (2025, 1, 20),  // 马丁·路德·金纪念日
        (2025, 2, 17),  // 总统日
        (2025, 5, 26),  // 阵亡将士纪念日
        (2025, 6, 19),  // 六月节
        (2025, 7, 4),   // 独立日
        (2025, 9, 1),   // 劳动节
        (2025, 11, 27), // 感恩节
        (2025, 12, 25), // 圣诞节
        (2026, 1, 1),
        (2026, 1, 19),
        (2026, 2, 16),
        (2026, 5, 25),
        (2026, 6, 19),
        (2026, 7, 3),
        (2026, 9, 7),
        (2026, 11, 26),
        (2026, 12, 25),
    ]
    .iter()
    .filter_map(|&(y, m, d)| NaiveDate::from_ymd_opt(y, m, d))
    .collect()
}
