use chrono::{DateTime, NaiveDate, Utc};
use outreach_core::{OutreachError, OutreachResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 外联活动
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: Uuid,
    pub name: String,
    /// 执行发送的账号
    pub account_id: Uuid,
    pub status: CampaignStatus,
    pub message_plan: MessagePlan,
    pub settings: CampaignSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum CampaignStatus {
    #[serde(rename = "ACTIVE")]
    Active,
    #[serde(rename = "PAUSED")]
    Paused,
    #[serde(rename = "ARCHIVED")]
    Archived,
}

impl sqlx::Type<sqlx::Postgres> for CampaignStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        sqlx::postgres::PgTypeInfo::with_name("VARCHAR")
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for CampaignStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        match s {
            "ACTIVE" => Ok(CampaignStatus::Active),
            "PAUSED" => Ok(CampaignStatus::Paused),
            "ARCHIVED" => Ok(CampaignStatus::Archived),
            _ => Err(format!("Invalid campaign status: {s}").into()),
        }
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for CampaignStatus {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        let s = match self {
            CampaignStatus::Active => "ACTIVE",
            CampaignStatus::Paused => "PAUSED",
            CampaignStatus::Archived => "ARCHIVED",
        };
        <&str as sqlx::Encode<sqlx::Postgres>>::encode(s, buf)
    }
}

/// 活动的消息序列: 一条建联请求 + 若干跟进消息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagePlan {
    /// 建联请求附言模板, 为空表示发送不带附言的建联请求
    pub connection_template: Option<String>,
    /// 跟进消息, 按发送顺序排列
    pub follow_ups: Vec<FollowUpStep>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowUpStep {
    /// 消息模板, 为空白时该档位被跳过
    pub template: String,
    /// 相对建联请求的天数偏移
    pub delay_days: u32,
}

impl MessagePlan {
    /// 跟进消息总数(含模板为空的档位)
    pub fn follow_up_count(&self) -> u8 {
        self.follow_ups.len() as u8
    }

    /// 指定档位的模板, 档位不存在时为None
    pub fn template_for(&self, slot: MessageSlot) -> Option<&str> {
        match slot {
            MessageSlot::ConnectionRequest => self.connection_template.as_deref(),
            MessageSlot::FollowUp(n) => self
                .follow_ups
                .get(n as usize - 1)
                .map(|step| step.template.as_str()),
        }
    }
}

/// 活动级发送设置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignSettings {
    /// 账号本地时区相对UTC的分钟偏移(固定偏移, 不处理夏令时)
    pub utc_offset_minutes: i32,
    /// 可发送窗口 [start, end) (本地小时)
    pub send_start_hour: u32,
    pub send_end_hour: u32,
    /// 跟进消息在目标日期内锚定的本地小时
    pub preferred_send_hour: u32,
    pub skip_weekends: bool,
    pub holidays: Vec<NaiveDate>,
    /// 单日发送上限
    pub daily_cap: u32,
    /// 同日内两条消息的最小间隔(分钟)
    pub spacing_minutes: u32,
}

impl Default for CampaignSettings {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            send_start_hour: 8,
            send_end_hour: 18,
            preferred_send_hour: 9,
            skip_weekends: true,
            holidays: crate::calendar::us_public_holidays(),
            daily_cap: 25,
            spacing_minutes: 30,
        }
    }
}

impl Campaign {
    pub fn is_active(&self) -> bool {
        matches!(self.status, CampaignStatus::Active)
    }

    pub fn entity_description(&self) -> String {
        format!("活动 '{}' (ID: {})", self.name, self.id)
    }
}

/// 潜在客户(被触达对象)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prospect {
    pub id: Uuid,
    pub campaign_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    /// 服务商侧的个人主页ID
    pub external_profile_id: Option<String>,
    pub profile_url: Option<String>,
    pub status: ProspectStatus,
    /// 最近一次对该客户的发送动作时间
    pub last_action_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Prospect {
    /// 是否具备可投递的身份信息
    pub fn has_identity(&self) -> bool {
        self.external_profile_id
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty())
            || self
                .profile_url
                .as_deref()
                .is_some_and(|s| !s.trim().is_empty())
    }

    /// 发送动作完成后推进生命周期一步
    ///
    /// `total_follow_ups` 是活动计划中的跟进总数, 最后一条跟进发出后
    /// 客户进入COMPLETED。非法流转返回错误, 不落库。
    pub fn advance_after(
        &self,
        slot: MessageSlot,
        total_follow_ups: u8,
    ) -> OutreachResult<ProspectStatus> {
        let next = match (self.status, slot) {
            (
                ProspectStatus::Pending
                | ProspectStatus::Approved
                | ProspectStatus::ReadyToMessage
                | ProspectStatus::Failed,
                MessageSlot::ConnectionRequest,
            ) => ProspectStatus::CrSent,
            (ProspectStatus::CrSent, MessageSlot::FollowUp(n)) => ProspectStatus::FollowUpSent(n),
            (ProspectStatus::FollowUpSent(m), MessageSlot::FollowUp(n)) if n > m => {
                ProspectStatus::FollowUpSent(n)
            }
            (from, to_slot) => {
                return Err(OutreachError::InvalidStateTransition {
                    from: from.as_str(),
                    to: format!("发送 {}", to_slot.as_str()),
                })
            }
        };

        if let ProspectStatus::FollowUpSent(n) = next {
            if n >= total_follow_ups {
                return Ok(ProspectStatus::Completed);
            }
        }
        Ok(next)
    }

    pub fn entity_description(&self) -> String {
        format!(
            "客户 '{} {}' (ID: {})",
            self.first_name, self.last_name, self.id
        )
    }
}

/// 潜在客户生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum ProspectStatus {
    Pending,
    Approved,
    ReadyToMessage,
    /// 建联请求已发出
    CrSent,
    /// 第n条跟进已发出(1起)
    FollowUpSent(u8),
    Completed,
    Failed,
    OptedOut,
}

impl ProspectStatus {
    pub fn as_str(&self) -> String {
        match self {
            ProspectStatus::Pending => "PENDING".to_string(),
            ProspectStatus::Approved => "APPROVED".to_string(),
            ProspectStatus::ReadyToMessage => "READY_TO_MESSAGE".to_string(),
            ProspectStatus::CrSent => "CR_SENT".to_string(),
            ProspectStatus::FollowUpSent(n) => format!("FOLLOW_UP_SENT_{n}"),
            ProspectStatus::Completed => "COMPLETED".to_string(),
            ProspectStatus::Failed => "FAILED".to_string(),
            ProspectStatus::OptedOut => "OPTED_OUT".to_string(),
        }
    }

    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "PENDING" => Ok(ProspectStatus::Pending),
            "APPROVED" => Ok(ProspectStatus::Approved),
            "READY_TO_MESSAGE" => Ok(ProspectStatus::ReadyToMessage),
            "CR_SENT" => Ok(ProspectStatus::CrSent),
            "COMPLETED" => Ok(ProspectStatus::Completed),
            "FAILED" => Ok(ProspectStatus::Failed),
            "OPTED_OUT" => Ok(ProspectStatus::OptedOut),
            other => {
                if let Some(n) = other.strip_prefix("FOLLOW_UP_SENT_") {
                    n.parse::<u8>()
                        .map(ProspectStatus::FollowUpSent)
                        .map_err(|_| format!("Invalid prospect status: {other}"))
                } else {
                    Err(format!("Invalid prospect status: {other}"))
                }
            }
        }
    }

    /// 终态客户不再参与排期与发送
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProspectStatus::Completed | ProspectStatus::Failed | ProspectStatus::OptedOut
        )
    }
}

impl From<ProspectStatus> for String {
    fn from(value: ProspectStatus) -> Self {
        value.as_str()
    }
}

impl TryFrom<String> for ProspectStatus {
    type Error = String;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        ProspectStatus::parse(&value)
    }
}

impl sqlx::Type<sqlx::Postgres> for ProspectStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        sqlx::postgres::PgTypeInfo::with_name("VARCHAR")
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for ProspectStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        ProspectStatus::parse(s).map_err(Into::into)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for ProspectStatus {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode(self.as_str(), buf)
    }
}

/// 发送账号
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessagingAccount {
    pub id: Uuid,
    /// 服务商侧账号ID
    pub provider_account_id: String,
    pub display_name: String,
    pub status: AccountStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MessagingAccount {
    pub fn is_connected(&self) -> bool {
        matches!(self.status, AccountStatus::Connected)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AccountStatus {
    #[serde(rename = "CONNECTED")]
    Connected,
    #[serde(rename = "DISCONNECTED")]
    Disconnected,
}

impl sqlx::Type<sqlx::Postgres> for AccountStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        sqlx::postgres::PgTypeInfo::with_name("VARCHAR")
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for AccountStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        match s {
            "CONNECTED" => Ok(AccountStatus::Connected),
            "DISCONNECTED" => Ok(AccountStatus::Disconnected),
            _ => Err(format!("Invalid account status: {s}").into()),
        }
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for AccountStatus {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        let s = match self {
            AccountStatus::Connected => "CONNECTED",
            AccountStatus::Disconnected => "DISCONNECTED",
        };
        <&str as sqlx::Encode<sqlx::Postgres>>::encode(s, buf)
    }
}

/// 消息档位: 建联请求或第n条跟进
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum MessageSlot {
    ConnectionRequest,
    /// 1起编号
    FollowUp(u8),
}

impl MessageSlot {
    /// 档位序号, 建联请求为0
    pub fn index(&self) -> u8 {
        match self {
            MessageSlot::ConnectionRequest => 0,
            MessageSlot::FollowUp(n) => *n,
        }
    }

    pub fn as_str(&self) -> String {
        match self {
            MessageSlot::ConnectionRequest => "CONNECTION_REQUEST".to_string(),
            MessageSlot::FollowUp(n) => format!("FOLLOW_UP_{n}"),
        }
    }

    pub fn parse(s: &str) -> Result<Self, String> {
        match s {
            "CONNECTION_REQUEST" => Ok(MessageSlot::ConnectionRequest),
            other => {
                if let Some(n) = other.strip_prefix("FOLLOW_UP_") {
                    match n.parse::<u8>() {
                        Ok(n) if n >= 1 => Ok(MessageSlot::FollowUp(n)),
                        _ => Err(format!("Invalid message slot: {other}")),
                    }
                } else {
                    Err(format!("Invalid message slot: {other}"))
                }
            }
        }
    }
}

impl PartialOrd for MessageSlot {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MessageSlot {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.index().cmp(&other.index())
    }
}

impl From<MessageSlot> for String {
    fn from(value: MessageSlot) -> Self {
        value.as_str()
    }
}

impl TryFrom<String> for MessageSlot {
    type Error = String;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        MessageSlot::parse(&value)
    }
}

impl sqlx::Type<sqlx::Postgres> for MessageSlot {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        sqlx::postgres::PgTypeInfo::with_name("VARCHAR")
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for MessageSlot {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        MessageSlot::parse(s).map_err(Into::into)
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for MessageSlot {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode(self.as_str(), buf)
    }
}

/// 发送队列中的一条待发送事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendEvent {
    pub id: i64,
    pub campaign_id: Uuid,
    pub prospect_id: Uuid,
    pub account_id: Uuid,
    pub slot: MessageSlot,
    pub scheduled_for: DateTime<Utc>,
    /// 已渲染完成的消息正文
    pub message: String,
    pub status: SendEventStatus,
    pub provider_message_id: Option<String>,
    pub error_code: Option<String>,
    pub error_detail: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub claimed_by: Option<String>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SendEvent {
    pub fn new(
        campaign_id: Uuid,
        prospect_id: Uuid,
        account_id: Uuid,
        slot: MessageSlot,
        scheduled_for: DateTime<Utc>,
        message: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // 将由数据库生成
            campaign_id,
            prospect_id,
            account_id,
            slot,
            scheduled_for,
            message,
            status: SendEventStatus::Pending,
            provider_message_id: None,
            error_code: None,
            error_detail: None,
            sent_at: None,
            claimed_by: None,
            claimed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.status == SendEventStatus::Pending && self.scheduled_for <= now
    }

    /// 终态事件是不可变历史
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn entity_description(&self) -> String {
        format!(
            "发送事件 (ID: {}, 客户: {}, 档位: {})",
            self.id,
            self.prospect_id,
            self.slot.as_str()
        )
    }
}

/// 发送事件状态
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SendEventStatus {
    #[serde(rename = "PENDING")]
    Pending,
    #[serde(rename = "IN_FLIGHT")]
    InFlight,
    #[serde(rename = "SENT")]
    Sent,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "CANCELLED")]
    Cancelled,
}

impl SendEventStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SendEventStatus::Sent | SendEventStatus::Failed | SendEventStatus::Cancelled
        )
    }
}

impl sqlx::Type<sqlx::Postgres> for SendEventStatus {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        sqlx::postgres::PgTypeInfo::with_name("VARCHAR")
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for SendEventStatus {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        match s {
            "PENDING" => Ok(SendEventStatus::Pending),
            "IN_FLIGHT" => Ok(SendEventStatus::InFlight),
            "SENT" => Ok(SendEventStatus::Sent),
            "FAILED" => Ok(SendEventStatus::Failed),
            "CANCELLED" => Ok(SendEventStatus::Cancelled),
            _ => Err(format!("Invalid send event status: {s}").into()),
        }
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for SendEventStatus {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        let s = match self {
            SendEventStatus::Pending => "PENDING",
            SendEventStatus::InFlight => "IN_FLIGHT",
            SendEventStatus::Sent => "SENT",
            SendEventStatus::Failed => "FAILED",
            SendEventStatus::Cancelled => "CANCELLED",
        };
        <&str as sqlx::Encode<sqlx::Postgres>>::encode(s, buf)
    }
}
