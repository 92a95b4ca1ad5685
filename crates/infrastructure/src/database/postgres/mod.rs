pub mod account_repository;
pub mod campaign_repository;
pub mod prospect_repository;
pub mod send_queue_repository;

pub use account_repository::PostgresAccountRepository;
pub use campaign_repository::PostgresCampaignRepository;
pub use prospect_repository::PostgresProspectRepository;
pub use send_queue_repository::PostgresSendQueueRepository;
