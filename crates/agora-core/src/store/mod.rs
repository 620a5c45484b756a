pub mod db;
pub mod live;
pub mod notification_store;

pub use db::Database;
pub use live::Subscription;
pub use notification_store::NotificationStore;
