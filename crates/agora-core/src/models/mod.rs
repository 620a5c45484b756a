pub mod notification;
pub mod post;
pub mod profile;
pub mod settings;

pub use notification::{NotificationKind, NotificationPayload, NotificationRecord};
pub use post::Post;
pub use profile::Profile;
pub use settings::NotificationSettings;
