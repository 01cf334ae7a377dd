pub mod base;
pub mod notification;

pub use base::BaseDao;
pub use notification::{MongoNotificationBackend, NotificationDao};
