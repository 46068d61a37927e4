pub mod notification;

pub use notification::{Audience, LogChannel, Notification, NotificationChannel, Priority};
