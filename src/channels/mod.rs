//! 渠道实现

pub mod business_chat;
pub mod email;
pub mod in_app;
pub mod push;
pub mod sms;

pub use business_chat::{BusinessChatChannel, BusinessChatConfig};
pub use email::EmailChannel;
pub use in_app::{InAppChannel, Toast};
pub use push::PushChannel;
pub use sms::SmsChannel;
