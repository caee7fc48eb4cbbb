pub mod connstate;
pub mod handler;
pub mod msg_create_handler;
pub mod msg_join_handler;
pub mod msg_media_handler;
pub mod msg_ping_handler;
pub mod msg_report_handler;
