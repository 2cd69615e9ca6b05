pub mod diary;
pub mod emotion_stats;
pub mod image;
pub mod notification;
pub mod user;
