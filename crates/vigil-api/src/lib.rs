pub mod auth;
pub mod comments;
pub mod error;
pub mod export;
pub mod middleware;
pub mod moderation;
pub mod news;
pub mod profile;
pub mod users;
