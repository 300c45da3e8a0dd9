pub mod access;
pub mod events;
pub mod notifications;
pub mod verification;
