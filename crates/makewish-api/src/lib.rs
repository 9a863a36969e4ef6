pub mod auth;
pub mod error;
pub mod functions;
pub mod items;
pub mod mail;
pub mod middleware;
pub mod reminders;
pub mod routes;
pub mod share;
pub mod state;
pub mod storage;
pub mod uploads;
pub mod wishlists;
