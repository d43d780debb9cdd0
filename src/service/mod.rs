pub mod accounts;
pub mod activity;
pub mod auth;
pub mod cache;
pub mod config;
pub mod oauth;
pub mod otp;
pub mod password;
pub mod token;
