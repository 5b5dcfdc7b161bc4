#![allow(clippy::new_without_default)]

pub mod actor;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod error;
pub mod game;
pub mod ingest;
pub mod item;
pub mod item_id;
pub mod loader;
pub mod matchup;
pub mod oauth;
pub mod preview;
pub mod util;
pub mod webapi;
