//! Lexroute - legal assistant query router.
//!
//! Classifies each query, fans out to general-law and company-document
//! research concurrently, joins the branches and streams the answer to the
//! client's live session as text or synthesized speech.

pub mod config;
pub mod error;
pub mod orchestration;
pub mod server;
pub mod services;
pub mod streaming;

pub use config::AppConfig;
pub use error::{Error, Result};
