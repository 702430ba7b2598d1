//! Framevault-Common: shared types and utilities.
//!
//! This crate provides functionality used across framevault:
//!
//! - **Core Types**: the [`MediaType`] enum used to route movie vs. TV lookups
//! - **Locale Utilities**: the default locale fallback chain and helpers
//! - **Error Handling**: the common [`Error`] type and [`Result`] alias
//!
//! # Examples
//!
//! ```
//! use framevault_common::{Error, MediaType, Result};
//! use framevault_common::locale::default_locale_chain;
//!
//! let media_type = MediaType::Movie;
//! assert_eq!(default_locale_chain("zh-TW"), vec!["zh-TW", "zh-CN", "en"]);
//!
//! fn example() -> Result<()> {
//!     Err(Error::not_found("item"))
//! }
//! ```

pub mod error;
pub mod locale;
pub mod types;

pub use error::{Error, Result};
pub use types::MediaType;
