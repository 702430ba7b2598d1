//! Concrete metadata provider implementations.

pub mod douban;
pub mod tmdb;
pub mod wikipedia;

pub use douban::DoubanProvider;
pub use tmdb::TmdbProvider;
pub use wikipedia::WikipediaProvider;
