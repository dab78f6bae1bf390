//! GLM usage monitoring - refresh-and-normalize pipeline

pub mod coordinator;
pub mod fetcher;
pub mod mock;
pub mod models;
pub mod normalize;
pub mod settings;

pub use coordinator::*;
pub use fetcher::*;
pub use mock::*;
pub use models::*;
pub use normalize::*;
pub use settings::*;
