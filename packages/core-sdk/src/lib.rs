pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod keystore;
pub mod models;
pub mod playground;
pub mod server;
pub mod telemetry;
pub mod upstream;
pub mod views;

#[cfg(test)]
mod test_support;

/**
 * \brief SDK 预导入集合，方便外部引用常用模块。
 */
pub mod prelude {
    pub use crate::catalog::{self, CatalogApi, CatalogClient, CatalogFilters};
    pub use crate::config;
    pub use crate::db;
    pub use crate::error::ApiError;
    pub use crate::keystore::KeyStore;
    pub use crate::models::{self, Category, Message, ModelDescriptor, Role, Tier};
    pub use crate::playground::{self, PlaygroundApi, PlaygroundClient};
    pub use crate::server;
    pub use crate::telemetry;
    pub use crate::views;
}
