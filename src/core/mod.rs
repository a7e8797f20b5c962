pub mod config;
pub mod data;
pub mod driver;

pub use config::{Settings, SettingsOverride};
pub use data::{DataSource, RecordFeed};
pub use driver::Driver;
