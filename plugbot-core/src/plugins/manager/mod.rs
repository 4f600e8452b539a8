pub mod core;
pub mod installer;

pub use self::core::PluginManager;
pub use installer::{GitInstaller, PluginInstaller};
