pub mod model;
pub mod module;
pub mod processor;

pub use module::XatuPublicContributorsModule;
