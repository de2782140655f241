pub mod context;
pub mod memories;
pub mod preferences;
pub mod sessions;
pub mod status;
