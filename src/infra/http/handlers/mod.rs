mod conversions;
mod download;
mod health;

pub use conversions::{get_conversion, list_formats, submit_conversion};
pub use download::download_conversion;
pub use health::health_check;
