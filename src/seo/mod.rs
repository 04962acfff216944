pub mod meta;
pub mod sitemap;

pub use meta::build_meta;
