pub mod catalog;
pub mod cigale;
pub mod conf;
pub mod photometry;
pub mod pipeline;
pub mod utils;
