pub mod fits;
pub mod o11y;
pub mod testing;
