pub mod interval;
pub mod records;
pub mod settlement_point;

pub use interval::*;
pub use records::*;
pub use settlement_point::*;
