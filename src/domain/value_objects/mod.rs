pub mod quantity;
pub mod quote;
