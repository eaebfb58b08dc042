pub mod decision;
pub mod intent;
pub mod strategy;
