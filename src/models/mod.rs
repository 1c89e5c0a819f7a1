//! Domain model module declarations.

pub mod effect;
pub mod report;
pub mod session;
pub mod turn;
pub mod violation;
