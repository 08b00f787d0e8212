//! Domain model module declarations.

pub mod combination;
pub mod project;
pub mod statistics;
