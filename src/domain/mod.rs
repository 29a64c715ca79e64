//! Domain layer - business logic with no infrastructure dependencies.

pub mod foundation;
pub mod gateway;
pub mod wallet;
