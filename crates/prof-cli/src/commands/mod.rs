//! CLI subcommand implementations.

pub mod combine;
pub mod inspect;
pub mod record;
