//! `salescast-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, calendar periods and the shared error model.

pub mod calendar;
pub mod error;
pub mod id;
pub mod value_object;

pub use calendar::{DateWindow, Month, YearMonth};
pub use error::{DomainError, DomainResult};
pub use id::{RunId, Sku};
pub use value_object::ValueObject;
