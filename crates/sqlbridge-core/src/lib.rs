//! Core types for sqlbridge.
//!
//! This crate holds the host-side vocabulary of the bridge, independent of
//! the native engine:
//!
//! - [`Error`] and [`Result`], the single error type every native status is
//!   translated into
//! - [`Value`] and [`ValueType`], the five storage classes
//! - [`Row`], an owned snapshot of one result row

pub mod error;
pub mod row;
pub mod value;

pub use error::{
    BindError, CallbackError, CallbackKind, ConfigError, Error, HandleKind, MisuseError,
    MisuseKind, NativeError, Result, StaleHandleError,
};
pub use row::Row;
pub use value::{Value, ValueType};
