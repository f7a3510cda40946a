//! Error types shared with the rest of axetune

pub use at_error::{FatalScope, Result, TuneError};
