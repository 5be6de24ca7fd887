//! Authentication adapters

mod token;

pub use token::{TokenAuthProvider, ACCESS_TOKEN_ENV};
