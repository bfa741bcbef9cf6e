mod error;
mod path;
mod policy;
mod request;

pub use error::PolicyError;
pub use policy::{Policy, PolicyVerdict};
pub use request::PolicyRequest;
