//! Client identity resolution.

mod resolver;

pub use resolver::{ClientIdentity, IdentityResolver, RequestContext};
