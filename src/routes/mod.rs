pub mod demo;
pub mod issuer;
