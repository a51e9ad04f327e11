mod dto;
pub mod services;

pub use services::{CodeSender, EmailError, ResendSender};
