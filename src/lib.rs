//! Personal to-do list backend.
//!
//! Owners manage todos, categories and file attachments over a JSON HTTP
//! API. Every row belongs to exactly one owner, resolved from the request's
//! bearer token.

pub mod api;
pub mod domain;
pub mod infrastructure;
