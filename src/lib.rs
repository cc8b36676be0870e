//! # Bankd (Banking Auth & Session Authority)
//!
//! `bankd` issues and verifies the credentials used by the banking API. It
//! authenticates users, mints access and refresh tokens, authorizes routes
//! per role, and walks new customers through email-confirmed registration.
//!
//! ## Tokens
//!
//! Three token kinds exist: short-lived access tokens (1 hour), long-lived
//! refresh tokens (30 days) and one-time tokens for email confirmation links
//! (1 hour). Every token is an RS256-signed JWT sealed inside an encrypted
//! envelope, so claims are never readable in transit or at rest.
//!
//! ## Authorization
//!
//! Routes are gated by a static role table: `admin` sees every customer,
//! `user` only their own customer and accounts. Tokens carry the customer
//! identity, and requests naming a different customer are rejected.
//!
//! ## Registration
//!
//! Sign-up is a two-phase flow: a pending registration row plus a mailed
//! confirmation link, then account creation in a single transaction once the
//! link is followed. Resends are throttled per registration.

pub mod api;
pub mod authz;
pub mod cli;
pub mod email;
pub mod error;
pub mod password;
pub mod rate_limit;
pub mod service;
pub mod store;
pub mod token;
