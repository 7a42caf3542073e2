//! CourseHub: learning-platform backend in Rust
//!
//! REST API for courses, lessons, users, subscriptions and payments on an
//! embedded Sled store, with JWT authentication and a Stripe-style checkout
//! flow against an external payment provider.
//!
//! This lib exposes the storage layer, the policy engine and the HTTP API.

pub mod auth;
pub mod config;
pub mod error;
pub mod models;
// Owner/moderator/superuser decisions, one table for every resource
pub mod policy;
// REST API module: Axum HTTP handlers, trailing-slash route convention
pub mod rest;
pub mod serializers;
pub mod storage;
pub mod stripe;
pub mod validators;
