//! Storefront client shell.
//!
//! This crate wires the session subsystem to a real Keycloak realm and the
//! storefront API gateway: it loads configuration, runs the login redirect
//! through a loopback listener, guards navigation, and sends authenticated
//! API calls.

pub mod api;
pub mod callback;
pub mod config;
pub mod error;
pub mod navigator;
pub mod oidc;
pub mod pages;
pub mod routes;
