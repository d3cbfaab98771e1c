//! Integration test suite for btclight.
//!
//! Drives the light client, node, and RPC server through the regtest
//! fixture chain and through adversarial inputs. Shared fixtures live in
//! [`helpers`].

pub mod helpers;
