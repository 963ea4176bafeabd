//! Concrete implementations of the marketplace ports.
//!
//! [`SupabaseBackend`] speaks the hosted auth and REST protocol, [`InMemoryBackend`]
//! keeps everything in process for offline runs and tests, and [`WebhookNotifier`]
//! posts listing notifications to the automation endpoint.

pub mod memory;
pub mod supabase;
pub mod webhook;

pub use memory::InMemoryBackend;
pub use supabase::SupabaseBackend;
pub use webhook::WebhookNotifier;
