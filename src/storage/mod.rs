// src/storage/mod.rs
pub mod journal;
pub mod profile_store;

pub use journal::{JournalSink, MemoryJournal, PgJournalSink};
pub use profile_store::{MemoryProfileStore, PgProfileStore, ProfileStore};
