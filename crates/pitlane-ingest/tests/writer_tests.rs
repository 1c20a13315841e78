//! Upsert writer tests against the in-memory store

mod helpers;

use helpers::MemoryStore;
use pitlane_common::types::UpsertOutcome;
use pitlane_ingest::models::rows::{Candidate, SeasonRow};
use pitlane_ingest::writer::UpsertWriter;

#[tokio::test]
async fn test_unresolved_candidate_is_skipped_without_writing() {
    let store = MemoryStore::new();
    let writer = UpsertWriter::new(store.clone());

    let (outcome, id) = writer.upsert_resolved(None, "Atlantis Grand Prix (circuit atlantis)").await.unwrap();

    assert_eq!(outcome, UpsertOutcome::Skipped);
    assert!(id.is_none());
    let state = store.state();
    assert!(state.races.is_empty());
    assert!(state.seasons.is_empty());
}

#[tokio::test]
async fn test_resolved_candidate_creates_then_updates() {
    let store = MemoryStore::new();
    let writer = UpsertWriter::new(store.clone());
    let season = || Some(Candidate::Season(SeasonRow { year: 2030 }));

    let (first, first_id) = writer.upsert_resolved(season(), "season 2030").await.unwrap();
    let (second, second_id) = writer.upsert_resolved(season(), "season 2030").await.unwrap();

    assert_eq!(first, UpsertOutcome::Created);
    assert_eq!(second, UpsertOutcome::Updated);
    assert!(first_id.is_some());
    assert_eq!(first_id, second_id);
    assert_eq!(store.state().seasons.len(), 1);
}
