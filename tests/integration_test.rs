use haul_dispatch::{
    config::AppConfig,
    db::{self, queries::PgJobRepository, JobRepository, RepositoryError},
    models::geofence::Geofence,
    models::job::{Assignment, HaulJob},
    models::location::Location,
    services::state_machine::JobStatus,
};

/// Integration test: Postgres-backed repository round trip
///
/// This test verifies the complete integration:
/// 1. Database connection and migrations
/// 2. Job insert with wire-format geofence storage
/// 3. Job retrieval (status, geofence, assignment decode)
/// 4. Compare-and-set update semantics
///
/// Note: This requires a running PostgreSQL instance configured via
/// environment variables.
#[tokio::test]
#[ignore] // Run with: cargo test --test integration_test -- --ignored
async fn test_pg_repository_round_trip() {
    // Load config from environment
    let config = AppConfig::from_env().expect("Failed to load config");

    // Initialize database
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run migrations");

    let repo = PgJobRepository::new(db_pool);

    // 1. Insert a PO with a polygonal pickup fence
    let fence = Geofence::polygon(vec![
        Location::new(39.995, -75.006),
        Location::new(39.995, -74.994),
        Location::new(40.005, -74.994),
        Location::new(40.005, -75.006),
    ])
    .expect("valid fence");

    let job = HaulJob::new(
        "integration-client".into(),
        "integration run".into(),
        "clean fill".into(),
        Some(fence.clone()),
        None,
        false,
    );
    repo.insert(&job).await.expect("Failed to insert job");

    // 2. Read it back; geofence survives the wire round trip
    let stored = repo.get_by_id(job.id).await.expect("Failed to get job");
    assert_eq!(stored.status, JobStatus::Available);
    assert_eq!(stored.pickup_geofence, Some(fence));
    assert!(stored.hauler_ref.is_none());

    // 3. Guarded update succeeds against the expected status
    let mut accepted = stored.clone();
    accepted.status = JobStatus::Accepted;
    accepted.hauler_ref = Some("d-117".into());
    accepted.assignment = Some(Assignment {
        truck_number: "T1".into(),
        driver_name: "J. Doe".into(),
        starting_location: "North yard".into(),
        estimated_arrival: None,
        notes: None,
    });
    let updated = repo
        .update(&accepted, JobStatus::Available)
        .await
        .expect("Failed to update job");
    assert_eq!(updated.status, JobStatus::Accepted);
    assert_eq!(updated.assignment.as_ref().unwrap().truck_number, "T1");

    // 4. Stale writer loses the compare-and-set
    let mut stale = stored;
    stale.status = JobStatus::Rejected;
    let conflict = repo.update(&stale, JobStatus::Available).await;
    assert!(matches!(conflict, Err(RepositoryError::Conflict)));

    // Status was left untouched by the failed CAS
    let final_job = repo.get_by_id(job.id).await.expect("Failed to get job");
    assert_eq!(final_job.status, JobStatus::Accepted);
}
