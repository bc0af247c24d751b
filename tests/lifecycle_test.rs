//! End-to-end lifecycle tests against the in-memory repository.
//!
//! These cover the full path a purchase order takes: client approval,
//! publication, operator acceptance, the geofence-gated arrival, completion
//! and administrative verification. No external infrastructure required.

use std::sync::Arc;
use std::time::Duration;

use haul_dispatch::db::memory::InMemoryJobRepository;
use haul_dispatch::db::JobRepository;
use haul_dispatch::models::geofence::Geofence;
use haul_dispatch::models::job::{Assignment, Completion, HaulJob};
use haul_dispatch::models::location::Location;
use haul_dispatch::models::session::DriverSession;
use haul_dispatch::services::lifecycle::{
    LifecycleController, LifecycleError, MissingGeofencePolicy, TransitionPayload,
};
use haul_dispatch::services::location_feed::{LocationError, LocationFeed, LocationSource};
use haul_dispatch::services::state_machine::JobStatus;

fn setup() -> (Arc<InMemoryJobRepository>, Arc<LifecycleController>) {
    let repo = Arc::new(InMemoryJobRepository::new());
    let controller = Arc::new(LifecycleController::new(
        repo.clone(),
        MissingGeofencePolicy::RequireGeofence,
    ));
    (repo, controller)
}

fn pickup_fence() -> Geofence {
    // 500 m circle around the quarry scale house.
    Geofence::circle(Location::new(40.0, -75.0), 500.0).unwrap()
}

fn assignment() -> Assignment {
    Assignment {
        truck_number: "T1".into(),
        driver_name: "J. Doe".into(),
        starting_location: "North yard".into(),
        estimated_arrival: None,
        notes: Some("tri-axle".into()),
    }
}

async fn create_po(repo: &InMemoryJobRepository, requires_approval: bool) -> HaulJob {
    let job = HaulJob::new(
        "acme-paving".into(),
        "haul 2A modified from the quarry to the plant".into(),
        "2A modified stone".into(),
        Some(pickup_fence()),
        None,
        requires_approval,
    );
    repo.insert(&job).await.unwrap();
    job
}

#[tokio::test]
async fn full_job_lifecycle() {
    let (repo, controller) = setup();
    let operator = DriverSession::operator("J. Doe", "d-117");
    let client = DriverSession::operator("Acme Dispatcher", "acme-1");
    let admin = DriverSession::admin("Back Office", "adm-1");

    // Client creates a PO that needs sign-off.
    let po = create_po(&repo, true).await;
    assert_eq!(po.status, JobStatus::PendingApproval);

    // Approval track: approve, then publish to haulers.
    let approved = controller
        .request_transition(po.id, JobStatus::Approved, TransitionPayload::default(), &client)
        .await
        .unwrap();
    assert!(approved.approved_at.is_some());

    controller
        .request_transition(po.id, JobStatus::Available, TransitionPayload::default(), &client)
        .await
        .unwrap();

    // Operator accepts with assignment details and heads out.
    let accepted = controller
        .request_transition(
            po.id,
            JobStatus::Accepted,
            TransitionPayload::with_assignment(assignment()),
            &operator,
        )
        .await
        .unwrap();
    assert_eq!(accepted.hauler_ref.as_deref(), Some("d-117"));

    controller
        .request_transition(po.id, JobStatus::EnRoute, TransitionPayload::default(), &operator)
        .await
        .unwrap();

    // Still on the highway: 2 km out, no transition, positive distance.
    let far = controller
        .evaluate(po.id, Location::new(40.02, -75.0))
        .await
        .unwrap();
    assert_eq!(far.status, JobStatus::EnRoute);
    assert!(!far.transitioned);
    assert!(far.containment.as_ref().unwrap().distance_to_boundary_m > 1000.0);

    // Pulling onto the scale: inside the fence, automatic arrival.
    let arrived = controller
        .evaluate(po.id, Location::new(40.001, -75.001))
        .await
        .unwrap();
    assert_eq!(arrived.status, JobStatus::OnSite);
    assert!(arrived.transitioned);

    // Loading, hauling, delivering.
    controller
        .request_transition(po.id, JobStatus::InProgress, TransitionPayload::default(), &operator)
        .await
        .unwrap();
    let completed = controller
        .request_transition(
            po.id,
            JobStatus::Completed,
            TransitionPayload::with_completion(Completion {
                delivery_confirmation: "delivered, ticket 4471".into(),
                can_tracking: Some("CT-4471".into()),
                photo_ref: None,
            }),
            &operator,
        )
        .await
        .unwrap();
    assert!(completed.completed_at.is_some());

    // Back office verifies.
    let verified = controller
        .request_transition(po.id, JobStatus::Verified, TransitionPayload::default(), &admin)
        .await
        .unwrap();
    assert_eq!(verified.status, JobStatus::Verified);
    assert!(verified.verified_at.is_some());
}

#[tokio::test]
async fn scenario_accept_populates_assignment() {
    let (repo, controller) = setup();
    let operator = DriverSession::operator("J. Doe", "d-117");

    let po = create_po(&repo, false).await;
    assert_eq!(po.status, JobStatus::Available);

    let accepted = controller
        .request_transition(
            po.id,
            JobStatus::Accepted,
            TransitionPayload::with_assignment(assignment()),
            &operator,
        )
        .await
        .unwrap();

    assert_eq!(accepted.status, JobStatus::Accepted);
    let a = accepted.assignment.unwrap();
    assert_eq!(a.truck_number, "T1");
    assert_eq!(a.driver_name, "J. Doe");
}

#[tokio::test]
async fn scenario_empty_delivery_confirmation_rejected() {
    let (repo, controller) = setup();
    let operator = DriverSession::operator("J. Doe", "d-117");

    let mut po = create_po(&repo, false).await;
    po.status = JobStatus::InProgress;
    po.assignment = Some(assignment());
    repo.update(&po, JobStatus::Available).await.unwrap();

    let err = controller
        .request_transition(
            po.id,
            JobStatus::Completed,
            TransitionPayload::with_completion(Completion {
                delivery_confirmation: "   ".into(),
                can_tracking: None,
                photo_ref: None,
            }),
            &operator,
        )
        .await
        .unwrap_err();

    assert!(matches!(err, LifecycleError::GuardFailed { .. }));
    assert_eq!(
        repo.get_by_id(po.id).await.unwrap().status,
        JobStatus::InProgress
    );
}

#[tokio::test]
async fn evaluate_stampede_commits_arrival_once() {
    let (repo, controller) = setup();
    let operator = DriverSession::operator("J. Doe", "d-117");

    let mut po = create_po(&repo, false).await;
    po.status = JobStatus::EnRoute;
    po.assignment = Some(assignment());
    repo.update(&po, JobStatus::Available).await.unwrap();

    // A burst of identical in-fence samples (device retries, overlapping
    // polls). Exactly one commits the arrival; the rest are no-ops.
    let at_center = Location::new(40.0, -75.0);
    let results = futures::future::join_all(
        (0..8).map(|_| controller.evaluate(po.id, at_center)),
    )
    .await;

    let transitions = results
        .iter()
        .filter(|r| matches!(r, Ok(e) if e.transitioned))
        .count();
    assert_eq!(transitions, 1);
    assert!(results.iter().all(|r| r.is_ok()));
    assert_eq!(repo.get_by_id(po.id).await.unwrap().status, JobStatus::OnSite);
}

/// Scripted source for feed-driven tests: approach the pickup fence one fix
/// at a time.
struct ApproachRoute {
    fixes: std::sync::Mutex<std::vec::IntoIter<Result<Location, LocationError>>>,
}

#[async_trait::async_trait]
impl LocationSource for ApproachRoute {
    async fn current_location(&self) -> Result<Location, LocationError> {
        self.fixes
            .lock()
            .unwrap()
            .next()
            .unwrap_or(Err(LocationError::Unavailable("route exhausted".into())))
    }
}

#[tokio::test]
async fn feed_drives_automatic_arrival() {
    let (repo, controller) = setup();
    let operator = DriverSession::operator("J. Doe", "d-117");

    let po = create_po(&repo, false).await;
    controller
        .request_transition(
            po.id,
            JobStatus::Accepted,
            TransitionPayload::with_assignment(assignment()),
            &operator,
        )
        .await
        .unwrap();
    controller
        .request_transition(po.id, JobStatus::EnRoute, TransitionPayload::default(), &operator)
        .await
        .unwrap();

    // Three fixes: far out, a dropped fix, then inside the fence.
    let source = Arc::new(ApproachRoute {
        fixes: std::sync::Mutex::new(
            vec![
                Ok(Location::new(40.05, -75.0)),
                Err(LocationError::Timeout),
                Ok(Location::new(40.0, -75.0)),
            ]
            .into_iter(),
        ),
    });
    let (feed, mut samples) = LocationFeed::start(source, Duration::from_millis(10));

    // The tracker loop in miniature: evaluate each good fix, skip failures.
    let mut status = JobStatus::EnRoute;
    while let Some(sample) = samples.recv().await {
        let Ok(location) = sample else { continue };
        let evaluation = controller.evaluate(po.id, location).await.unwrap();
        status = evaluation.status;
        if !matches!(status, JobStatus::Accepted | JobStatus::EnRoute) {
            break;
        }
    }
    feed.stop();

    assert_eq!(status, JobStatus::OnSite);
    assert_eq!(repo.get_by_id(po.id).await.unwrap().status, JobStatus::OnSite);
}
