//! Service-level tests over the in-memory store.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use sso_platform::domain::{Application, DocumentType, IdentityValidation, ValidationStatus};
use sso_platform::repository::{InMemoryStore, StorageResult, UserProvider, ValidationProvider};
use sso_platform::service::{
    Argon2Config, CredentialService, PasswordService, PermissionService, TokenIssuer, VerificationOrchestrator,
};
use sso_platform::tasks::{IdentityVerificationHandler, VerificationPipeline, TASK_IDENTIFIER};
use sso_platform::{FaultClass, PlatformError};
use sso_queue::{QueueError, Task, TaskHandler, TaskPublisher};

// ============================================================================
// Fakes
// ============================================================================

/// Records submitted tasks instead of delivering them.
#[derive(Default)]
struct RecordingPublisher {
    tasks: Mutex<Vec<Task>>,
}

impl RecordingPublisher {
    fn take(&self) -> Vec<Task> {
        std::mem::take(&mut *self.tasks.lock())
    }
}

#[async_trait]
impl TaskPublisher for RecordingPublisher {
    fn identifier(&self) -> &str {
        "recording"
    }

    async fn submit(&self, name: &str, payload: serde_json::Value) -> sso_queue::Result<String> {
        let task = Task::new(name, payload);
        let id = task.id.clone();
        self.tasks.lock().push(task);
        Ok(id)
    }
}

struct ClosedPublisher;

#[async_trait]
impl TaskPublisher for ClosedPublisher {
    fn identifier(&self) -> &str {
        "closed"
    }

    async fn submit(&self, _name: &str, _payload: serde_json::Value) -> sso_queue::Result<String> {
        Err(QueueError::Closed)
    }
}

/// Lets a queued worker run land between the orchestrator's read and its
/// write, so the write has to notice the newer record.
struct WorkerRacingProvider {
    store: Arc<InMemoryStore>,
    worker: IdentityVerificationHandler,
    task: Mutex<Option<Task>>,
}

#[async_trait]
impl ValidationProvider for WorkerRacingProvider {
    async fn validation(&self, id: &str) -> StorageResult<IdentityValidation> {
        let loaded = self.store.validation(id).await?;
        let task = self.task.lock().take();
        if let Some(task) = task {
            self.worker.handle(&task).await.unwrap();
        }
        Ok(loaded)
    }

    async fn active_validation_exists(&self, user_id: &str) -> StorageResult<bool> {
        self.store.active_validation_exists(user_id).await
    }
}

struct Harness {
    store: Arc<InMemoryStore>,
    publisher: Arc<RecordingPublisher>,
    credentials: CredentialService,
    orchestrator: VerificationOrchestrator,
    worker: IdentityVerificationHandler,
}

const APP_ID: i32 = 1;
const PASSWORD: &str = "hunter22";

fn cheap_passwords() -> PasswordService {
    PasswordService::new(&Argon2Config {
        memory_kib: 64,
        iterations: 1,
        parallelism: 1,
    })
    .unwrap()
}

fn harness() -> Harness {
    harness_with(VerificationPipeline::default())
}

fn harness_with(pipeline: VerificationPipeline) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    store.insert_app(Application::new(APP_ID, "portal", "portal-secret"));
    let publisher = Arc::new(RecordingPublisher::default());
    let pipeline = Arc::new(pipeline);

    let credentials = CredentialService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        PermissionService::new(store.clone()),
        cheap_passwords(),
        Duration::from_secs(3600),
    );
    let orchestrator = VerificationOrchestrator::new(
        store.clone(),
        store.clone(),
        store.clone(),
        publisher.clone(),
        pipeline.clone(),
    );
    let worker = IdentityVerificationHandler::new(store.clone(), store.clone(), pipeline);

    Harness {
        store,
        publisher,
        credentials,
        orchestrator,
        worker,
    }
}

impl Harness {
    /// Orchestrator whose first read is followed by a worker run of `task`.
    fn racing_orchestrator(&self, task: Task) -> VerificationOrchestrator {
        let racing = Arc::new(WorkerRacingProvider {
            store: self.store.clone(),
            worker: IdentityVerificationHandler::new(
                self.store.clone(),
                self.store.clone(),
                Arc::new(VerificationPipeline::default()),
            ),
            task: Mutex::new(Some(task)),
        });
        VerificationOrchestrator::new(
            self.store.clone(),
            self.store.clone(),
            racing,
            self.publisher.clone(),
            Arc::new(VerificationPipeline::default()),
        )
    }

    async fn register(&self, email: &str) -> String {
        self.credentials.register_new_user(email, PASSWORD).await.unwrap()
    }

    async fn complete_application(&self, validation_id: &str) {
        self.orchestrator
            .update_validation(
                validation_id,
                r#"{"name":"Ann Example","address":"1 Main St","dateOfBirth":"1990-04-12"}"#,
            )
            .await
            .unwrap();
        self.orchestrator
            .document_upload(validation_id, b"%PDF-1.7 passport scan", "pdf")
            .await
            .unwrap();
    }
}

// ============================================================================
// Credentials
// ============================================================================

#[tokio::test]
async fn test_register_and_login() {
    let h = harness();
    let user_id = h.register("ann@example.com").await;
    assert!(uuid::Uuid::parse_str(&user_id).is_ok());

    let token = h.credentials.login("ann@example.com", PASSWORD, APP_ID).await.unwrap();

    let claims = TokenIssuer::verify(&token, &Application::new(APP_ID, "portal", "portal-secret")).unwrap();
    assert_eq!(claims.uid, user_id);
    assert_eq!(claims.email, "ann@example.com");
    assert_eq!(claims.app_id, APP_ID);
    assert_eq!(claims.exp - claims.iat, 3600);
}

#[tokio::test]
async fn test_duplicate_registration() {
    let h = harness();
    h.register("ann@example.com").await;

    let err = h
        .credentials
        .register_new_user("ann@example.com", "another-password")
        .await
        .unwrap_err();
    assert!(matches!(err, PlatformError::UserExists));
}

#[tokio::test]
async fn test_registration_stores_hash_only() {
    let h = harness();
    let user_id = h.register("ann@example.com").await;

    let stored = h.store.user_by_id(&user_id).await.unwrap();
    let hash = stored.password_hash.expect("password hash stored");
    assert_ne!(hash.as_str(), PASSWORD);
    assert!(!hash.as_str().contains(PASSWORD));
    assert!(hash.as_str().starts_with("$argon2id$"));

    let passwords = cheap_passwords();
    assert!(passwords.verify_password(PASSWORD, &hash).await.unwrap());
    assert!(!passwords.verify_password("another-password", &hash).await.unwrap());

    // A rejected duplicate leaves the first account untouched
    h.credentials
        .register_new_user("ann@example.com", "another-password")
        .await
        .unwrap_err();
    let after = h.store.user_by_id(&user_id).await.unwrap();
    assert!(passwords
        .verify_password(PASSWORD, after.password_hash.as_ref().unwrap())
        .await
        .unwrap());
}

#[tokio::test]
async fn test_login_failures() {
    let h = harness();
    h.register("ann@example.com").await;

    let wrong_password = h.credentials.login("ann@example.com", "wrong-pass", APP_ID).await;
    assert!(matches!(wrong_password, Err(PlatformError::InvalidCredentials)));

    let unknown_user = h.credentials.login("bob@example.com", PASSWORD, APP_ID).await;
    assert!(matches!(unknown_user, Err(PlatformError::InvalidCredentials)));

    let unknown_app = h.credentials.login("ann@example.com", PASSWORD, 99).await;
    assert!(matches!(unknown_app, Err(PlatformError::AppNotFound { app_id: 99 })));

    h.store.set_unavailable(true);
    let down = h.credentials.login("ann@example.com", PASSWORD, APP_ID).await.unwrap_err();
    assert!(matches!(down, PlatformError::Internal { .. }));
    assert!(!down.to_string().contains("store unavailable"));
}

#[tokio::test]
async fn test_authorize_is_fail_closed() {
    let h = harness();
    let user_id = h.register("ann@example.com").await;

    assert!(!h.credentials.authorize("identity:read", &user_id).await.unwrap());

    h.store.grant_permission(&user_id, "identity:read").unwrap();
    assert!(h.credentials.authorize("identity:read", &user_id).await.unwrap());

    h.store.set_unavailable(true);
    let err = h.credentials.authorize("identity:read", &user_id).await.unwrap_err();
    assert!(matches!(err, PlatformError::NotAuthorized));
    assert_eq!(err.fault_class(), FaultClass::Auth);
}

// ============================================================================
// Verification workflow
// ============================================================================

#[tokio::test]
async fn test_start_validation_enqueues_snapshot() {
    let h = harness();
    let user_id = h.register("ann@example.com").await;

    let started = h
        .orchestrator
        .start_validation(&user_id, DocumentType::Passport)
        .await
        .unwrap();
    assert_eq!(started.status, ValidationStatus::Pending);
    assert_eq!(started.message, "Identity validation process is started.");

    let tasks = h.publisher.take();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].name, TASK_IDENTIFIER);
    assert_eq!(tasks[0].payload["validationId"], started.validation_id.as_str());
    assert_eq!(tasks[0].payload["user"]["email"], "ann@example.com");

    let raw = tasks[0].payload.to_string();
    assert!(!raw.contains("argon2"));
    assert!(!raw.to_lowercase().contains("password"));
}

#[tokio::test]
async fn test_start_validation_rejects_second_active() {
    let h = harness();
    let user_id = h.register("ann@example.com").await;

    h.orchestrator
        .start_validation(&user_id, DocumentType::Passport)
        .await
        .unwrap();
    let err = h
        .orchestrator
        .start_validation(&user_id, DocumentType::NationalId)
        .await
        .unwrap_err();

    assert!(matches!(err, PlatformError::ValidationAlreadyActive { .. }));
    assert_eq!(h.store.validations_for_user(&user_id).len(), 1);
    assert_eq!(h.publisher.take().len(), 1);
}

#[tokio::test]
async fn test_start_after_cancel_is_allowed() {
    let h = harness();
    let user_id = h.register("ann@example.com").await;

    let first = h
        .orchestrator
        .start_validation(&user_id, DocumentType::Passport)
        .await
        .unwrap();
    h.orchestrator.cancel_validation(&first.validation_id).await.unwrap();

    h.orchestrator
        .start_validation(&user_id, DocumentType::DriverLicense)
        .await
        .unwrap();
    assert_eq!(h.store.validations_for_user(&user_id).len(), 2);
}

#[tokio::test]
async fn test_start_validation_unknown_user() {
    let h = harness();
    let err = h
        .orchestrator
        .start_validation("8d3c1b9e-6a5f-4e21-9d0a-2c7b4f1e8a90", DocumentType::Passport)
        .await
        .unwrap_err();

    assert!(matches!(err, PlatformError::InvalidUserId { .. }));
}

#[tokio::test]
async fn test_enqueue_failure_leaves_pending_record() {
    let store = Arc::new(InMemoryStore::new());
    let orchestrator = VerificationOrchestrator::new(
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(ClosedPublisher),
        Arc::new(VerificationPipeline::default()),
    );
    let credentials = CredentialService::new(
        store.clone(),
        store.clone(),
        store.clone(),
        PermissionService::new(store.clone()),
        cheap_passwords(),
        Duration::from_secs(60),
    );
    let user_id = credentials.register_new_user("ann@example.com", PASSWORD).await.unwrap();

    let err = orchestrator
        .start_validation(&user_id, DocumentType::Passport)
        .await
        .unwrap_err();

    assert!(matches!(err, PlatformError::Internal { .. }));
    let left = store.validations_for_user(&user_id);
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].status, ValidationStatus::Pending);
}

#[tokio::test]
async fn test_worker_waits_for_input_then_approves() {
    let h = harness();
    let user_id = h.register("ann@example.com").await;
    let started = h
        .orchestrator
        .start_validation(&user_id, DocumentType::Passport)
        .await
        .unwrap();
    let task = h.publisher.take().remove(0);

    // Nothing supplied yet
    h.worker.handle(&task).await.unwrap();
    let waiting = h.orchestrator.status(&started.validation_id).await.unwrap();
    assert_eq!(waiting.status, ValidationStatus::Pending);
    assert!(waiting.message.starts_with("Waiting for applicant input"));

    h.complete_application(&started.validation_id).await;

    // Redelivery picks up the new details
    h.worker.handle(&task.redelivery()).await.unwrap();
    let approved = h.orchestrator.status(&started.validation_id).await.unwrap();
    assert_eq!(approved.status, ValidationStatus::Approved);

    // Further redeliveries change nothing
    h.worker.handle(&task.redelivery().redelivery()).await.unwrap();
    let again = h.orchestrator.status(&started.validation_id).await.unwrap();
    assert_eq!(again, approved);
}

#[tokio::test]
async fn test_worker_rejects_minor() {
    let h = harness();
    let user_id = h.register("kid@example.com").await;
    let started = h
        .orchestrator
        .start_validation(&user_id, DocumentType::NationalId)
        .await
        .unwrap();
    h.orchestrator
        .update_validation(
            &started.validation_id,
            r#"{"name":"Kid","address":"1 Main St","dateOfBirth":"2020-01-01"}"#,
        )
        .await
        .unwrap();
    h.orchestrator
        .document_upload(&started.validation_id, b"\x89PNG....", "PNG")
        .await
        .unwrap();

    let task = h.publisher.take().remove(0);
    h.worker.handle(&task).await.unwrap();

    let state = h.orchestrator.status(&started.validation_id).await.unwrap();
    assert_eq!(state.status, ValidationStatus::Rejected);
}

#[tokio::test]
async fn test_worker_failure_classes() {
    let h = harness();

    let malformed = Task::new(TASK_IDENTIFIER, serde_json::json!({ "user": 42 }));
    assert!(!h.worker.handle(&malformed).await.unwrap_err().is_retryable());

    let missing = Task::new(
        TASK_IDENTIFIER,
        serde_json::json!({
            "validationId": "8d3c1b9e-6a5f-4e21-9d0a-2c7b4f1e8a90",
            "user": { "id": "u", "email": "ann@example.com" }
        }),
    );
    assert!(!h.worker.handle(&missing).await.unwrap_err().is_retryable());

    let user_id = h.register("ann@example.com").await;
    h.orchestrator
        .start_validation(&user_id, DocumentType::Passport)
        .await
        .unwrap();
    let task = h.publisher.take().remove(0);

    h.store.set_unavailable(true);
    assert!(h.worker.handle(&task).await.unwrap_err().is_retryable());
}

#[tokio::test]
async fn test_worker_skips_cancelled_validation() {
    let h = harness();
    let user_id = h.register("ann@example.com").await;
    let started = h
        .orchestrator
        .start_validation(&user_id, DocumentType::Passport)
        .await
        .unwrap();
    h.complete_application(&started.validation_id).await;
    h.orchestrator.cancel_validation(&started.validation_id).await.unwrap();

    let task = h.publisher.take().remove(0);
    h.worker.handle(&task).await.unwrap();

    let state = h.orchestrator.status(&started.validation_id).await.unwrap();
    assert_eq!(state.status, ValidationStatus::Cancelled);
}

#[tokio::test]
async fn test_terminal_validation_is_frozen() {
    let h = harness();
    let user_id = h.register("ann@example.com").await;
    let started = h
        .orchestrator
        .start_validation(&user_id, DocumentType::Passport)
        .await
        .unwrap();
    let id = started.validation_id;

    let cancelled = h.orchestrator.cancel_validation(&id).await.unwrap();
    assert_eq!(cancelled.status, ValidationStatus::Cancelled);
    let before = h.store.validation(&id).await.unwrap();

    let results = [
        h.orchestrator.cancel_validation(&id).await.map(|_| ()),
        h.orchestrator.end_validation(&id).await.map(|_| ()),
        h.orchestrator.document_upload(&id, b"bytes", "pdf").await.map(|_| ()),
        h.orchestrator
            .update_validation(&id, r#"{"name":"Ann"}"#)
            .await
            .map(|_| ()),
    ];
    for result in results {
        assert!(matches!(result, Err(PlatformError::InvalidTransition { .. })));
    }

    let after = h.store.validation(&id).await.unwrap();
    assert_eq!(after, before);
}

#[tokio::test]
async fn test_end_validation_outcomes() {
    let h = harness();

    let ready = h.register("ann@example.com").await;
    let started = h.orchestrator.start_validation(&ready, DocumentType::Passport).await.unwrap();
    h.complete_application(&started.validation_id).await;
    let ended = h.orchestrator.end_validation(&started.validation_id).await.unwrap();
    assert_eq!(ended.status, ValidationStatus::Approved);

    // Final mode: missing input rejects instead of waiting
    let incomplete = h.register("bob@example.com").await;
    let started = h
        .orchestrator
        .start_validation(&incomplete, DocumentType::Passport)
        .await
        .unwrap();
    let ended = h.orchestrator.end_validation(&started.validation_id).await.unwrap();
    assert_eq!(ended.status, ValidationStatus::Rejected);
}

#[tokio::test]
async fn test_end_validation_with_unimplemented_stage() {
    let h = harness_with(VerificationPipeline::from_names(&["profile", "document", "liveness"]).unwrap());
    let user_id = h.register("ann@example.com").await;
    let started = h
        .orchestrator
        .start_validation(&user_id, DocumentType::Passport)
        .await
        .unwrap();
    h.complete_application(&started.validation_id).await;
    let before = h.store.validation(&started.validation_id).await.unwrap();

    let err = h.orchestrator.end_validation(&started.validation_id).await.unwrap_err();
    assert!(matches!(err, PlatformError::NotImplemented { .. }));
    assert_eq!(err.fault_class(), FaultClass::Server);

    let after = h.store.validation(&started.validation_id).await.unwrap();
    assert_eq!(after, before);
}

#[tokio::test]
async fn test_upload_and_update_validation_errors() {
    let h = harness();
    let user_id = h.register("ann@example.com").await;
    let started = h
        .orchestrator
        .start_validation(&user_id, DocumentType::Passport)
        .await
        .unwrap();
    let id = started.validation_id;

    let empty = h.orchestrator.document_upload(&id, b"", "pdf").await;
    assert!(matches!(empty, Err(PlatformError::BadPayload { .. })));

    let gif = h.orchestrator.document_upload(&id, b"GIF89a", "gif").await;
    assert!(matches!(gif, Err(PlatformError::BadPayload { .. })));

    let malformed = h.orchestrator.update_validation(&id, "{name: Ann}").await;
    assert!(matches!(malformed, Err(PlatformError::BadPayload { .. })));

    let bad_date = h
        .orchestrator
        .update_validation(&id, r#"{"dateOfBirth":"12/04/1990"}"#)
        .await;
    assert!(matches!(bad_date, Err(PlatformError::BadPayload { .. })));

    let unknown = h.orchestrator.status("8d3c1b9e-6a5f-4e21-9d0a-2c7b4f1e8a90").await;
    assert!(matches!(unknown, Err(PlatformError::NotFound { .. })));

    let state = h.orchestrator.status(&id).await.unwrap();
    assert_eq!(state.status, ValidationStatus::Pending);
}

#[tokio::test]
async fn test_update_refreshes_timestamp() {
    let h = harness();
    let user_id = h.register("ann@example.com").await;
    let started = h
        .orchestrator
        .start_validation(&user_id, DocumentType::Passport)
        .await
        .unwrap();
    let before = h.orchestrator.status(&started.validation_id).await.unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    let outcome = h
        .orchestrator
        .update_validation(&started.validation_id, r#"{"address":"2 High St"}"#)
        .await
        .unwrap();
    assert_eq!(outcome.status, ValidationStatus::Pending);

    let after = h.orchestrator.status(&started.validation_id).await.unwrap();
    assert!(after.last_updated > before.last_updated);
    let stored = h.store.validation(&started.validation_id).await.unwrap();
    assert_eq!(stored.applicant.address.as_deref(), Some("2 High St"));
}

#[tokio::test]
async fn test_update_survives_concurrent_worker_run() {
    let h = harness();
    let user_id = h.register("ann@example.com").await;
    let started = h
        .orchestrator
        .start_validation(&user_id, DocumentType::Passport)
        .await
        .unwrap();
    let id = started.validation_id;
    let task = h.publisher.take().remove(0);

    let orchestrator = h.racing_orchestrator(task);
    let outcome = orchestrator.update_validation(&id, r#"{"name":"Ann"}"#).await.unwrap();
    assert_eq!(outcome.status, ValidationStatus::Pending);

    // Both writes are kept: the worker's report and the client's details
    let stored = h.store.validation(&id).await.unwrap();
    assert_eq!(stored.status, ValidationStatus::Pending);
    assert_eq!(stored.applicant.name.as_deref(), Some("Ann"));
    assert_eq!(stored.report.len(), 2);
}

#[tokio::test]
async fn test_upload_and_cancel_survive_concurrent_worker_run() {
    let h = harness();
    let user_id = h.register("ann@example.com").await;
    let started = h
        .orchestrator
        .start_validation(&user_id, DocumentType::Passport)
        .await
        .unwrap();
    let id = started.validation_id;
    let task = h.publisher.take().remove(0);

    let upload = h
        .racing_orchestrator(task.clone())
        .document_upload(&id, b"%PDF-1.7 scan", "pdf")
        .await
        .unwrap();
    assert_eq!(upload.status, ValidationStatus::Pending);
    assert!(h.store.validation(&id).await.unwrap().document.is_some());

    let cancelled = h.racing_orchestrator(task.redelivery()).cancel_validation(&id).await.unwrap();
    assert_eq!(cancelled.status, ValidationStatus::Cancelled);
    assert_eq!(h.store.validation(&id).await.unwrap().status, ValidationStatus::Cancelled);
}

#[tokio::test]
async fn test_update_after_concurrent_approval_is_invalid_transition() {
    let h = harness();
    let user_id = h.register("ann@example.com").await;
    let started = h
        .orchestrator
        .start_validation(&user_id, DocumentType::Passport)
        .await
        .unwrap();
    let id = started.validation_id;
    h.complete_application(&id).await;
    let task = h.publisher.take().remove(0);

    let err = h
        .racing_orchestrator(task)
        .update_validation(&id, r#"{"address":"2 High St"}"#)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        PlatformError::InvalidTransition {
            status: ValidationStatus::Approved,
            ..
        }
    ));

    let stored = h.store.validation(&id).await.unwrap();
    assert_eq!(stored.status, ValidationStatus::Approved);
    assert_eq!(stored.applicant.address.as_deref(), Some("1 Main St"));
}

#[tokio::test]
async fn test_unchanged_worker_run_keeps_timestamp() {
    let h = harness();
    let user_id = h.register("ann@example.com").await;
    let started = h
        .orchestrator
        .start_validation(&user_id, DocumentType::Passport)
        .await
        .unwrap();
    let task = h.publisher.take().remove(0);

    h.worker.handle(&task).await.unwrap();
    let first = h.store.validation(&started.validation_id).await.unwrap();

    tokio::time::sleep(Duration::from_millis(5)).await;
    h.worker.handle(&task.redelivery()).await.unwrap();
    let second = h.store.validation(&started.validation_id).await.unwrap();

    assert_eq!(second.status, ValidationStatus::Pending);
    assert_eq!(second.updated_at, first.updated_at);
}
