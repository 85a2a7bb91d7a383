use flowerbot_core::domain::submission::NewSubmission;
use flowerbot_db::migrations::run_pending;
use flowerbot_db::{
    connect, InMemorySubmissionRepository, RepositoryError, SqlSubmissionRepository,
    SubmissionRepository,
};

fn anonymous_submission() -> NewSubmission {
    NewSubmission {
        name: None,
        username: Some("petal".to_string()),
        message: "The garden finally bloomed this spring.".to_string(),
        picture: Some("https://media.example.org/flowers/tulip.png".to_string()),
        website: true,
    }
}

async fn exercise(repo: &dyn SubmissionRepository) {
    let created = repo.create(anonymous_submission()).await.expect("create");
    assert!(!created.approved);

    let approved = repo.update_field(&created.id, "approved", "true").await.expect("approve");
    assert!(approved.approved);
    assert_eq!(approved.username.as_deref(), Some("petal"));

    let rejected = repo.update_field(&created.id, "message", "").await;
    assert!(matches!(rejected, Err(RepositoryError::InvalidValue { .. })));

    let listed = repo.list_recent(5).await.expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].message, "The garden finally bloomed this spring.");

    repo.delete(&created.id).await.expect("delete");
    assert!(matches!(repo.delete(&created.id).await, Err(RepositoryError::NotFound(_))));
    assert!(repo.list_recent(5).await.expect("list").is_empty());
}

#[tokio::test]
async fn sqlite_repository_honours_the_store_contract() {
    let dir = tempfile::tempdir().expect("tempdir");
    let url = format!("sqlite://{}", dir.path().join("contract.db").display());
    let pool = connect(&url).await.expect("connect");
    run_pending(&pool).await.expect("migrations");

    exercise(&SqlSubmissionRepository::new(pool.clone())).await;
    pool.close().await;
}

#[tokio::test]
async fn in_memory_repository_honours_the_store_contract() {
    exercise(&InMemorySubmissionRepository::default()).await;
}
