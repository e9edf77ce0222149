//! Integration tests for documents, databases, views and bulk writes
//! against the in-memory server.

use couchwire_client::{
    ApiErrorKind, BulkRequest, DesignDocument, Document, Error, QueryOptions, ViewDefinition,
    ViewResults,
};
use couchwire_testkit::prelude::*;
use proptest::prelude::*;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Employee {
    #[serde(flatten)]
    document: Document,
    name: String,
    department: String,
}

fn employee(id: &str, name: &str, department: &str) -> Employee {
    Employee {
        document: Document::new(id),
        name: name.into(),
        department: department.into(),
    }
}

#[tokio::test]
async fn document_lifecycle() {
    let couch = TestCouch::new();
    let db = couch.create_database("company").await;

    let mut alice = employee("alice", "Alice", "engineering");
    let rev1 = db.put("alice", &alice).await.unwrap();
    assert!(rev1.starts_with("1-"));

    alice.document.rev = rev1.clone();
    alice.department = "research".into();
    let rev2 = db.put("alice", &alice).await.unwrap();
    assert!(rev2.starts_with("2-"));

    let stored: Employee = db.get("alice").await.unwrap();
    assert_eq!(stored.department, "research");
    assert_eq!(stored.document.rev, rev2);

    let tombstone = db.delete("alice", &rev2).await.unwrap();
    assert!(tombstone.starts_with("3-"));

    let err = db.get::<Employee>("alice").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn writing_without_current_revision_conflicts() {
    let couch = TestCouch::new();
    let db = couch.create_database("company").await;

    db.put("bob", &employee("bob", "Bob", "sales")).await.unwrap();
    let err = db
        .put("bob", &employee("bob", "Bob", "support"))
        .await
        .unwrap_err();
    assert!(err.is_conflict());
    match err {
        Error::Api(api) => {
            assert_eq!(api.kind(), ApiErrorKind::Conflict);
            assert_eq!(api.error, "conflict");
        }
        other => panic!("expected api error, got {:?}", other),
    }

    let err = db.delete("bob", "1-0000").await.unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
async fn rev_is_stable_and_matches_last_write() {
    let couch = TestCouch::new();
    let db = couch.create_database("company").await;

    let rev = db.put("carol", &json!({"name": "Carol"})).await.unwrap();
    assert_eq!(db.rev("carol").await.unwrap(), rev);
    assert_eq!(db.rev("carol").await.unwrap(), rev);
    assert_eq!(couch.server.last_request().unwrap().method, reqwest::Method::HEAD);

    let err = db.rev("nobody").await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn missing_database_is_not_found() {
    let couch = TestCouch::new();
    let err = couch
        .client
        .database("nowhere")
        .get::<Value>("a")
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn database_service() {
    let couch = TestCouch::new();
    let databases = couch.databases();

    assert!(!databases.exists("inventory").await.unwrap());
    databases.create("inventory").await.unwrap();
    assert!(databases.exists("inventory").await.unwrap());

    let err = databases.create("inventory").await.unwrap_err();
    assert_eq!(err.status(), Some(412));

    couch
        .client
        .database("inventory")
        .put("a", &json!({"n": 1}))
        .await
        .unwrap();
    let meta = databases.meta("inventory").await.unwrap();
    assert_eq!(meta.name, "inventory");
    assert_eq!(meta.document_count, 1);

    databases.delete("inventory").await.unwrap();
    assert!(!databases.exists("inventory").await.unwrap());
    assert!(databases.delete("inventory").await.unwrap_err().is_not_found());
}

#[tokio::test]
async fn invalid_database_name_is_rejected() {
    let couch = TestCouch::new();
    let err = couch.databases().create("Invalid Name").await.unwrap_err();
    assert_eq!(err.status(), Some(400));
}

#[tokio::test]
async fn all_docs_pages_by_key() {
    let couch = TestCouch::new();
    let db = couch.create_database("company").await;
    scenarios::populated(&db, 5).await;

    let page: ViewResults<Value> = db
        .all_docs(&QueryOptions::new().start_key("doc-001").limit(2))
        .await
        .unwrap();
    let ids: Vec<&str> = page.rows.iter().map(|row| row.id.as_str()).collect();
    assert_eq!(ids, ["doc-001", "doc-002"]);
    assert_eq!(page.total_rows, 5);
    assert_eq!(page.offset, 1);
    assert!(page.rows[0].doc.is_none());

    let request = couch.server.last_request().unwrap();
    assert_eq!(request.query_value("startkey"), Some("\"doc-001\""));
    assert_eq!(request.query_value("limit"), Some("2"));

    let with_docs: ViewResults<Value> = db
        .all_docs(&QueryOptions::new().include_docs(true).limit(1))
        .await
        .unwrap();
    assert_eq!(with_docs.rows[0].doc.as_ref().unwrap()["n"], json!(0));
}

#[tokio::test]
async fn view_query() {
    let couch = TestCouch::new();
    let db = couch.create_database("company").await;
    for (id, name, department) in [
        ("e1", "Alice", "engineering"),
        ("e2", "Bob", "sales"),
        ("e3", "Carol", "engineering"),
    ] {
        db.put(id, &employee(id, name, department)).await.unwrap();
    }

    let design = DesignDocument::new("company").with_view(
        "by_department",
        ViewDefinition::map("function(doc) { emit(doc.department, doc.name); }"),
    );
    let rev = db.put_design(&design).await.unwrap();
    assert!(rev.starts_with("1-"));
    assert!(couch.server.document("company", "_design/company").is_some());

    couch
        .server
        .register_view("company", "by_department", |doc: &Value| {
            vec![(doc["department"].clone(), doc["name"].clone())]
        });

    let results: ViewResults<String> = db
        .view(
            "company",
            "by_department",
            &QueryOptions::new()
                .start_key("engineering")
                .end_key("engineering"),
        )
        .await
        .unwrap();
    let names: Vec<&String> = results.values().collect();
    assert_eq!(names, ["Alice", "Carol"]);
    assert_eq!(
        couch.server.last_request().unwrap().path,
        "/company/_design/company/_view/by_department"
    );

    let err = db
        .view::<Value>("company", "missing", &QueryOptions::new())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn bulk_put_reports_each_document() {
    let couch = TestCouch::new();
    let db = couch.create_database("company").await;
    db.put("taken", &json!({"n": 0})).await.unwrap();

    let request = BulkRequest::new(vec![
        json!({"_id": "fresh", "n": 1}),
        json!({"_id": "taken", "n": 2}),
        json!({"n": 3}),
    ]);
    let results = db.bulk_put(&request).await.unwrap();
    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert_eq!(results[0].id, "fresh");
    assert!(results[1].is_conflict());
    assert!(results[2].is_ok());
    assert!(!results[2].id.is_empty());

    assert_eq!(couch.server.update_seq("company"), Some(3));
}

#[tokio::test]
async fn unexpected_status_keeps_body() {
    let couch = TestCouch::new();
    let db = couch.create_database("company").await;
    couch.server.inject(Fault::respond(
        CannedResponse::new(502).chunk("<html>bad gateway</html>"),
    ));

    match db.get::<Value>("a").await.unwrap_err() {
        Error::UnexpectedStatus { status, body, .. } => {
            assert_eq!(status, 502);
            assert_eq!(&body[..], b"<html>bad gateway</html>");
        }
        other => panic!("expected unexpected status, got {:?}", other),
    }
}

#[tokio::test]
async fn transport_failure_is_retryable() {
    let couch = TestCouch::new();
    couch.server.inject(Fault::connection_refused());
    let err = couch.databases().exists("company").await.unwrap_err();
    assert!(err.is_retryable());
    assert!(matches!(err, Error::Transport { .. }));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn any_document_id_round_trips(id in doc_id_strategy(), body in doc_body_strategy()) {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        runtime.block_on(async {
            let couch = TestCouch::new();
            let db = couch.create_database("ids").await;

            let rev = db.put(&id, &body).await.unwrap();
            prop_assert_eq!(db.rev(&id).await.unwrap(), rev.clone());

            let stored: Value = db.get(&id).await.unwrap();
            prop_assert_eq!(stored["_id"].as_str(), Some(id.as_str()));
            prop_assert_eq!(stored["_rev"].as_str(), Some(rev.as_str()));
            for (key, value) in body.as_object().unwrap() {
                prop_assert_eq!(&stored[key], value);
            }
            Ok(())
        })?;
    }
}
