//! HTTP Surface Tests
//!
//! Drives a real server on an ephemeral port the way external callers do:
//! full record lifecycle, shaping failures, and routing edges.

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use crate::api::handlers::AppContext;
    use crate::api::routes;
    use crate::cluster::dispatcher::StoreClient;
    use crate::store::records::RecordStore;

    async fn spawn_app() -> String {
        let ctx = AppContext {
            client: StoreClient::local(RecordStore::new()),
            worker: None,
        };
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, routes::router(ctx)).await;
        });
        format!("http://{addr}")
    }

    fn sample_record() -> Value {
        json!({
            "username": "TestUser",
            "age": 30,
            "hobbies": ["Programming", "Gaming"]
        })
    }

    // ============================================================
    // FULL LIFECYCLE
    // ============================================================

    #[tokio::test]
    async fn record_lifecycle_create_read_update_delete() {
        let base = spawn_app().await;
        let client = reqwest::Client::new();

        let res = client.get(format!("{base}/api/records")).send().await.unwrap();
        assert_eq!(res.status(), 200);
        assert_eq!(res.json::<Value>().await.unwrap(), json!([]));

        let res = client
            .post(format!("{base}/api/records"))
            .json(&sample_record())
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 201);
        let created: Value = res.json().await.unwrap();
        let id = created["id"].as_str().expect("generated id").to_string();
        assert_eq!(created["username"], "TestUser");
        assert_eq!(created["age"], 30);

        let res = client
            .get(format!("{base}/api/records/{id}"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        assert_eq!(res.json::<Value>().await.unwrap(), created);

        let mut updated = sample_record();
        updated["age"] = json!(31);
        let res = client
            .put(format!("{base}/api/records/{id}"))
            .json(&updated)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 200);
        let body: Value = res.json().await.unwrap();
        assert_eq!(body["age"], 31);
        assert_eq!(body["id"], json!(id));

        let res = client
            .delete(format!("{base}/api/records/{id}"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 204);

        let res = client
            .get(format!("{base}/api/records/{id}"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 404);
        let error: Value = res.json().await.unwrap();
        assert_eq!(error["name"], "NotFoundError");
        assert_eq!(error["statusCode"], 404);
    }

    // ============================================================
    // SHAPING FAILURES (never reach the store)
    // ============================================================

    #[tokio::test]
    async fn missing_hobbies_is_rejected_with_details() {
        let base = spawn_app().await;
        let client = reqwest::Client::new();

        let res = client
            .post(format!("{base}/api/records"))
            .json(&json!({ "username": "A", "age": 1 }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 400);
        let error: Value = res.json().await.unwrap();
        assert_eq!(error["message"], "Body does not contain required fields");
        let issues = error["body"]["issues"].as_array().unwrap();
        assert!(issues.iter().any(|i| i == "hobbies is missing"));

        // Nothing was stored.
        let res = client.get(format!("{base}/api/records")).send().await.unwrap();
        assert_eq!(res.json::<Value>().await.unwrap(), json!([]));
    }

    #[tokio::test]
    async fn non_string_hobby_is_rejected() {
        let base = spawn_app().await;
        let mut record = sample_record();
        record["hobbies"] = json!(["Programming", 777, {}]);

        let res = reqwest::Client::new()
            .post(format!("{base}/api/records"))
            .json(&record)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 400);
    }

    #[tokio::test]
    async fn null_hobbies_is_rejected() {
        let base = spawn_app().await;
        let mut record = sample_record();
        record["hobbies"] = Value::Null;

        let res = reqwest::Client::new()
            .post(format!("{base}/api/records"))
            .json(&record)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 400);
    }

    #[tokio::test]
    async fn extra_property_is_rejected() {
        let base = spawn_app().await;
        let mut record = sample_record();
        record["extraProperty"] = json!("should not be here");

        let res = reqwest::Client::new()
            .post(format!("{base}/api/records"))
            .json(&record)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 400);
        let error: Value = res.json().await.unwrap();
        let issues = error["body"]["issues"].as_array().unwrap();
        assert!(issues.iter().any(|i| i == "unexpected property: extraProperty"));
    }

    #[tokio::test]
    async fn malformed_json_is_rejected() {
        let base = spawn_app().await;

        let res = reqwest::Client::new()
            .post(format!("{base}/api/records"))
            .header("content-type", "application/json")
            .body("{not json")
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 400);
        let error: Value = res.json().await.unwrap();
        assert_eq!(error["message"], "Request body is not valid JSON");
    }

    #[tokio::test]
    async fn invalid_id_never_reaches_the_store() {
        let base = spawn_app().await;
        let client = reqwest::Client::new();

        for request in [
            client.get(format!("{base}/api/records/not-a-uuid")),
            client
                .put(format!("{base}/api/records/not-a-uuid"))
                .json(&sample_record()),
            client.delete(format!("{base}/api/records/not-a-uuid")),
        ] {
            let res = request.send().await.unwrap();
            assert_eq!(res.status(), 400);
            let error: Value = res.json().await.unwrap();
            assert_eq!(error["message"], "Record id is invalid (not a uuid)");
        }
    }

    #[tokio::test]
    async fn update_of_missing_record_is_404() {
        let base = spawn_app().await;

        let res = reqwest::Client::new()
            .put(format!(
                "{base}/api/records/00000000-0000-4000-8000-000000000000"
            ))
            .json(&sample_record())
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 404);
    }

    // ============================================================
    // ROUTING
    // ============================================================

    #[tokio::test]
    async fn unknown_route_is_404() {
        let base = spawn_app().await;

        let res = reqwest::Client::new()
            .get(format!("{base}/api/unknown"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 404);
        let error: Value = res.json().await.unwrap();
        assert_eq!(error["name"], "NotFoundError");
        assert_eq!(error["message"], "Not found");
    }

    #[tokio::test]
    async fn nested_path_is_404() {
        let base = spawn_app().await;

        let res = reqwest::Client::new()
            .post(format!("{base}/api/records/bla/bla"))
            .json(&sample_record())
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 404);
    }

    #[tokio::test]
    async fn unsupported_method_is_405() {
        let base = spawn_app().await;

        let res = reqwest::Client::new()
            .patch(format!("{base}/api/records"))
            .json(&sample_record())
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), 405);
        let error: Value = res.json().await.unwrap();
        assert_eq!(error["name"], "MethodNotAllowedError");
        assert_eq!(error["message"], "Method not allowed");
    }
}
