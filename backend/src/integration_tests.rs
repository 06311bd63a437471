#[cfg(test)]
mod tests {
    use crate::commands::installation::{
        create_installation_internal, get_timer_internal, start_timer_internal,
        stop_timer_internal, CreateInstallationRequest,
    };
    use crate::commands::inventory::{create_movement_internal, CreateMovementRequest};
    use crate::commands::product::{create_product_internal, CreateProductRequest};
    use crate::commands::webhook::{process_conversation_internal, VoiceConversationPayload};
    use crate::config::AppConfig;
    use crate::db::{self, DbPool, Lead, MovementType, TimerActor};
    use crate::error::ZafesysError;
    use crate::state::AppState;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use rust_decimal::Decimal;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    /// Returns `None` when no database is configured so the suite can run offline.
    async fn setup_test_db() -> Option<DbPool> {
        dotenvy::dotenv().ok();
        let database_url = std::env::var("DATABASE_URL").ok()?;
        let config = AppConfig {
            database_url,
            ..AppConfig::default()
        };
        let pool = db::init_pool(&config).await.expect("Failed to create pool");
        db::init_database(&pool).await.expect("Failed to run migrations");
        Some(pool)
    }

    /// Router over a pool that never connects unless a handler queries it.
    async fn offline_app() -> axum::Router {
        let config = AppConfig {
            voice_webhook_secret: "s3cret".to_string(),
            ..AppConfig::default()
        };
        let pool = db::init_pool(&config).await.expect("Failed to build lazy pool");
        crate::build_app(AppState::new(pool, config))
    }

    async fn body_json(res: axum::response::Response) -> Value {
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn unique(prefix: &str) -> String {
        format!("{}-{}", prefix, uuid::Uuid::new_v4())
    }

    async fn create_test_lead(pool: &DbPool) -> Lead {
        let digits: String = uuid::Uuid::new_v4()
            .as_u128()
            .to_string()
            .chars()
            .take(9)
            .collect();
        let payload = VoiceConversationPayload {
            conversation_id: unique("it-conv"),
            customer_name: Some("Prueba Integracion".to_string()),
            customer_phone: Some(format!("3{}", digits)),
            ..Default::default()
        };
        process_conversation_internal(pool, &payload)
            .await
            .expect("Failed to create lead")
    }

    async fn create_test_product(pool: &DbPool, stock: i32) -> i32 {
        let product = create_product_internal(
            pool,
            CreateProductRequest {
                sku: unique("IT"),
                name: "Cerradura de prueba".to_string(),
                description: None,
                model: "OS566F".to_string(),
                category: Some("biometric".to_string()),
                price: Decimal::from(850_000),
                installation_price: Decimal::ZERO,
                stock,
                min_stock_alert: Some(2),
                features: None,
                image_url: None,
            },
        )
        .await
        .expect("Failed to create product");
        assert_eq!(product.stock, stock);
        product.id
    }

    async fn stock_and_ledger(pool: &DbPool, product_id: i32) -> (i32, i64) {
        sqlx::query_as(
            r#"
            SELECT p.stock,
                   (SELECT COUNT(*) FROM inventory_movements m WHERE m.product_id = p.id)
            FROM products p WHERE p.id = $1
            "#,
        )
        .bind(product_id)
        .fetch_one(pool)
        .await
        .unwrap()
    }

    fn installation_for(lead_id: i32, product_id: i32, quantity: i32) -> CreateInstallationRequest {
        CreateInstallationRequest {
            lead_id,
            customer_id: None,
            product_id,
            quantity,
            technician_id: None,
            scheduled_date: None,
            scheduled_time: None,
            estimated_duration: None,
            address: "Calle 123 #45-67".to_string(),
            city: Some("Bogota".to_string()),
            address_notes: None,
            total_price: Decimal::from(850_000),
            customer_notes: None,
            internal_notes: None,
        }
    }

    #[tokio::test]
    async fn test_redelivered_conversation_returns_same_lead() {
        let Some(pool) = setup_test_db().await else {
            return;
        };

        let payload = VoiceConversationPayload {
            conversation_id: unique("it-dup"),
            transcript: json!("Cliente: hola, solo estoy mirando"),
            ..Default::default()
        };
        let first = process_conversation_internal(&pool, &payload).await.unwrap();
        let second = process_conversation_internal(&pool, &payload).await.unwrap();
        assert_eq!(first.id, second.id);

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM leads WHERE conversation_id = $1")
                .bind(&payload.conversation_id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_installation_over_stock_is_rejected() {
        let Some(pool) = setup_test_db().await else {
            return;
        };
        let lead = create_test_lead(&pool).await;
        let product_id = create_test_product(&pool, 3).await;

        let result = create_installation_internal(&pool, installation_for(lead.id, product_id, 5)).await;
        assert!(matches!(
            result,
            Err(ZafesysError::InsufficientStock {
                available: 3,
                requested: 5
            })
        ));

        // only the initial-stock entry is on the ledger
        assert_eq!(stock_and_ledger(&pool, product_id).await, (3, 1));

        let installations: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM installations WHERE lead_id = $1")
                .bind(lead.id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(installations, 0);
    }

    #[tokio::test]
    async fn test_manual_exit_over_stock_is_rejected() {
        let Some(pool) = setup_test_db().await else {
            return;
        };
        let product_id = create_test_product(&pool, 3).await;

        let result = create_movement_internal(
            &pool,
            CreateMovementRequest {
                product_id,
                movement_type: MovementType::Exit,
                quantity: 5,
                reference_type: None,
                reference_id: None,
                notes: Some("Salida manual".to_string()),
                created_by: Some("bodega".to_string()),
            },
        )
        .await;
        assert!(matches!(
            result,
            Err(ZafesysError::InsufficientStock {
                available: 3,
                requested: 5
            })
        ));
        assert_eq!(stock_and_ledger(&pool, product_id).await, (3, 1));

        let row = create_movement_internal(
            &pool,
            CreateMovementRequest {
                product_id,
                movement_type: MovementType::Exit,
                quantity: 3,
                reference_type: None,
                reference_id: None,
                notes: None,
                created_by: None,
            },
        )
        .await
        .unwrap();
        assert_eq!((row.stock_before, row.stock_after), (3, 0));
        assert_eq!(stock_and_ledger(&pool, product_id).await, (0, 2));
    }

    #[tokio::test]
    async fn test_installation_books_stock_and_runs_timer() {
        let Some(pool) = setup_test_db().await else {
            return;
        };
        let lead = create_test_lead(&pool).await;
        let product_id = create_test_product(&pool, 4).await;

        let installation = create_installation_internal(&pool, installation_for(lead.id, product_id, 1))
            .await
            .unwrap();

        let (stock, movements): (i32, i64) = sqlx::query_as(
            r#"
            SELECT p.stock,
                   (SELECT COUNT(*) FROM inventory_movements m
                    WHERE m.reference_type = 'installation' AND m.reference_id = $2)
            FROM products p WHERE p.id = $1
            "#,
        )
        .bind(product_id)
        .bind(installation.id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(stock, 3);
        assert_eq!(movements, 1);

        let started = start_timer_internal(&pool, installation.id, TimerActor::Admin)
            .await
            .unwrap();
        assert!(started.is_running);

        // starting again keeps the original start time
        let again = start_timer_internal(&pool, installation.id, TimerActor::Technician)
            .await
            .unwrap();
        assert_eq!(again, started);
        assert_eq!(again.timer_started_by, Some(TimerActor::Admin));

        let read = get_timer_internal(&pool, installation.id).await.unwrap();
        assert_eq!(read.timer_started_at, started.timer_started_at);

        let stopped = stop_timer_internal(&pool, installation.id).await.unwrap();
        assert!(!stopped.is_running);
        assert_eq!(stopped.duration_minutes, Some(0));

        let second_stop = stop_timer_internal(&pool, installation.id).await;
        assert!(matches!(second_stop, Err(ZafesysError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_webhook_rejects_bad_signature() {
        let res = offline_app()
            .await
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/webhooks/voice/conversation")
                    .header("content-type", "application/json")
                    .header("x-elevenlabs-signature", "deadbeef")
                    .body(Body::from(r#"{"conversation_id":"conv_1"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(res).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Invalid webhook signature");
    }

    #[tokio::test]
    async fn test_webhook_status_is_wrapped() {
        let res = offline_app()
            .await
            .oneshot(
                Request::builder()
                    .uri("/api/webhooks/voice/status")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["secret_configured"], true);
        assert_eq!(body["data"]["agent_id_configured"], false);
    }

    #[tokio::test]
    async fn test_root_is_not_wrapped() {
        let res = offline_app()
            .await
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::OK);
        let body = body_json(res).await;
        assert_eq!(body["name"], "ZAFESYS Suite");
        assert_eq!(body["status"], "running");
        assert!(body.get("success").is_none());
    }

    #[tokio::test]
    async fn test_ping_text_is_wrapped() {
        let res = offline_app()
            .await
            .oneshot(
                Request::builder()
                    .uri("/api/system/ping")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let body = body_json(res).await;
        assert_eq!(body, json!({ "success": true, "data": "pong" }));
    }

    #[tokio::test]
    async fn test_tech_login_rejects_malformed_pin() {
        let res = offline_app()
            .await
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/tech/login")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"phone":"3001234567","pin":"12a"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let body = body_json(res).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "PIN must be 4 to 6 digits");
    }
}
