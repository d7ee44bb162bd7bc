//! Catalog, review and ordering behavior over HTTP

mod common;

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use serde_json::json;

    use super::common::spawn_app;

    #[tokio::test]
    async fn test_item_management_and_visibility() {
        let app = spawn_app().await;
        let admin = app.admin_token().await;
        let user = app.create_user(&admin, "ivy", 0).await;

        app.create_item(&admin, "Mug", 15, 10).await;
        app.create_item(&admin, "Hoodie", 60, 2).await;

        let (status, _) = app
            .put("/api/items/Hoodie", Some(&admin), json!({ "unlisted": true }))
            .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = app.get("/api/items", Some(&user)).await;
        assert_eq!(status, StatusCode::OK);
        let names: Vec<&str> = body
            .as_array()
            .unwrap()
            .iter()
            .map(|i| i["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["Mug"]);

        let (status, _) = app.get("/api/items/Hoodie", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = app
            .get("/api/items?include_unlisted=true", Some(&admin))
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);

        // Non-admins cannot see unlisted items even when asking
        let (_, body) = app
            .get("/api/items?include_unlisted=true", Some(&user))
            .await;
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, _) = app
            .post(
                "/api/items",
                Some(&user),
                json!({ "name": "Cap", "price": 5, "quantity": 1 }),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = app
            .post(
                "/api/items",
                Some(&admin),
                json!({ "name": "Mug", "price": 5, "quantity": 1 }),
            )
            .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = app.delete("/api/items/Mug", Some(&admin)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = app.get("/api/items/Mug", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_availability_report() {
        let app = spawn_app().await;
        let admin = app.admin_token().await;
        app.create_item(&admin, "Mug", 15, 3).await;
        app.create_item(&admin, "Sticker", 1, 0).await;

        let (status, body) = app
            .post(
                "/api/items/availability",
                None,
                json!({ "items": [{ "item": "Mug", "quantity": 2 }] }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["available"], true);
        assert_eq!(body["message"], "All items are available");

        let (status, body) = app
            .post(
                "/api/items/availability",
                None,
                json!({ "items": [
                    { "item": "Mug", "quantity": 2 },
                    { "item": "Mug", "quantity": 2 },
                    { "item": "Ghost", "quantity": 1 },
                ] }),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["available"], false);
        assert_eq!(body["message"], "Insufficient inventory for 2 item(s)");

        let shortfalls = body["insufficient"].as_array().unwrap();
        let mug = shortfalls.iter().find(|s| s["item"] == "Mug").unwrap();
        assert_eq!(mug["requested"], 4);
        assert_eq!(mug["available"], 3);
        let ghost = shortfalls.iter().find(|s| s["item"] == "Ghost").unwrap();
        assert_eq!(ghost["reason"], "Item not found");
    }

    #[tokio::test]
    async fn test_overflowing_quantities_are_rejected() {
        let app = spawn_app().await;
        let admin = app.admin_token().await;
        let user = app.create_user(&admin, "otto", 100).await;
        app.create_item(&admin, "Mug", 15, 3).await;

        let lines = json!({ "items": [
            { "item": "Mug", "quantity": i64::MAX },
            { "item": "Mug", "quantity": 1 },
        ] });

        let (status, body) = app.post("/api/items/availability", None, lines.clone()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);

        let (status, _) = app.post("/api/orders", Some(&user), lines).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, mug) = app.get("/api/items/Mug", None).await;
        assert_eq!(mug["quantity"], 3);
        let (_, me) = app.get("/api/auth/me", Some(&user)).await;
        assert_eq!(me["balance"], 100);
    }

    #[tokio::test]
    async fn test_place_order_debits_balance_and_stock() {
        let app = spawn_app().await;
        let admin = app.admin_token().await;
        let user = app.create_user(&admin, "jack", 100).await;
        app.create_item(&admin, "Mug", 15, 3).await;
        app.create_item(&admin, "Pen", 2, 10).await;

        let (status, body) = app
            .post(
                "/api/orders",
                Some(&user),
                json!({ "items": [
                    { "item": "Mug", "quantity": 3 },
                    { "item": "Pen", "quantity": 5 },
                ] }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        assert_eq!(body["total_amount"], 55);
        assert_eq!(body["balance_after"], 45);
        assert_eq!(body["status"], "completed");
        assert_eq!(body["items"].as_array().unwrap().len(), 2);
        assert_eq!(body["notifications"]["confirmation_sent"], true);
        assert_eq!(body["notifications"]["fulfillment_sent"], true);
        let order_id = body["order_id"].as_str().unwrap().to_string();
        assert!(order_id.starts_with("ORD-"));

        let (_, me) = app.get("/api/auth/me", Some(&user)).await;
        assert_eq!(me["balance"], 45);

        let (_, mug) = app.get("/api/items/Mug", None).await;
        assert_eq!(mug["quantity"], 0);
        assert_eq!(mug["sold_out"], true);

        let (_, pen) = app.get("/api/items/Pen", None).await;
        assert_eq!(pen["quantity"], 5);
        assert_eq!(pen["sold_out"], false);

        let (status, history) = app.get("/api/currency/transactions", Some(&user)).await;
        assert_eq!(status, StatusCode::OK);
        let purchase = history["data"]
            .as_array()
            .unwrap()
            .iter()
            .find(|t| t["transaction_type"] == "purchase")
            .unwrap();
        assert_eq!(purchase["amount"], -55);
        assert_eq!(purchase["note"], format!("Order {}", order_id));

        let (status, mine) = app.get("/api/orders", Some(&user)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(mine.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_order_changes_nothing() {
        let app = spawn_app().await;
        let admin = app.admin_token().await;
        let user = app.create_user(&admin, "kate", 20).await;
        app.create_item(&admin, "Hoodie", 60, 5).await;
        app.create_item(&admin, "Mug", 15, 1).await;

        let (status, body) = app
            .post(
                "/api/orders",
                Some(&user),
                json!({ "items": [{ "item": "Hoodie", "quantity": 1 }] }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("Insufficient balance"));

        let (status, body) = app
            .post(
                "/api/orders",
                Some(&user),
                json!({ "items": [{ "item": "Mug", "quantity": 2 }] }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("Insufficient inventory"));

        let (_, me) = app.get("/api/auth/me", Some(&user)).await;
        assert_eq!(me["balance"], 20);
        let (_, hoodie) = app.get("/api/items/Hoodie", None).await;
        assert_eq!(hoodie["quantity"], 5);
        let (_, orders) = app.get("/api/orders", Some(&user)).await;
        assert!(orders.as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_orders_are_private_to_owner_and_admins() {
        let app = spawn_app().await;
        let admin = app.admin_token().await;
        let owner = app.create_user(&admin, "liam", 50).await;
        let other = app.create_user(&admin, "mona", 50).await;
        app.create_item(&admin, "Pen", 2, 10).await;

        let (_, body) = app
            .post(
                "/api/orders",
                Some(&owner),
                json!({ "items": [{ "item": "Pen", "quantity": 1 }] }),
            )
            .await;
        let uri = format!("/api/orders/{}", body["order_id"].as_str().unwrap());

        let (status, _) = app.get(&uri, Some(&owner)).await;
        assert_eq!(status, StatusCode::OK);
        let (status, _) = app.get(&uri, Some(&other)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = app.get(&uri, Some(&admin)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, all) = app.get("/api/admin/orders", Some(&admin)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(all.as_array().unwrap().len(), 1);
        let (status, _) = app.get("/api/admin/orders", Some(&other)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_reviews() {
        let app = spawn_app().await;
        let admin = app.admin_token().await;
        let user = app.create_user(&admin, "nina", 0).await;
        app.create_item(&admin, "Mug", 15, 3).await;

        let (status, body) = app
            .post(
                "/api/items/Mug/reviews",
                Some(&user),
                json!({ "rating": 5, "review_text": "Keeps coffee warm" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["username"], "nina");
        let id = body["id"].as_i64().unwrap();

        let (status, body) = app
            .post(
                "/api/items/Mug/reviews",
                None,
                json!({ "rating": 3, "review_text": "Fine" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body["username"].is_null());

        let (status, _) = app
            .post(
                "/api/items/Mug/reviews",
                None,
                json!({ "rating": 6, "review_text": "Too good" }),
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, reviews) = app.get("/api/items/Mug/reviews", None).await;
        assert_eq!(reviews.as_array().unwrap().len(), 2);

        let uri = format!("/api/items/Mug/reviews/{}", id);
        let (status, _) = app.delete(&uri, Some(&user)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = app.delete(&uri, Some(&admin)).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = app.delete(&uri, Some(&admin)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    fn multipart_request(uri: &str, token: &str, filename: &str, bytes: &[u8]) -> Request<Body> {
        let boundary = "nesop-test-boundary";
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{b}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{f}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                b = boundary,
                f = filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(format!("\r\n--{}--\r\n", boundary).as_bytes());

        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", boundary),
            )
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_image_upload_is_served() {
        let app = spawn_app().await;
        let admin = app.admin_token().await;
        app.create_item(&admin, "Mug", 15, 3).await;

        let request = multipart_request("/api/items/Mug/image", &admin, "mug.txt", b"not an image");
        let (status, _) = app.send(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let request = multipart_request("/api/items/Mug/image", &admin, "Mug Photo.PNG", b"\x89PNG fake");
        let (status, body) = app.send(request).await;
        assert_eq!(status, StatusCode::OK, "{}", body);
        let image = body["image"].as_str().unwrap().to_string();
        assert!(image.starts_with("assets/images/"));
        assert!(image.ends_with(".png"));

        let request = Request::builder()
            .uri(format!("/{}", image))
            .body(Body::empty())
            .unwrap();
        let (status, _) = app.send(request).await;
        assert_eq!(status, StatusCode::OK);
    }
}
