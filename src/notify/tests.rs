//! Unit tests for the notification channel

#[cfg(test)]
mod tests {
    use super::super::*;
    use mockito::Matcher;
    use serde_json::json;

    const SENT: &str = r#"{"ok":true,"result":{"message_id":1,"date":0,"chat":{"id":5}}}"#;

    fn notifier_for(server: &mockito::ServerGuard) -> Notifier {
        let http = Client::new();
        let api = BotApi::new(http.clone(), &server.url(), "TOKEN");
        Notifier::new(Arc::new(api), http)
    }

    #[tokio::test]
    async fn test_text_message_disables_previews() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/botTOKEN/sendMessage")
            .match_body(Matcher::PartialJson(json!({
                "chat_id": 5,
                "text": "<b>Title</b>\nbody",
                "parse_mode": "HTML",
                "link_preview_options": { "is_disabled": true },
            })))
            .with_body(SENT)
            .expect(1)
            .create_async()
            .await;

        let notifier = notifier_for(&server);
        notifier.deliver(&Message::new(5, "Title", "body")).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_html_rejection_falls_back_to_plain() {
        let mut server = mockito::Server::new_async().await;
        let html = server
            .mock("POST", "/botTOKEN/sendMessage")
            .match_body(Matcher::PartialJson(json!({ "parse_mode": "HTML" })))
            .with_status(400)
            .with_body(r#"{"ok":false,"error_code":400,"description":"Bad Request: can't parse entities"}"#)
            .expect(1)
            .create_async()
            .await;
        let plain = server
            .mock("POST", "/botTOKEN/sendMessage")
            .match_body(Matcher::PartialJson(json!({ "text": "Title\nbroken" })))
            .with_body(SENT)
            .expect(1)
            .create_async()
            .await;

        let notifier = notifier_for(&server);
        notifier
            .deliver(&Message::new(5, "Title", "<i>broken</b>"))
            .await
            .unwrap();
        html.assert_async().await;
        plain.assert_async().await;
    }

    #[tokio::test]
    async fn test_single_image_sent_by_url() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/botTOKEN/sendPhoto")
            .match_body(Matcher::PartialJson(json!({
                "photo": "https://img.example/1.jpg",
                "caption": "<b>T</b>\nb",
            })))
            .with_body(SENT)
            .expect(1)
            .create_async()
            .await;

        let notifier = notifier_for(&server);
        let msg = Message::new(5, "T", "b").with_image("https://img.example/1.jpg");
        notifier.deliver(&msg).await.unwrap();
        mock.assert_async().await;
    }

    const WRONG_URL: &str =
        r#"{"ok":false,"error_code":400,"description":"Bad Request: wrong file identifier/HTTP URL specified"}"#;

    #[tokio::test]
    async fn test_rejected_photo_url_is_uploaded() {
        let mut server = mockito::Server::new_async().await;
        let by_url = server
            .mock("POST", "/botTOKEN/sendPhoto")
            .match_header("content-type", "application/json")
            .with_status(400)
            .with_body(WRONG_URL)
            .expect(1)
            .create_async()
            .await;
        let image = server
            .mock("GET", "/img/1.jpg")
            .with_body("JPEGDATA")
            .expect(1)
            .create_async()
            .await;
        let upload = server
            .mock("POST", "/botTOKEN/sendPhoto")
            .match_header("content-type", Matcher::Regex("multipart/form-data".to_string()))
            .match_body(Matcher::Regex("JPEGDATA".to_string()))
            .with_body(SENT)
            .expect(1)
            .create_async()
            .await;
        let text = server
            .mock("POST", "/botTOKEN/sendMessage")
            .expect(0)
            .create_async()
            .await;

        let notifier = notifier_for(&server);
        let msg = Message::new(5, "T", "b").with_image(format!("{}/img/1.jpg", server.url()));
        notifier.deliver(&msg).await.unwrap();
        by_url.assert_async().await;
        image.assert_async().await;
        upload.assert_async().await;
        text.assert_async().await;
    }

    #[tokio::test]
    async fn test_undownloadable_photo_sent_as_link() {
        let mut server = mockito::Server::new_async().await;
        let by_url = server
            .mock("POST", "/botTOKEN/sendPhoto")
            .match_header("content-type", "application/json")
            .with_status(400)
            .with_body(WRONG_URL)
            .expect(1)
            .create_async()
            .await;
        let image = server
            .mock("GET", "/img/missing.jpg")
            .with_status(404)
            .expect(1)
            .create_async()
            .await;
        let upload = server
            .mock("POST", "/botTOKEN/sendPhoto")
            .match_header("content-type", Matcher::Regex("multipart/form-data".to_string()))
            .expect(0)
            .create_async()
            .await;
        let text = server
            .mock("POST", "/botTOKEN/sendMessage")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex("img/missing\\.jpg".to_string()),
                Matcher::Regex(">Image</a>".to_string()),
            ]))
            .with_body(SENT)
            .expect(1)
            .create_async()
            .await;

        let notifier = notifier_for(&server);
        let url = format!("{}/img/missing.jpg", server.url());
        let msg = Message::new(5, "T", "b").with_image(url);
        notifier.deliver(&msg).await.unwrap();
        by_url.assert_async().await;
        image.assert_async().await;
        upload.assert_async().await;
        text.assert_async().await;
    }

    #[tokio::test]
    async fn test_media_group_failure_sends_text_with_error() {
        let mut server = mockito::Server::new_async().await;
        let group = server
            .mock("POST", "/botTOKEN/sendMediaGroup")
            .with_status(400)
            .with_body(r#"{"ok":false,"error_code":400,"description":"Bad Request: wrong file"}"#)
            .expect(1)
            .create_async()
            .await;
        let text = server
            .mock("POST", "/botTOKEN/sendMessage")
            .match_body(Matcher::Regex("Media error".to_string()))
            .with_body(SENT)
            .expect(1)
            .create_async()
            .await;

        let notifier = notifier_for(&server);
        let msg = Message::new(5, "T", "b").with_images(vec![
            "https://img.example/1.jpg".into(),
            "https://img.example/2.jpg".into(),
        ]);
        notifier.deliver(&msg).await.unwrap();
        group.assert_async().await;
        text.assert_async().await;
    }

    #[tokio::test]
    async fn test_forward_skips_text() {
        let mut server = mockito::Server::new_async().await;
        let forward = server
            .mock("POST", "/botTOKEN/forwardMessage")
            .match_body(Matcher::PartialJson(json!({
                "chat_id": 5,
                "from_chat_id": "@news",
                "message_id": 42,
            })))
            .with_body(SENT)
            .expect(1)
            .create_async()
            .await;
        let text = server
            .mock("POST", "/botTOKEN/sendMessage")
            .expect(0)
            .create_async()
            .await;

        let notifier = notifier_for(&server);
        let msg = Message::new(5, "Telegram - @news", "post").forward_of("@news", 42);
        notifier.deliver(&msg).await.unwrap();
        forward.assert_async().await;
        text.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_forward_publishes_text() {
        let mut server = mockito::Server::new_async().await;
        let forward = server
            .mock("POST", "/botTOKEN/forwardMessage")
            .with_status(400)
            .with_body(r#"{"ok":false,"error_code":400,"description":"Bad Request: message can't be forwarded"}"#)
            .expect(1)
            .create_async()
            .await;
        let text = server
            .mock("POST", "/botTOKEN/sendMessage")
            .match_body(Matcher::PartialJson(json!({ "text": "<b>Telegram - @news</b>\npost" })))
            .with_body(SENT)
            .expect(1)
            .create_async()
            .await;

        let notifier = notifier_for(&server);
        let msg = Message::new(5, "Telegram - @news", "post").forward_of("@news", 42);
        notifier.deliver(&msg).await.unwrap();
        forward.assert_async().await;
        text.assert_async().await;
    }

    #[tokio::test]
    async fn test_disabled_notifier_drops_messages() {
        let notifier = Notifier::disabled();
        assert!(!notifier.is_enabled());
        notifier.deliver(&Message::new(1, "t", "b")).await.unwrap();
    }

    #[tokio::test]
    async fn test_report_error_queues_plain_message() {
        let (queue, mut rx) = NotificationQueue::new(-100);
        queue.report_error("Twitter poll failed", &"timeout");

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.chat_id, -100);
        assert_eq!(msg.title, "Twitter poll failed");
        assert_eq!(msg.body, "timeout");
        assert_eq!(msg.format, TextFormat::Plain);
    }

    #[tokio::test]
    async fn test_queue_send_after_close_does_not_panic() {
        let (queue, rx) = NotificationQueue::new(1);
        drop(rx);
        queue.send(Message::new(1, "t", "b"));
    }
}
