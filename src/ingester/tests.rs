//! Unit tests for ingester module

#[cfg(test)]
mod tests {
    use super::super::discord::{DiscordMessage, WatchedChannel};
    use super::super::threads::{collect_thread_items, parse_page};
    use super::super::telegram::parse_preview;
    use super::super::twitter::SearchResponse;
    use super::super::*;
    use crate::config::{ChannelsConfig, DiscordConfig, ThreadsConfig, TwitterConfig};
    use crate::error::BotError;
    use crate::types::ForwardRef;
    use chrono_tz::Tz;
    use mockito::Matcher;
    use reqwest::Client;
    use serde_json::json;

    /// 2023-11-14T22:13:20Z
    const T0: i64 = 1_700_000_000;

    fn routing() -> Routing {
        Routing {
            news_chat: 1,
            trade_chat: 2,
            log_chat: 3,
            tz: Tz::UTC,
        }
    }

    #[test]
    fn test_high_water_mark_is_monotonic() {
        let mut marks = HighWaterMark::new();
        assert!(marks.is_new(&"a", 10));
        marks.advance("a", 10);
        assert!(!marks.is_new(&"a", 10));
        assert!(marks.is_new(&"a", 11));

        marks.advance("a", 5);
        assert_eq!(marks.get(&"a"), Some(10));
        assert_eq!(marks.get(&"b"), None);
    }

    #[test]
    fn test_high_water_mark_seed_keeps_existing() {
        let mut marks = HighWaterMark::new();
        assert_eq!(marks.seed("c", 100), 100);
        marks.advance("c", 150);
        assert_eq!(marks.seed("c", 100), 150);
    }

    #[test]
    fn test_within_sla() {
        assert!(within_sla(1_000, 400, 600));
        assert!(!within_sla(1_000, 399, 600));
        assert!(within_sla(1_000, 1_200, 600));
    }

    #[test]
    fn test_routing() {
        let routing = routing();
        assert_eq!(routing.chat_for("LONG BTC 20x"), 2);
        assert_eq!(routing.chat_for("Market update"), 1);
        assert_eq!(
            routing.title("Twitter - Binance", T0),
            "Twitter - Binance - Time: 2023-11-14 22:13:20+00:00"
        );

        let err = routing.error("Error Discord", &BotError::Api("boom".into()));
        assert_eq!(err.chat_id, 3);
        assert_eq!(err.body, "Error: API error: boom");
    }

    #[test]
    fn test_post_body_escapes_text() {
        let body = post_body("a < b", "https://x.com/u/status/1");
        assert_eq!(
            body,
            "a &lt; b\n\nLink: <a href=\"https://x.com/u/status/1\">https://x.com/u/status/1</a>"
        );
    }

    // ---- Twitter ----

    fn search_response() -> SearchResponse {
        serde_json::from_value(json!({
            "data": [
                { "id": "2", "text": "Long BTC", "author_id": "10", "created_at": "2023-11-14T22:13:20.000Z" },
                { "id": "1", "text": "gm", "author_id": "10", "created_at": "2023-11-14T22:03:20.000Z" },
                { "id": "0", "text": "ancient", "author_id": "10", "created_at": "2023-11-01T00:00:00.000Z" }
            ],
            "includes": { "users": [ { "id": "10", "name": "Binance", "username": "binance" } ] }
        }))
        .unwrap()
    }

    #[test]
    fn test_twitter_filter_orders_and_routes() {
        let source = TwitterSource::new(Client::new(), TwitterConfig::default(), routing());
        let messages = source.filter(search_response(), T0 + 100);

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].chat_id, 1);
        assert_eq!(
            messages[0].title,
            "Twitter - Binance - Time: 2023-11-14 22:03:20+00:00"
        );
        assert_eq!(messages[1].chat_id, 2);
        assert!(messages[1].body.contains("https://x.com/binance/status/2"));

        assert!(source.filter(search_response(), T0 + 100).is_empty());
    }

    #[test]
    fn test_twitter_empty_response() {
        let resp: SearchResponse =
            serde_json::from_value(json!({ "meta": { "result_count": 0 } })).unwrap();
        let source = TwitterSource::new(Client::new(), TwitterConfig::default(), routing());
        assert!(source.filter(resp, T0).is_empty());
    }

    #[tokio::test]
    async fn test_twitter_poll_reports_failed_query() {
        let mut server = mockito::Server::new_async().await;
        let ok = server
            .mock("GET", "/tweets/search/recent")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("query".into(), "from:binance".into()),
                Matcher::UrlEncoded("max_results".into(), "10".into()),
                Matcher::UrlEncoded("expansions".into(), "author_id".into()),
            ]))
            .match_header("authorization", "Bearer TOKEN")
            .with_body(r#"{"meta":{"result_count":0}}"#)
            .expect(1)
            .create_async()
            .await;
        let failing = server
            .mock("GET", "/tweets/search/recent")
            .match_query(Matcher::UrlEncoded("query".into(), "from:nobody".into()))
            .with_status(429)
            .with_body(r#"{"title":"Too Many Requests"}"#)
            .expect(1)
            .create_async()
            .await;

        let config = TwitterConfig {
            enabled: true,
            bearer_token: Some("TOKEN".into()),
            queries: vec!["from:binance".into(), "from:nobody".into()],
            api_url: server.url(),
            ..TwitterConfig::default()
        };
        let source = TwitterSource::new(Client::new(), config, routing()).with_pause(Pause::none());
        let messages = source.poll().await.unwrap();

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].chat_id, 3);
        assert_eq!(messages[0].title, "Error Twitter search - from:nobody");
        ok.assert_async().await;
        failing.assert_async().await;
    }

    #[tokio::test]
    async fn test_twitter_search_keeps_configured_count() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/tweets/search/recent")
            .match_query(Matcher::UrlEncoded("max_results".into(), "10".into()))
            .with_body(serde_json::to_string(&json!({
                "data": [
                    { "id": "3", "text": "c", "author_id": "10", "created_at": "2023-11-14T22:13:20.000Z" },
                    { "id": "2", "text": "b", "author_id": "10", "created_at": "2023-11-14T22:10:00.000Z" },
                    { "id": "1", "text": "a", "author_id": "10", "created_at": "2023-11-14T22:00:00.000Z" }
                ]
            })).unwrap())
            .create_async()
            .await;

        let config = TwitterConfig {
            bearer_token: Some("TOKEN".into()),
            tweets_count: 2,
            api_url: server.url(),
            ..TwitterConfig::default()
        };
        let source = TwitterSource::new(Client::new(), config, routing());
        let resp = source.search("from:binance").await.unwrap();

        let ids: Vec<&str> = resp.data.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "2"]);
    }

    #[tokio::test]
    async fn test_twitter_init_requires_token() {
        let source = TwitterSource::new(Client::new(), TwitterConfig::default(), routing());
        assert!(matches!(source.init().await, Err(BotError::Auth(_))));
    }

    // ---- Threads ----

    const THREADS_PAGE: &str = r#"<html><head></head><body>
<script type="application/json" data-sjs>{"require":[["ScheduledServerJS","handle",null,[{"__bbox":{"result":{"data":{"mediaData":{"edges":[
{"node":{"thread_items":[{"post":{"code":"ABC","taken_at":1700000000,"caption":{"text":"Short ETH here"},"user":{"username":"trader"},"image_versions2":{"candidates":[{"url":"https://img.example/1.jpg"}]}}}]}},
{"node":{"thread_items":[{"post":{"code":"DEF","taken_at":1699999000,"caption":{"text":"gm"},"user":{"username":"trader"}}},{"post":{"code":"ABC","taken_at":1700000000,"caption":{"text":"Short ETH here"},"user":{"username":"trader"}}}]}}
]}}}}}]]]}</script>
<script type="application/json" data-sjs>{"other":1}</script>
</body></html>"#;

    #[test]
    fn test_collect_thread_items_nested() {
        let data = json!({
            "a": [ { "thread_items": [1, 2] } ],
            "b": { "c": { "thread_items": [3] } },
            "d": "thread_items"
        });
        let mut items = Vec::new();
        collect_thread_items(&data, &mut items);
        assert_eq!(items.len(), 3);
    }

    #[test]
    fn test_threads_parse_page() {
        let posts = parse_page(THREADS_PAGE, "https://www.threads.net").unwrap();
        assert_eq!(posts.len(), 2);

        assert_eq!(posts[0].code, "ABC");
        assert_eq!(posts[0].text, "Short ETH here");
        assert_eq!(posts[0].taken_at, T0);
        assert_eq!(posts[0].image.as_deref(), Some("https://img.example/1.jpg"));
        assert_eq!(posts[0].url, "https://www.threads.net/@trader/post/ABC");
        assert_eq!(posts[1].image, None);
    }

    #[test]
    fn test_threads_filter_adds_replies_hint() {
        let source = ThreadsSource::new(Client::new(), ThreadsConfig::default(), routing());
        let posts = parse_page(THREADS_PAGE, "https://www.threads.net").unwrap();
        let messages = source.filter("trader", &posts, T0 + 100);

        // DEF is older than the SLA
        assert_eq!(messages.len(), 1);
        let msg = &messages[0];
        assert_eq!(msg.chat_id, 2);
        assert_eq!(msg.image.as_deref(), Some("https://img.example/1.jpg"));
        assert!(msg.title.starts_with("Threads - trader - Time: "));
        assert!(msg
            .body
            .contains("<code>/freplies https://www.threads.net/@trader/post/ABC?sort_order=recent</code>"));

        assert!(source.filter("trader", &posts, T0 + 100).is_empty());
    }

    #[tokio::test]
    async fn test_threads_scrape_thread_root_first() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/@trader/post/ABC")
            .with_body(THREADS_PAGE)
            .create_async()
            .await;

        let config = ThreadsConfig {
            base_url: server.url(),
            ..ThreadsConfig::default()
        };
        let source = ThreadsSource::new(Client::new(), config, routing());
        let posts = source
            .scrape_thread(&format!("{}/@trader/post/ABC", server.url()))
            .await
            .unwrap();
        assert_eq!(posts[0].code, "ABC");
        mock.assert_async().await;
    }

    // ---- Telegram channels ----

    const PREVIEW_PAGE: &str = r#"<html><body><section class="tgme_channel_history">
<div class="tgme_widget_message_wrap"><div class="tgme_widget_message js-widget_message" data-post="news/99">
<div class="tgme_widget_message_text js-message_text" dir="auto">Old news</div>
<a class="tgme_widget_message_date" href="https://t.me/news/99"><time datetime="2023-11-14T20:00:00+00:00" class="time">20:00</time></a>
</div></div>
<div class="tgme_widget_message_wrap"><div class="tgme_widget_message js-widget_message" data-post="news/100">
<div class="tgme_widget_message_text js-message_text" dir="auto">Bitcoin up<br/>Buy now &amp; hold</div>
<a class="tgme_widget_message_date" href="https://t.me/news/100"><time datetime="2023-11-14T22:13:20+00:00" class="time">22:13</time></a>
</div></div>
<div class="tgme_widget_message_wrap"><div class="tgme_widget_message js-widget_message" data-post="news/101">
<div class="tgme_widget_message_text js-message_text" dir="auto">Hello world</div>
<a class="tgme_widget_message_date" href="https://t.me/news/101"><time datetime="2023-11-14T22:13:30+00:00" class="time">22:13</time></a>
</div></div>
</section></body></html>"#;

    #[test]
    fn test_parse_preview() {
        let posts = parse_preview(PREVIEW_PAGE).unwrap();
        assert_eq!(posts.len(), 3);
        assert_eq!(posts[1].id, 100);
        assert_eq!(posts[1].text, "Bitcoin up\nBuy now & hold");
        assert_eq!(posts[1].date, T0);
    }

    #[test]
    fn test_channel_filter_forwards_new_posts() {
        let source = ChannelSource::new(Client::new(), ChannelsConfig::default(), routing());
        let posts = parse_preview(PREVIEW_PAGE).unwrap();
        let messages = source.filter("news", posts.clone(), T0 + 100);

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].chat_id, 2);
        assert_eq!(
            messages[0].forward,
            Some(ForwardRef {
                from_chat: "@news".into(),
                message_id: 100,
            })
        );
        assert!(messages[0].body.contains("https://t.me/news/100"));
        assert_eq!(messages[1].chat_id, 1);

        assert!(source.filter("news", posts, T0 + 200).is_empty());
    }

    #[test]
    fn test_channel_filter_keeps_newest_within_limit() {
        let config = ChannelsConfig {
            limit: 1,
            ..ChannelsConfig::default()
        };
        let source = ChannelSource::new(Client::new(), config, routing());
        let posts = parse_preview(PREVIEW_PAGE).unwrap();
        let messages = source.filter("news", posts, T0 + 100);

        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].forward.as_ref().map(|f| f.message_id), Some(101));
    }

    // ---- Discord ----

    fn watched() -> WatchedChannel {
        WatchedChannel {
            channel_id: "c1".into(),
            channel_name: "general".into(),
            guild_id: "g1".into(),
            guild_name: "Guild".into(),
        }
    }

    fn discord_messages() -> Vec<DiscordMessage> {
        serde_json::from_value(json!([
            { "id": "300", "content": "new", "timestamp": "2023-11-14T22:13:20.000000+00:00" },
            {
                "id": "200",
                "content": "",
                "timestamp": "2023-11-14T22:10:00+00:00",
                "message_snapshots": [ { "message": {
                    "content": "Sell SOL",
                    "attachments": [ { "url": "https://cdn.example/a.png" }, { "url": "https://cdn.example/b.png" } ]
                } } ]
            },
            { "id": "100", "content": "old", "timestamp": "2023-11-14T20:00:00+00:00" }
        ]))
        .unwrap()
    }

    #[test]
    fn test_discord_filter_oldest_first() {
        let source = DiscordSource::new(Client::new(), DiscordConfig::default(), routing());
        let messages = source.filter(&watched(), &discord_messages(), T0 + 100);

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].chat_id, 2);
        assert_eq!(
            messages[0].title,
            "Discord - Guild-general - Time: 2023-11-14 22:10:00+00:00"
        );
        assert!(messages[0].body.starts_with("Sell SOL"));
        assert!(messages[0]
            .body
            .contains("https://discord.com/channels/g1/c1/200"));
        assert_eq!(messages[0].images.len(), 2);
        assert_eq!(messages[1].chat_id, 1);
        assert_eq!(messages[1].image, None);
    }

    #[tokio::test]
    async fn test_discord_fetch_uses_last_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/channels/c1/messages")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("limit".into(), "10".into()),
                Matcher::UrlEncoded("after".into(), "300".into()),
            ]))
            .match_header("authorization", "user-token")
            .with_body("[]")
            .expect(1)
            .create_async()
            .await;

        let config = DiscordConfig {
            enabled: true,
            token: "user-token".into(),
            api_url: server.url(),
            ..DiscordConfig::default()
        };
        let source = DiscordSource::new(Client::new(), config, routing());
        source.filter(&watched(), &discord_messages(), T0 + 100);

        assert!(source.fetch_messages("c1").await.unwrap().is_empty());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_discord_init_resolves_guild_once() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/channels/c1")
            .with_body(r#"{"id":"c1","name":"general","guild_id":"g1"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/channels/c2")
            .with_body(r#"{"id":"c2","name":"alpha","guild_id":"g1"}"#)
            .create_async()
            .await;
        let guild = server
            .mock("GET", "/guilds/g1")
            .with_body(r#"{"id":"g1","name":"Guild"}"#)
            .expect(1)
            .create_async()
            .await;

        let config = DiscordConfig {
            enabled: true,
            token: "t".into(),
            channel_ids: vec!["c1".into(), "c2".into()],
            api_url: server.url(),
            ..DiscordConfig::default()
        };
        let source =
            DiscordSource::new(Client::new(), config, routing()).with_pause(Pause::none());
        source.init().await.unwrap();

        let channels = source.channels();
        assert_eq!(channels.len(), 2);
        assert_eq!(channels[1].channel_name, "alpha");
        assert_eq!(channels[1].guild_name, "Guild");
        guild.assert_async().await;
    }

    #[tokio::test]
    async fn test_discord_init_failure() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/channels/c1")
            .with_status(401)
            .with_body(r#"{"message":"401: Unauthorized","code":0}"#)
            .create_async()
            .await;

        let config = DiscordConfig {
            enabled: true,
            token: "bad".into(),
            channel_ids: vec!["c1".into()],
            api_url: server.url(),
            ..DiscordConfig::default()
        };
        let source = DiscordSource::new(Client::new(), config, routing());
        assert!(source.init().await.is_err());
        assert!(source.channels().is_empty());
    }

    // ---- Scheduler ----

    struct FakeSource {
        fail_init: bool,
    }

    #[async_trait]
    impl Source for FakeSource {
        fn name(&self) -> &str {
            "Fake"
        }

        fn interval(&self) -> Duration {
            Duration::from_secs(3600)
        }

        async fn init(&self) -> crate::error::Result<()> {
            if self.fail_init {
                return Err(BotError::Auth("no token".into()));
            }
            Ok(())
        }

        async fn poll(&self) -> crate::error::Result<Vec<Message>> {
            Ok(vec![Message::new(1, "post", "body")])
        }
    }

    #[tokio::test]
    async fn test_spawn_source_polls_immediately() {
        let (queue, mut rx) = NotificationQueue::new(3);
        let handle = spawn_source(Arc::new(FakeSource { fail_init: false }), queue);

        let msg = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg.title, "post");
        handle.abort();
    }

    #[tokio::test]
    async fn test_spawn_source_init_failure_reported() {
        let (queue, mut rx) = NotificationQueue::new(3);
        let handle = spawn_source(Arc::new(FakeSource { fail_init: true }), queue);

        let msg = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(msg.chat_id, 3);
        assert_eq!(msg.title, "Error Fake init, source disabled");
        handle.await.unwrap();
    }
}
