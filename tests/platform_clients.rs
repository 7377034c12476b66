use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use quest_gateway::upstream::discord::PERMISSION_VIEW_CHANNEL;
use quest_gateway::upstream::{
    http_client, DiscordApi, DiscordClient, ReferralDirectory, TelegramApi, TelegramClient,
    TitanClient, UpstreamError,
};

fn http() -> reqwest::Client {
    http_client(Duration::from_secs(5)).unwrap()
}

#[tokio::test]
async fn test_telegram_member_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/botTOKEN/getChatMember"))
        .and(query_param("chat_id", "-100200"))
        .and(query_param("user_id", "555"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "result": { "status": "member", "user": { "id": 555 } }
        })))
        .mount(&server)
        .await;

    let telegram = TelegramClient::new(http(), server.uri(), Some("TOKEN".into()));
    assert_eq!(
        telegram.chat_member_status("-100200", "555").await.unwrap(),
        "member"
    );
}

#[tokio::test]
async fn test_telegram_user_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/botTOKEN/getChatMember"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: user not found"
        })))
        .mount(&server)
        .await;

    let telegram = TelegramClient::new(http(), server.uri(), Some("TOKEN".into()));
    let err = telegram.chat_member_status("-100200", "1").await.unwrap_err();
    assert!(matches!(err, UpstreamError::Envelope { code: 400, .. }));
}

#[tokio::test]
async fn test_telegram_without_token() {
    let telegram = TelegramClient::new(http(), "http://127.0.0.1:1", None);
    let err = telegram.chat_member_status("-1", "1").await.unwrap_err();
    assert!(matches!(err, UpstreamError::NotConfigured(_)));
}

#[tokio::test]
async fn test_titan_code_lookup() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/kol/code"))
        .and(query_param("code", "KOL42"))
        .and(header("authorization", "Bearer secret"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "code": 0, "data": { "kol_user_id": "kol-owner" } })),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/kol/code"))
        .and(query_param("code", "NOPE"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "code": 0, "data": { "kol_user_id": "" } })),
        )
        .mount(&server)
        .await;

    let titan = TitanClient::new(http(), Some(server.uri()), Some("secret".into()));
    assert_eq!(
        titan.code_owner("KOL42").await.unwrap().as_deref(),
        Some("kol-owner")
    );
    assert!(titan.code_owner("NOPE").await.unwrap().is_none());
}

#[tokio::test]
async fn test_discord_channel_permissions() {
    let server = MockServer::start().await;
    let view = PERMISSION_VIEW_CHANNEL.to_string();

    let mount = |p: &'static str, body: serde_json::Value| {
        Mock::given(method("GET"))
            .and(path(p))
            .and(header("authorization", "Bot BOT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
    };

    mount(
        "/channels/c1",
        json!({
            "id": "c1",
            "guild_id": "g1",
            "permission_overwrites": [
                { "id": "g1", "type": 0, "allow": "0", "deny": view },
                { "id": "volunteer", "type": 0, "allow": view, "deny": "0" }
            ]
        }),
    )
    .mount(&server)
    .await;
    mount("/guilds/g1", json!({ "id": "g1", "owner_id": "owner" }))
        .mount(&server)
        .await;
    mount("/guilds/g1/members/u1", json!({ "roles": ["volunteer"] }))
        .mount(&server)
        .await;
    mount(
        "/guilds/g1/roles",
        json!([
            { "id": "g1", "permissions": view },
            { "id": "volunteer", "permissions": "0" }
        ]),
    )
    .mount(&server)
    .await;

    let discord = DiscordClient::new(http(), server.uri(), Some("BOT".into()));
    let perms = discord.channel_permissions("u1", "c1").await.unwrap();
    assert_ne!(perms & PERMISSION_VIEW_CHANNEL, 0);
}
