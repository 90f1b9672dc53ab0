mod common;

use common::{authed_reddit, listing, message, ScriptedTransport, UNREAD_ROUTE};
use reddit_readwise::reddit::{InboxKind, ListingParams};
use serde_json::json;

#[tokio::test]
async fn pagination_follows_cursor_until_exhausted() {
    let transport = ScriptedTransport::new();
    transport
        .on(
            UNREAD_ROUTE,
            200,
            listing(vec![message("m1", "alice", "a"), message("m2", "bob", "b")], Some("t4_m2")),
        )
        .on(UNREAD_ROUTE, 200, listing(vec![message("m3", "carol", "c")], None));
    let reddit = authed_reddit(&transport);

    let mut inbox = reddit.inbox(InboxKind::Unread);
    assert!(inbox.has_more());

    let page = inbox.fetch_next().await.unwrap();
    assert_eq!(page.len(), 2);
    assert!(inbox.has_more());

    let page = inbox.fetch_next().await.unwrap();
    assert_eq!(page.len(), 1);
    assert!(!inbox.has_more());

    let ids: Vec<&str> = inbox.items().iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["m1", "m2", "m3"]);

    let calls = transport.calls_to(UNREAD_ROUTE);
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].query("after"), None);
    assert_eq!(calls[1].query("after").as_deref(), Some("t4_m2"));

    // Exhausted listings answer without another request.
    assert!(inbox.fetch_next().await.unwrap().is_empty());
    assert_eq!(transport.calls_to(UNREAD_ROUTE).len(), 2);
}

#[tokio::test]
async fn empty_after_cursor_ends_pagination() {
    let transport = ScriptedTransport::new();
    transport.on(UNREAD_ROUTE, 200, listing(vec![message("m1", "alice", "a")], Some("")));
    let reddit = authed_reddit(&transport);

    let mut inbox = reddit.inbox(InboxKind::Unread);
    let all = inbox.fetch_all().await.unwrap();
    assert_eq!(all.len(), 1);
    assert!(!inbox.has_more());
}

#[tokio::test]
async fn undecodable_children_are_rejected_not_fatal() {
    let transport = ScriptedTransport::new();
    transport.on(
        UNREAD_ROUTE,
        200,
        listing(
            vec![
                message("m1", "alice", "a"),
                json!({ "kind": "t5", "data": { "name": "t5_sub" } }),
                json!({ "kind": "t1", "data": { "id": "c1", "name": "t1_c1", "body": "reply" } }),
            ],
            None,
        ),
    );
    let reddit = authed_reddit(&transport);

    let mut inbox = reddit.inbox(InboxKind::Unread);
    let all = inbox.fetch_all().await.unwrap();
    assert_eq!(all.len(), 1);

    let rejected = inbox.rejected();
    assert_eq!(rejected.len(), 2);
    assert_eq!(rejected[0].fullname.as_deref(), Some("t5_sub"));
    assert!(rejected[0].reason.contains("t5"));
    assert_eq!(rejected[1].fullname.as_deref(), Some("t1_c1"));
}

#[tokio::test]
async fn map_concurrent_covers_every_page_in_order() {
    let transport = ScriptedTransport::new();
    transport
        .on(
            UNREAD_ROUTE,
            200,
            listing(vec![message("m1", "a", "1"), message("m2", "b", "2")], Some("t4_m2")),
        )
        .on(
            UNREAD_ROUTE,
            200,
            listing(vec![message("m3", "c", "3"), message("m4", "d", "4")], Some("t4_m4")),
        )
        .on(UNREAD_ROUTE, 200, listing(vec![message("m5", "e", "5")], None));
    let reddit = authed_reddit(&transport);

    let mut inbox = reddit.inbox(InboxKind::Unread);
    let bodies = inbox
        .map_concurrent(|msg| async move { msg.body.parse::<u32>().unwrap() * 10 })
        .await
        .unwrap();
    assert_eq!(bodies, vec![10, 20, 30, 40, 50]);
    assert!(!inbox.has_more());
    assert_eq!(transport.calls_to(UNREAD_ROUTE).len(), 3);
}

#[tokio::test]
async fn page_error_aborts_mapping() {
    let transport = ScriptedTransport::new();
    transport
        .on(UNREAD_ROUTE, 200, listing(vec![message("m1", "a", "1")], Some("t4_m1")))
        .on(UNREAD_ROUTE, 500, r#"{"message": "Internal Server Error"}"#);
    let reddit = authed_reddit(&transport);

    let mut inbox = reddit.inbox(InboxKind::Unread);
    let result = inbox.map_concurrent(|msg| async move { msg.id }).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn info_lookup_returns_typed_things() {
    let transport = ScriptedTransport::new();
    common::script_comment(&transport, "abc123", "def456", "alice", "quoted text");
    let reddit = authed_reddit(&transport);

    let comment = reddit.comment("def456").await.unwrap();
    assert_eq!(comment.body, "quoted text");
    assert_eq!(comment.author.as_deref(), Some("alice"));

    let submission = reddit.submission("t3_abc123").await.unwrap();
    assert_eq!(submission.title, "Thread abc123");

    let err = reddit.comment("missing").await.unwrap_err();
    assert!(err.to_string().contains("t1_missing") || err.status_code().is_some());
}

#[tokio::test]
async fn empty_info_listing_is_not_found() {
    let transport = ScriptedTransport::new();
    transport.on("GET /api/info?id=t1_gone", 200, listing(vec![], None));
    let reddit = authed_reddit(&transport);

    let err = reddit.comment("gone").await.unwrap_err();
    assert!(matches!(err, reddit_readwise::error::Error::NotFound(name) if name == "t1_gone"));
}

#[tokio::test]
async fn inbox_params_are_sent_and_cursor_advances() {
    let transport = ScriptedTransport::new();
    transport
        .on(
            "GET /message/inbox",
            200,
            listing(vec![message("m2", "alice", "a")], Some("t4_m2")),
        )
        .on("GET /message/inbox", 200, listing(vec![], None));
    let reddit = authed_reddit(&transport);

    let params = ListingParams {
        limit: Some(1),
        after: Some("t4_m1".into()),
        count: Some(1),
        show_all: true,
        ..Default::default()
    };
    let mut inbox = reddit.inbox_with(InboxKind::Inbox, params);
    inbox.fetch_all().await.unwrap();

    let calls = transport.calls_to("GET /message/inbox");
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].query("limit").as_deref(), Some("1"));
    assert_eq!(calls[0].query("after").as_deref(), Some("t4_m1"));
    assert_eq!(calls[0].query("count").as_deref(), Some("1"));
    assert_eq!(calls[0].query("show").as_deref(), Some("all"));
    assert_eq!(calls[1].query("after").as_deref(), Some("t4_m2"));
    assert_eq!(calls[1].query("limit").as_deref(), Some("1"));
}
