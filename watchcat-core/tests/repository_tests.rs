// Run with a reachable Postgres:
//   TEST_DATABASE_URL=postgres://... cargo test -- --ignored

use watchcat_common::models::{ManagedMessage, Stream};
use watchcat_core::repositories::{
    GuildRepository, ManagedMessageRepository, PostgresGuildRepository,
    PostgresManagedMessageRepository, PostgresSnapshotRepository, SnapshotRepository,
};
use watchcat_core::test_utils::helpers::setup_test_database;
use watchcat_core::test_utils::stream;
use watchcat_core::Error;

#[tokio::test]
#[ignore = "requires Postgres"]
async fn test_guild_settings_report_changes() -> Result<(), Error> {
    let db = setup_test_database().await?;
    let repo = PostgresGuildRepository::new(db.pool().clone());

    assert!(repo.get("g1").await?.is_none());
    assert!(repo.set_channel("g1", "c1").await?);
    assert!(!repo.set_channel("g1", "c1").await?);
    assert!(repo.set_ping_role("g1", "r1").await?);
    assert!(repo.grant("g1", "admins").await?);
    assert!(!repo.grant("g1", "admins").await?);

    let config = repo.get("g1").await?.expect("guild should exist");
    assert_eq!(config.channel_id.as_deref(), Some("c1"));
    assert_eq!(config.ping_role_id.as_deref(), Some("r1"));
    assert!(config.is_admin_role("admins"));

    assert!(repo.unset_ping_role("g1").await?);
    assert!(!repo.unset_ping_role("g1").await?);
    assert!(repo.revoke("g1", "admins").await?);
    assert!(!repo.revoke("g1", "admins").await?);
    Ok(())
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn test_watch_lists_are_case_folded() -> Result<(), Error> {
    let db = setup_test_database().await?;
    let repo = PostgresGuildRepository::new(db.pool().clone());

    assert!(repo.watch("g1", "picarto_tv", "Foo").await?);
    assert!(!repo.watch("g1", "picarto_tv", "foo").await?);
    repo.watch("g2", "picarto_tv", "FOO").await?;
    repo.watch("g2", "picarto_tv", "bar").await?;
    repo.watch("g2", "piczel_tv", "baz").await?;

    assert_eq!(
        repo.global_watch_list("picarto_tv").await?,
        vec!["bar".to_string(), "foo".to_string()]
    );
    let watching: Vec<String> = repo
        .list_watching("picarto_tv", "fOo")
        .await?
        .into_iter()
        .map(|g| g.guild_id)
        .collect();
    assert_eq!(watching, vec!["g1".to_string(), "g2".to_string()]);

    assert!(repo.unwatch("g2", "picarto_tv", "Foo").await?);
    assert!(!repo.unwatch("g2", "picarto_tv", "foo").await?);
    assert_eq!(repo.list_watching("picarto_tv", "foo").await?.len(), 1);

    assert!(repo.delete("g2").await?);
    assert!(repo.global_watch_list("piczel_tv").await?.is_empty());
    Ok(())
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn test_managed_messages_one_per_target() -> Result<(), Error> {
    let db = setup_test_database().await?;
    let repo = PostgresManagedMessageRepository::new(db.pool().clone());

    repo.insert(&ManagedMessage::new("c1", "m1", "g1", "net", "Foo")).await?;
    repo.insert(&ManagedMessage::new("c2", "m2", "g2", "net", "foo")).await?;
    assert!(repo.insert(&ManagedMessage::new("c1", "m3", "g1", "net", "foo")).await.is_err());

    assert_eq!(repo.find_for_streamer("net", "FOO").await?.len(), 2);
    assert_eq!(repo.find_for_channel("c1").await?.len(), 1);
    assert_eq!(repo.find_for_guild("g2").await?.len(), 1);

    let taken = repo.take("g1", "net", "foo").await?.expect("record should exist");
    assert_eq!(taken.message_id, "m1");
    assert!(repo.take("g1", "net", "foo").await?.is_none());
    Ok(())
}

#[tokio::test]
#[ignore = "requires Postgres"]
async fn test_snapshots_round_trip_and_replace() -> Result<(), Error> {
    let db = setup_test_database().await?;
    let repo = PostgresSnapshotRepository::new(db.pool().clone());

    assert!(repo.load("net").await?.is_empty());

    let mut live: Stream = stream("net", "1", "foo");
    live.title = Some("Drawing".into());
    live.follower_count = Some(12);
    repo.save("net", &[live.clone(), stream("net", "2", "bar")]).await?;
    repo.save("net", &[live.clone()]).await?;

    assert_eq!(repo.load("net").await?, vec![live]);
    assert!(repo.load("other").await?.is_empty());
    Ok(())
}
