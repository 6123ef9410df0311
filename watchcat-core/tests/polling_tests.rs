mod common;

use std::sync::Arc;

use common::{Harness, Recorded, RecordingEvents};
use watchcat_common::traits::repository_traits::GuildRepository;
use watchcat_core::adapters::{DiffKey, PollOutcome, UserStatus};
use watchcat_core::test_utils::{stream, ScriptedSource};

#[tokio::test]
async fn test_poll_emits_started_then_stopped_and_persists() {
    let h = Harness::new();
    let source = Arc::new(ScriptedSource::bulk("net"));
    let adapter = h.adapter(&source);
    let events = RecordingEvents::default();

    source.set_live(vec![stream("net", "1", "foo"), stream("net", "2", "bar")]);
    let outcome = adapter.poll_once(&events).await.unwrap();
    assert_eq!(outcome, PollOutcome::Updated { started: 2, stopped: 0, live: 2 });
    assert_eq!(
        events.take(),
        vec![
            Recorded::Started("foo".into()),
            Recorded::Started("bar".into()),
            Recorded::Updated(2)
        ]
    );

    source.set_live(vec![stream("net", "2", "bar")]);
    adapter.poll_once(&events).await.unwrap();
    assert_eq!(events.take(), vec![Recorded::Stopped("foo".into()), Recorded::Updated(1)]);

    let stored = h.snapshots.stored("net").unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].username, "bar");
}

#[tokio::test]
async fn test_resume_does_not_reannounce_known_streams() {
    let h = Harness::new();
    h.snapshots.seed("net", vec![stream("net", "1", "foo")]);
    let source = Arc::new(ScriptedSource::bulk("net"));
    source.set_live(vec![stream("net", "1", "foo")]);
    let adapter = h.adapter(&source);
    let events = RecordingEvents::default();

    assert_eq!(adapter.resume().await.unwrap(), 1);
    assert!(adapter.cached_stream("FOO").is_some());

    adapter.poll_once(&events).await.unwrap();
    assert_eq!(events.take(), vec![Recorded::Updated(1)]);
}

#[tokio::test]
async fn test_fetch_failure_keeps_snapshot_and_emits_nothing() {
    let h = Harness::new();
    let source = Arc::new(ScriptedSource::bulk("net"));
    let adapter = h.adapter(&source);
    let events = RecordingEvents::default();

    source.set_live(vec![stream("net", "1", "foo")]);
    adapter.poll_once(&events).await.unwrap();
    events.take();
    let saves = h.snapshots.save_count();

    source.fail_next(1);
    source.set_live(vec![]);
    assert_eq!(adapter.poll_once(&events).await.unwrap(), PollOutcome::FetchFailed);
    assert!(events.take().is_empty());
    assert_eq!(adapter.live().len(), 1);
    assert_eq!(h.snapshots.save_count(), saves);
}

#[tokio::test]
async fn test_changed_id_stops_before_starting() {
    let h = Harness::new();
    let source = Arc::new(ScriptedSource::bulk("net"));
    let adapter = h.adapter(&source);
    let events = RecordingEvents::default();

    source.set_live(vec![stream("net", "1", "foo")]);
    adapter.poll_once(&events).await.unwrap();
    events.take();

    source.set_live(vec![stream("net", "9", "foo")]);
    adapter.poll_once(&events).await.unwrap();
    assert_eq!(
        events.take(),
        vec![
            Recorded::Stopped("foo".into()),
            Recorded::Started("foo".into()),
            Recorded::Updated(1)
        ]
    );
}

#[tokio::test]
async fn test_username_keyed_source_ignores_id_changes() {
    let h = Harness::new();
    let source = Arc::new(ScriptedSource::bulk("net").with_diff_key(DiffKey::Username));
    let adapter = h.adapter(&source);
    let events = RecordingEvents::default();

    source.set_live(vec![stream("net", "1", "Foo")]);
    adapter.poll_once(&events).await.unwrap();
    events.take();

    source.set_live(vec![stream("net", "2", "foo")]);
    adapter.poll_once(&events).await.unwrap();
    assert_eq!(events.take(), vec![Recorded::Updated(1)]);
}

#[tokio::test]
async fn test_scoped_source_skips_without_watchers_and_passes_watch_list() {
    let h = Harness::new();
    let source = Arc::new(ScriptedSource::scoped("net"));
    let adapter = h.adapter(&source);
    let events = RecordingEvents::default();

    assert_eq!(adapter.poll_once(&events).await.unwrap(), PollOutcome::Idle);
    assert!(source.fetch_calls().is_empty());
    assert!(events.take().is_empty());

    h.guilds.watch("g1", "net", "Foo").await.unwrap();
    h.guilds.watch("g2", "net", "bar").await.unwrap();
    h.guilds.watch("g2", "net", "foo").await.unwrap();
    adapter.poll_once(&events).await.unwrap();

    assert_eq!(source.fetch_calls(), vec![vec!["bar".to_string(), "foo".to_string()]]);
}

#[tokio::test]
async fn test_per_user_source_tracks_status_transitions() {
    let h = Harness::new();
    let source = Arc::new(ScriptedSource::per_user("net"));
    let adapter = h.adapter(&source);
    let events = RecordingEvents::default();

    h.guilds.watch("g1", "net", "alice").await.unwrap();
    h.guilds.watch("g1", "net", "ghost").await.unwrap();
    h.guilds.watch("g1", "net", "weird").await.unwrap();
    source.set_status("alice", UserStatus::Online(stream("net", "alice", "alice")));
    source.set_status("ghost", UserStatus::Unknown);
    source.set_status("weird", UserStatus::Unrecognized("2".into()));

    adapter.poll_once(&events).await.unwrap();
    assert_eq!(events.take(), vec![Recorded::Started("alice".into()), Recorded::Updated(1)]);

    // Still online: no new event.
    adapter.poll_once(&events).await.unwrap();
    assert_eq!(events.take(), vec![Recorded::Updated(1)]);

    source.set_status("alice", UserStatus::Offline);
    adapter.poll_once(&events).await.unwrap();
    assert_eq!(events.take(), vec![Recorded::Stopped("alice".into()), Recorded::Updated(0)]);
}

#[tokio::test]
async fn test_per_user_check_failure_leaves_user_untouched() {
    let h = Harness::new();
    let source = Arc::new(ScriptedSource::per_user("net"));
    let adapter = h.adapter(&source);
    let events = RecordingEvents::default();

    h.guilds.watch("g1", "net", "alice").await.unwrap();
    source.set_status("alice", UserStatus::Online(stream("net", "alice", "alice")));
    adapter.poll_once(&events).await.unwrap();
    events.take();

    source.fail_next(1);
    source.set_status("alice", UserStatus::Offline);
    adapter.poll_once(&events).await.unwrap();
    assert_eq!(events.take(), vec![Recorded::Updated(1)]);
    assert!(adapter.cached_stream("alice").is_some());
}

#[tokio::test]
async fn test_per_user_source_drops_unwatched_users() {
    let h = Harness::new();
    let source = Arc::new(ScriptedSource::per_user("net"));
    let adapter = h.adapter(&source);
    let events = RecordingEvents::default();

    h.guilds.watch("g1", "net", "alice").await.unwrap();
    h.guilds.watch("g1", "net", "bob").await.unwrap();
    source.set_status("alice", UserStatus::Online(stream("net", "alice", "alice")));
    adapter.poll_once(&events).await.unwrap();
    events.take();

    h.guilds.unwatch("g1", "net", "alice").await.unwrap();
    adapter.poll_once(&events).await.unwrap();
    assert_eq!(events.take(), vec![Recorded::Stopped("alice".into()), Recorded::Updated(0)]);
    assert_eq!(source.checked_users().last().map(String::as_str), Some("bob"));
}

#[tokio::test]
async fn test_spawned_loop_polls_immediately_and_can_be_aborted() {
    let h = Harness::new();
    let source = Arc::new(ScriptedSource::bulk("net"));
    source.set_live(vec![stream("net", "1", "foo")]);
    let adapter = Arc::new(h.adapter(&source));
    let events = Arc::new(RecordingEvents::default());

    let handle = adapter.activate(events.clone()).await;
    let polled = common::eventually(|| !source.fetch_calls().is_empty()).await;
    handle.abort();

    assert!(polled);
    assert!(adapter.cached_stream("foo").is_some());
}

#[tokio::test]
async fn test_last_watcher_leaving_stops_cached_streams() {
    let h = Harness::new();
    let source = Arc::new(ScriptedSource::scoped("net"));
    let adapter = h.adapter(&source);
    let events = RecordingEvents::default();

    h.guilds.watch("g1", "net", "foo").await.unwrap();
    source.set_live(vec![stream("net", "1", "foo")]);
    adapter.poll_once(&events).await.unwrap();
    events.take();

    h.guilds.unwatch("g1", "net", "foo").await.unwrap();
    adapter.poll_once(&events).await.unwrap();
    assert_eq!(events.take(), vec![Recorded::Stopped("foo".into()), Recorded::Updated(0)]);
    assert_eq!(source.fetch_calls().len(), 1);

    assert_eq!(adapter.poll_once(&events).await.unwrap(), PollOutcome::Idle);
}
