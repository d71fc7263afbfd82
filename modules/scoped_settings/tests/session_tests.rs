//! Integration tests for settings sessions over the in-memory backend

mod common;

use common::{app_identity, key, print_test_header, subsystem_identity, MemoryFixture};
use scoped_settings::{
    BackendRegistry, BaseScope, ComponentScope, FallbackPolicy, Format, SessionOptions,
    SettingsError, SettingsSession,
};
use std::collections::BTreeMap;

use BaseScope::{System, User};
use ComponentScope::{Application, Organization, Subsystem};

#[tokio::test]
async fn test_user_write_shadows_system_value() {
    print_test_header(
        "test_user_write_shadows_system_value",
        &[
            "A user session reads a system value, overrides it, and the system",
            "value stays untouched",
        ],
    );
    let fixture = MemoryFixture::new();
    fixture.seed(System, Application, "db/server", "host1");

    let mut session = fixture.open_app_session();
    {
        let mut db = session.ingroup("db").expect("enter group");
        println!("   Stage 1: read through fallback");
        assert_eq!(db.value("server").await.unwrap().as_deref(), Some("host1"));

        println!("   Stage 2: write to primary");
        db.set_value("server", "host2").await.unwrap();
        assert_eq!(db.value("server").await.unwrap().as_deref(), Some("host2"));
    }
    session.close().await.unwrap();

    println!("   Stage 3: verify stored values per scope");
    assert_eq!(
        fixture.stored(User, Application, "db/server").as_deref(),
        Some("host2")
    );
    assert_eq!(
        fixture.stored(System, Application, "db/server").as_deref(),
        Some("host1")
    );
    assert_eq!(fixture.stored(User, Organization, "db/server"), None);
    println!("✅ User value shadows system value");
}

#[tokio::test]
async fn test_search_order_locations() {
    print_test_header(
        "test_search_order_locations",
        &["Locations are listed in search order with the primary first"],
    );
    let fixture = MemoryFixture::new();
    let session = fixture.session(app_identity(Format::InMemory));

    let expected = vec![
        fixture.location(User, Application),
        fixture.location(User, Organization),
        fixture.location(System, Application),
        fixture.location(System, Organization),
    ];
    assert_eq!(session.locations(), expected.as_slice());
    assert_eq!(session.primary_location(), &expected[0]);
    assert!(session.scopes()[0].is_primary);
    assert!(session.scopes()[1..].iter().all(|scope| !scope.is_primary));
}

#[tokio::test]
async fn test_more_specific_scope_wins() {
    let fixture = MemoryFixture::new();
    fixture.seed(System, Organization, "color", "system-org");
    fixture.seed(System, Application, "color", "system-app");
    fixture.seed(User, Organization, "color", "user-org");

    let mut session = fixture.open_app_session();
    assert_eq!(session.value("color").await.unwrap().as_deref(), Some("user-org"));

    fixture.seed(User, Application, "color", "user-app");
    assert_eq!(session.value("color").await.unwrap().as_deref(), Some("user-app"));
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_nested_groups_match_combined_path() {
    print_test_header(
        "test_nested_groups_match_combined_path",
        &["ingroup(\"a\") then ingroup(\"b\") addresses the same key as ingroup(\"a/b\")"],
    );
    let fixture = MemoryFixture::new();
    fixture.seed(User, Application, "a/b/c", "deep");
    let mut session = fixture.open_app_session();

    let combined = {
        let mut group = session.ingroup("a/b").unwrap();
        assert_eq!(group.group().to_string(), "a/b");
        group.value("c").await.unwrap()
    };
    let nested = {
        let mut outer = session.ingroup("a").unwrap();
        let mut inner = outer.ingroup("b").unwrap();
        inner.value("c").await.unwrap()
    };

    assert_eq!(combined.as_deref(), Some("deep"));
    assert_eq!(combined, nested);
    assert!(session.group().is_root());
    assert_eq!(session.value("a/b/c").await.unwrap().as_deref(), Some("deep"));
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_pop_on_empty_stack() {
    let fixture = MemoryFixture::new();
    let mut session = fixture.open_app_session();

    let result = session.pop_group();
    assert!(matches!(result, Err(SettingsError::EmptyStack)));
    assert_eq!(session.group().depth(), 0);

    session.push_group("db").unwrap();
    session.push_group("conn").unwrap();
    assert_eq!(session.pop_group().unwrap(), "conn");
    assert_eq!(session.group().to_string(), "db");
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_group_guard_undoes_push_and_pop() {
    print_test_header(
        "test_group_guard_undoes_push_and_pop",
        &["Pushes and pops made inside ingroup are undone when it ends"],
    );
    let fixture = MemoryFixture::new();
    let mut session = fixture.open_app_session();
    session.push_group("outer").unwrap();

    println!("   Stage 1: pop inside the guard");
    {
        let mut group = session.ingroup("a").unwrap();
        group.pop_group().unwrap();
        group.pop_group().unwrap();
        assert!(group.group().is_root());
    }
    assert_eq!(session.group().to_string(), "outer");

    println!("   Stage 2: push inside the guard");
    {
        let mut group = session.ingroup("b").unwrap();
        group.push_group("c").unwrap();
        group.set_value("key", "value").await.unwrap();
    }
    assert_eq!(session.group().to_string(), "outer");
    assert_eq!(
        session.value("b/c/key").await.unwrap().as_deref(),
        Some("value")
    );
    session.close().await.unwrap();
}

async fn read_required_port(session: &mut SettingsSession) -> Result<i64, SettingsError> {
    let mut db = session.ingroup("db")?;
    let port = db.required::<i64>("port").await?;
    Ok(port)
}

#[tokio::test]
async fn test_group_restored_after_error() {
    print_test_header(
        "test_group_restored_after_error",
        &["Leaving a group through an error still restores the previous group"],
    );
    let fixture = MemoryFixture::new();
    let mut session = fixture.open_app_session();
    session.push_group("outer").unwrap();

    let result = read_required_port(&mut session).await;
    assert!(matches!(
        result,
        Err(SettingsError::RequiredSettingMissing { .. })
    ));
    assert_eq!(session.group().to_string(), "outer");
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_required_missing_lists_locations() {
    let fixture = MemoryFixture::new();
    let mut session = fixture.open_app_session();

    match session.required_value("db/server").await {
        Err(SettingsError::RequiredSettingMissing {
            key,
            value_type,
            locations,
        }) => {
            assert_eq!(key, "db/server");
            assert_eq!(value_type, "string");
            assert_eq!(locations.len(), 4);
            assert_eq!(&locations[0], session.primary_location());
        }
        other => panic!("expected RequiredSettingMissing, got {:?}", other),
    }
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_absent_differs_from_empty() {
    let fixture = MemoryFixture::new();
    let mut session = fixture.open_app_session();

    session.set_value("blank", "").await.unwrap();

    assert_eq!(session.value("blank").await.unwrap().as_deref(), Some(""));
    assert_eq!(session.value("missing").await.unwrap(), None);
    assert!(session.contains("blank").await.unwrap());
    assert!(!session.contains("missing").await.unwrap());
    assert_eq!(session.value_or("blank", "fallback").await.unwrap(), "");
    assert_eq!(session.value_or("missing", "fallback").await.unwrap(), "fallback");
    assert_eq!(session.required_value("blank").await.unwrap(), "");
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_typed_reads() {
    print_test_header(
        "test_typed_reads",
        &["Integer, float, boolean and list reads coerce stored text"],
    );
    let fixture = MemoryFixture::new();
    fixture.seed(System, Organization, "db/port", "5432");
    fixture.seed(System, Organization, "db/ratio", "0.25");
    fixture.seed(System, Organization, "db/verbose", "yes");
    fixture.seed(System, Organization, "db/hosts", "[a, b ,c]");
    fixture.seed(System, Organization, "db/none", "");

    let mut session = fixture.open_app_session();
    let mut db = session.ingroup("db").unwrap();

    assert_eq!(db.int_value("port").await.unwrap(), Some(5432));
    assert_eq!(db.float_value("ratio").await.unwrap(), Some(0.25));
    assert_eq!(db.bool_value("verbose").await.unwrap(), Some(true));
    assert_eq!(
        db.list_value("hosts").await.unwrap(),
        Some(vec!["a".to_string(), "b".to_string(), "c".to_string()])
    );
    assert_eq!(db.list_value("none").await.unwrap(), Some(Vec::new()));
    assert_eq!(db.int_value("absent").await.unwrap(), None);
    assert_eq!(db.required::<i64>("port").await.unwrap(), 5432);
    drop(db);
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_type_coercion_failure() {
    let fixture = MemoryFixture::new();
    let mut session = fixture.open_app_session();
    session.set_value("port", "eighty").await.unwrap();
    session.set_value("flag", "maybe").await.unwrap();

    match session.int_value("port").await {
        Err(SettingsError::TypeCoercion {
            key,
            value,
            value_type,
            ..
        }) => {
            assert_eq!(key, "port");
            assert_eq!(value, "eighty");
            assert_eq!(value_type, "integer");
        }
        other => panic!("expected TypeCoercion, got {:?}", other),
    }
    assert!(matches!(
        session.bool_value("flag").await,
        Err(SettingsError::TypeCoercion { .. })
    ));
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_list_separator_option() {
    let fixture = MemoryFixture::new();
    fixture.seed(User, Application, "paths", "/usr/lib;/opt/lib");
    let options = SessionOptions {
        list_separator: ';',
        ..SessionOptions::default()
    };
    let mut session = fixture.session_with(app_identity(Format::InMemory), options);
    session.open().unwrap();

    assert_eq!(
        session.list_value("paths").await.unwrap(),
        Some(vec!["/usr/lib".to_string(), "/opt/lib".to_string()])
    );
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_invalid_keys_rejected() {
    let fixture = MemoryFixture::new();
    let mut session = fixture.open_app_session();

    for bad in ["", "a//b", "/a", "a/"] {
        let result = session.value(bad).await;
        assert!(
            matches!(result, Err(SettingsError::InvalidKey { .. })),
            "key {:?} should be rejected",
            bad
        );
    }
    assert!(matches!(
        session.push_group(""),
        Err(SettingsError::InvalidKey { .. })
    ));
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_closed_session_rejects_operations() {
    print_test_header(
        "test_closed_session_rejects_operations",
        &["Reads, writes and group changes require an open session"],
    );
    let fixture = MemoryFixture::new();
    let mut session = fixture.session(app_identity(Format::InMemory));

    assert!(!session.is_open());
    assert!(matches!(
        session.value("a").await,
        Err(SettingsError::SessionClosed)
    ));
    assert!(matches!(
        session.set_value("a", "1").await,
        Err(SettingsError::SessionClosed)
    ));
    assert!(matches!(
        session.ingroup("db").map(|_| ()),
        Err(SettingsError::SessionClosed)
    ));
    assert!(matches!(
        session.all_keys().await,
        Err(SettingsError::SessionClosed)
    ));
    assert!(matches!(
        session.close().await,
        Err(SettingsError::SessionClosed)
    ));
}

#[tokio::test]
async fn test_reopen_after_close() {
    let fixture = MemoryFixture::new();
    let mut session = fixture.open_app_session();
    session.push_group("db").unwrap();
    session.set_value("server", "host").await.unwrap();
    session.close().await.unwrap();

    session.open().unwrap();
    session.open().unwrap();
    assert!(session.is_open());
    assert!(session.group().is_root());
    assert_eq!(
        session.value("db/server").await.unwrap().as_deref(),
        Some("host")
    );
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_unavailable_fallback_is_skipped() {
    print_test_header(
        "test_unavailable_fallback_is_skipped",
        &[
            "Reads skip locations that cannot be opened",
            "Writes to an unavailable primary location fail",
        ],
    );
    let fixture = MemoryFixture::new();
    fixture.seed(User, Organization, "theme", "user-org");
    fixture.seed(System, Organization, "theme", "system-org");

    println!("   Stage 1: fallback location revoked");
    fixture
        .backend
        .revoke_access(&fixture.location(User, Organization));
    let mut session = fixture.open_app_session();
    assert_eq!(
        session.value("theme").await.unwrap().as_deref(),
        Some("system-org")
    );

    println!("   Stage 2: access restored, not cached as unavailable");
    fixture
        .backend
        .restore_access(&fixture.location(User, Organization));
    assert_eq!(
        session.value("theme").await.unwrap().as_deref(),
        Some("user-org")
    );
    session.close().await.unwrap();

    println!("   Stage 3: primary location revoked");
    fixture
        .backend
        .revoke_access(&fixture.location(User, Application));
    let mut session = fixture.open_app_session();
    assert_eq!(
        session.value("theme").await.unwrap().as_deref(),
        Some("user-org")
    );
    assert!(matches!(
        session.set_value("theme", "mine").await,
        Err(SettingsError::LocationUnavailable { .. })
    ));
    session.close().await.unwrap();
    println!("✅ Unavailable locations handled");
}

#[tokio::test]
async fn test_with_open_closes_on_every_path() {
    let fixture = MemoryFixture::new();
    let mut session = fixture.session(app_identity(Format::InMemory));

    let server = session
        .with_open(|s| {
            Box::pin(async move {
                s.set_value("db/server", "host").await?;
                let server = s.required_value("db/server").await?;
                Ok::<_, SettingsError>(server)
            })
        })
        .await
        .unwrap();
    assert_eq!(server, "host");
    assert!(!session.is_open());

    let result = session
        .with_open(|s| {
            Box::pin(async move {
                s.push_group("db")?;
                let port = s.required::<i64>("port").await?;
                Ok::<_, SettingsError>(port)
            })
        })
        .await;
    assert!(matches!(
        result,
        Err(SettingsError::RequiredSettingMissing { .. })
    ));
    assert!(!session.is_open());
    assert!(session.group().is_root());
}

#[tokio::test]
async fn test_defaults_consulted_last() {
    let fixture = MemoryFixture::new();
    fixture.seed(System, Organization, "db/server", "system-host");
    let mut defaults = BTreeMap::new();
    defaults.insert(key("db/server"), "default-host".to_string());
    defaults.insert(key("db/port"), "5432".to_string());
    let options = SessionOptions {
        defaults,
        ..SessionOptions::default()
    };

    let mut session = fixture.session_with(app_identity(Format::InMemory), options);
    session.open().unwrap();

    assert_eq!(
        session.value("db/server").await.unwrap().as_deref(),
        Some("system-host")
    );
    assert_eq!(session.int_value("db/port").await.unwrap(), Some(5432));
    assert!(session.contains("db/port").await.unwrap());
    session.close().await.unwrap();

    assert_eq!(fixture.stored(User, Application, "db/port"), None);
}

#[tokio::test]
async fn test_remove_exposes_fallback() {
    print_test_header(
        "test_remove_exposes_fallback",
        &["Removing a key and its subtree from the primary lets fallback values show"],
    );
    let fixture = MemoryFixture::new();
    fixture.seed(System, Application, "db/server", "system-host");
    let mut session = fixture.open_app_session();

    session.set_value("db/server", "user-host").await.unwrap();
    session.set_value("db/conn/timeout", "30").await.unwrap();
    session.set_value("db", "flat-value").await.unwrap();
    session.set_value("cache/size", "10").await.unwrap();

    session.remove("db").await.unwrap();

    assert_eq!(
        session.value("db/server").await.unwrap().as_deref(),
        Some("system-host")
    );
    assert_eq!(session.value("db/conn/timeout").await.unwrap(), None);
    assert_eq!(session.value("db").await.unwrap(), None);
    assert_eq!(session.value("cache/size").await.unwrap().as_deref(), Some("10"));
    session.close().await.unwrap();

    assert_eq!(
        fixture.stored(System, Application, "db/server").as_deref(),
        Some("system-host")
    );
}

#[tokio::test]
async fn test_remove_group_clears_current_group() {
    let fixture = MemoryFixture::new();
    fixture.seed(System, Organization, "db/server", "system-host");
    let mut session = fixture.open_app_session();
    session.set_value("db/server", "user-host").await.unwrap();
    session.set_value("db/conn/timeout", "30").await.unwrap();
    session.set_value("name", "n").await.unwrap();

    {
        let mut db = session.ingroup("db").unwrap();
        db.remove_group().await.unwrap();
        assert_eq!(db.all_keys().await.unwrap(), vec!["server"]);
        assert_eq!(
            db.value("server").await.unwrap().as_deref(),
            Some("system-host")
        );
    }
    assert_eq!(session.value("name").await.unwrap().as_deref(), Some("n"));
    session.close().await.unwrap();

    assert_eq!(fixture.stored(User, Application, "db/server"), None);
    assert_eq!(fixture.stored(User, Application, "db/conn/timeout"), None);
}

#[tokio::test]
async fn test_clear_only_touches_primary() {
    let fixture = MemoryFixture::new();
    fixture.seed(User, Application, "a", "1");
    fixture.seed(User, Application, "g/b", "2");
    fixture.seed(User, Organization, "a", "org");

    let mut session = fixture.open_app_session();
    session.clear().await.unwrap();
    session.close().await.unwrap();

    assert_eq!(
        fixture
            .backend
            .len(&fixture.location(User, Application)),
        0
    );
    assert_eq!(fixture.stored(User, Organization, "a").as_deref(), Some("org"));
}

#[tokio::test]
async fn test_introspection_merges_locations() {
    print_test_header(
        "test_introspection_merges_locations",
        &["Key and group listings combine every location and the defaults"],
    );
    let fixture = MemoryFixture::new();
    fixture.seed(User, Application, "db/server", "u");
    fixture.seed(System, Organization, "db/port", "5432");
    fixture.seed(System, Organization, "db/conn/timeout", "30");
    fixture.seed(User, Organization, "name", "n");
    let mut defaults = BTreeMap::new();
    defaults.insert(key("cache/size"), "10".to_string());
    let options = SessionOptions {
        defaults,
        ..SessionOptions::default()
    };

    let mut session = fixture.session_with(app_identity(Format::InMemory), options);
    session.open().unwrap();

    assert_eq!(
        session.all_keys().await.unwrap(),
        vec!["cache/size", "db/conn/timeout", "db/port", "db/server", "name"]
    );
    assert_eq!(session.child_keys().await.unwrap(), vec!["name"]);
    assert_eq!(session.child_groups().await.unwrap(), vec!["cache", "db"]);
    assert_eq!(
        session.all_groups().await.unwrap(),
        vec!["cache", "db", "db/conn"]
    );

    let mut db = session.ingroup("db").unwrap();
    assert_eq!(
        db.all_keys().await.unwrap(),
        vec!["conn/timeout", "port", "server"]
    );
    assert_eq!(db.child_keys().await.unwrap(), vec!["port", "server"]);
    assert_eq!(db.child_groups().await.unwrap(), vec!["conn"]);
    drop(db);
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_component_fallback_disabled() {
    let fixture = MemoryFixture::new();
    fixture.seed(User, Application, "level", "application");
    fixture.seed(User, Organization, "level", "organization");

    let mut policy = FallbackPolicy::default();
    policy
        .set_component_fallback(Subsystem, Application, false)
        .unwrap();
    policy.base_scope_fallback = false;
    let options = SessionOptions {
        policy,
        ..SessionOptions::default()
    };

    let mut session = fixture.session_with(subsystem_identity(Format::InMemory), options);
    assert_eq!(session.locations().len(), 2);
    session.open().unwrap();
    assert_eq!(
        session.value("level").await.unwrap().as_deref(),
        Some("organization")
    );
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_system_identity_has_no_user_fallback() {
    let fixture = MemoryFixture::new();
    fixture.seed(User, Organization, "only_user", "x");
    let identity = scoped_settings::Identity::new(
        Format::InMemory,
        System,
        common::ORGANIZATION,
        Some(common::APPLICATION),
        None,
    )
    .unwrap();

    let mut session = fixture.session(identity);
    assert_eq!(session.locations().len(), 2);
    session.open().unwrap();
    assert_eq!(session.value("only_user").await.unwrap(), None);
    session.set_value("written", "y").await.unwrap();
    session.close().await.unwrap();

    assert_eq!(fixture.stored(System, Application, "written").as_deref(), Some("y"));
}

#[tokio::test]
async fn test_unregistered_format() {
    let registry = BackendRegistry::new();
    let result = SettingsSession::new(
        app_identity(Format::Yaml),
        &registry,
        SessionOptions::default(),
    );
    assert!(matches!(
        result,
        Err(SettingsError::UnregisteredFormat(Format::Yaml))
    ));
}

#[tokio::test]
async fn test_invalid_identity() {
    let no_org = scoped_settings::Identity::user(Format::InMemory, "", "app");
    assert!(matches!(no_org, Err(SettingsError::InvalidIdentity { .. })));

    let orphan_subsystem = scoped_settings::Identity::new(
        Format::InMemory,
        User,
        "org",
        None,
        Some("sub"),
    );
    assert!(matches!(
        orphan_subsystem,
        Err(SettingsError::InvalidIdentity { .. })
    ));
}
