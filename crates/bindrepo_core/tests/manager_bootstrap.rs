mod common;

use bindrepo_core::config::ConfigError;
use bindrepo_core::{
    Application, BindConfig, DbError, Manager, ManagerError, ManagerSettings, PoolPolicy,
    RepoError, Repository, RepositoryExtension, SqlRepository,
};
use common::Task;
use std::sync::Arc;
use std::time::Duration;

fn postgres_config() -> BindConfig {
    BindConfig::networked("reports", "postgres", "h", 5432, "d").with_credentials("u", "p")
}

#[test]
fn explicit_binds_register_in_order() {
    let manager = Manager::from_bind_configs(
        vec![
            BindConfig::new("zeta"),
            BindConfig::new("alpha"),
            BindConfig::new("mid"),
        ],
        false,
    )
    .unwrap();

    assert_eq!(manager.bind_names(), vec!["zeta", "alpha", "mid"]);
    assert_eq!(
        manager.binds().keys().cloned().collect::<Vec<_>>(),
        vec!["alpha", "mid", "zeta"]
    );
    let metadata = manager.metadata();
    assert!(!Arc::ptr_eq(&metadata["alpha"], &metadata["zeta"]));
}

#[test]
fn duplicate_bind_fails_and_leaves_registry_unchanged() {
    let err = Manager::from_bind_configs(
        vec![BindConfig::new("main"), BindConfig::new("other"), BindConfig::new("main")],
        false,
    )
    .unwrap_err();
    assert!(matches!(err, ManagerError::DuplicateBind(name) if name == "main"));

    let mut manager = Manager::from_bind_configs(vec![BindConfig::new("main")], false).unwrap();
    let before = Arc::clone(&manager.binds()["main"]);
    let err = manager
        .register_bind(BindConfig::networked("main", "postgres", "h", 5432, "d"))
        .unwrap_err();

    assert!(matches!(err, ManagerError::DuplicateBind(_)));
    assert_eq!(manager.bind_names(), vec!["main"]);
    assert!(Arc::ptr_eq(&manager.binds()["main"], &before));
    assert_eq!(before.url(), "sqlite:///:memory:");
}

#[test]
fn environment_groups_match_explicit_list() {
    let env = vec![
        ("DB_BINDS_1_BIND_NAME", "reports"),
        ("DB_BINDS_1_DB_TYPE", "postgres"),
        ("DB_BINDS_1_DB_HOST", "${REPORTS_HOST}"),
        ("DB_BINDS_1_DB_PORT", "5432"),
        ("DB_BINDS_1_DB_NAME", "d"),
        ("DB_BINDS_1_DB_USER", "u"),
        ("DB_BINDS_1_DB_PASSWORD", "$REPORTS_SECRET"),
        ("DB_BINDS_0_BIND_NAME", "main"),
        ("REPORTS_HOST", "h"),
        ("REPORTS_SECRET", "p"),
    ];
    let from_env = Manager::from_env_vars("DB_BINDS", env, false).unwrap();
    let explicit =
        Manager::from_bind_configs(vec![BindConfig::new("main"), postgres_config()], false)
            .unwrap();

    assert_eq!(from_env.bind_names(), explicit.bind_names());
    for name in explicit.bind_names() {
        let left = from_env.bind(&name).unwrap();
        let right = explicit.bind(&name).unwrap();
        assert_eq!(left.config(), right.config());
        assert_eq!(left.engine().url(), right.engine().url());
    }
}

#[test]
fn unresolved_references_stay_verbatim() {
    let env = vec![
        ("APP_DB_0_BIND_NAME", "main"),
        ("APP_DB_0_DB_HOST", "/var/lib/$BINDREPO_UNSET_DIR/app.db"),
    ];
    let manager = Manager::from_env_vars("APP_DB", env, false).unwrap();

    assert_eq!(
        manager.bind("main").unwrap().config().db_host,
        "/var/lib/$BINDREPO_UNSET_DIR/app.db"
    );
}

#[test]
fn invalid_environment_group_reports_its_index() {
    let missing_name = vec![("DB_BINDS_3_DB_TYPE", "sqlite")];
    let err = Manager::from_env_vars("DB_BINDS", missing_name, false).unwrap_err();
    assert!(matches!(
        err,
        ManagerError::Config {
            index: 3,
            source: ConfigError::MissingField("bind_name")
        }
    ));

    let bad_port = vec![
        ("DB_BINDS_0_BIND_NAME", "pg"),
        ("DB_BINDS_0_DB_PORT", "not-a-port"),
    ];
    let err = Manager::from_env_vars("DB_BINDS", bad_port, false).unwrap_err();
    assert!(matches!(
        err,
        ManagerError::Config {
            index: 0,
            source: ConfigError::InvalidValue { field: "db_port", .. }
        }
    ));
}

#[test]
fn empty_explicit_list_falls_back_to_process_environment() {
    std::env::set_var("BINDREPO_FALLBACK_TEST_0_BIND_NAME", "from_env");
    let settings = ManagerSettings {
        binds: Some(Vec::new()),
        env_prefix: "BINDREPO_FALLBACK_TEST".to_string(),
        debug: false,
    };

    let manager = Manager::bootstrap(&settings).unwrap();
    assert_eq!(manager.bind_names(), vec!["from_env"]);
}

#[test]
fn serde_bind_list_applies_defaults() {
    let binds: Vec<BindConfig> = serde_json::from_str(
        r#"[
            {"bind_name": "main"},
            {"bind_name": "reports", "db_type": "postgres", "db_host": "h",
             "db_port": 5432, "db_name": "d", "db_user": "u", "db_password": "p"}
        ]"#,
    )
    .unwrap();

    assert_eq!(binds[0], BindConfig::new("main"));
    assert_eq!(binds[1], postgres_config());
}

#[test]
fn unknown_bind_is_rejected() {
    let manager = Manager::from_bind_configs(vec![BindConfig::new("main")], false).unwrap();

    assert!(matches!(
        manager.create_session(Some("missing")),
        Err(DbError::UnknownBind(name)) if name == "missing"
    ));
    assert!(matches!(
        manager.register_model::<Task>("missing"),
        Err(ManagerError::UnknownBind(_))
    ));
}

#[test]
fn bound_session_uses_the_bind_engine() {
    let manager = Manager::from_bind_configs(
        vec![BindConfig::new("main"), BindConfig::new("audit")],
        false,
    )
    .unwrap();
    let session = manager.create_session(Some("audit")).unwrap();
    let binds = manager.binds();
    let engine = &binds["audit"];

    assert_eq!(session.bind_name(), Some("audit"));
    assert!(Arc::ptr_eq(session.bound_engine().unwrap(), engine));
    assert!(Arc::ptr_eq(&session.get_bind("anything").unwrap(), engine));
}

#[test]
fn routing_session_prefers_the_later_bind_on_collision() {
    let manager = Manager::from_bind_configs(
        vec![BindConfig::new("first"), BindConfig::new("second")],
        false,
    )
    .unwrap();
    manager.register_model::<Task>("first").unwrap();
    manager.register_model::<Task>("second").unwrap();

    let session = manager.create_session(None).unwrap();
    assert!(session.bound_engine().is_none());
    assert!(Arc::ptr_eq(
        &session.get_bind("tasks").unwrap(),
        &manager.binds()["second"]
    ));
    assert!(matches!(
        session.get_bind("unknown"),
        Err(DbError::UnmappedTable(_))
    ));
}

#[test]
fn networked_bind_exposes_target_and_pool_policy() {
    let manager = Manager::from_bind_configs(vec![postgres_config()], true).unwrap();
    let binds = manager.binds();
    let engine = &binds["reports"];

    assert_eq!(engine.url(), "postgres://u:p@h:5432/d");
    assert_eq!(engine.redacted_url(), "postgres://u:***@h:5432/d");
    assert!(engine.echo());
    let policy = engine.pool_policy().unwrap();
    assert_eq!(policy, PoolPolicy::NETWORKED);
    assert_eq!(policy.pool_size, 10);
    assert_eq!(policy.max_overflow, 5);
    assert_eq!(policy.recycle, Duration::from_secs(120));

    let mut session = manager.create_session(Some("reports")).unwrap();
    assert!(matches!(
        session.execute("tasks", "SELECT 1;", &[]),
        Err(DbError::UnsupportedEngine(kind)) if kind == "postgres"
    ));
}

#[test]
fn repository_requires_installed_extension() {
    let app = Application::new("bare");
    assert!(matches!(
        SqlRepository::<Task>::from_app(&app),
        Err(RepoError::NotInitialized)
    ));
}

#[test]
fn teardown_detaches_manager_but_live_repositories_keep_working() {
    let (mut app, repo) = common::task_app();
    repo.insert_one(Task::new("kept"), None).unwrap();

    let detached = app.teardown().unwrap();
    assert!(app.manager().is_err());
    assert!(matches!(
        SqlRepository::<Task>::from_app(&app),
        Err(RepoError::NotInitialized)
    ));
    assert!(Arc::ptr_eq(&detached, repo.manager()));
    assert_eq!(repo.find_one(1, false, None).unwrap().title, "kept");
}

#[test]
fn reinit_replaces_the_manager() {
    let mut app = Application::new("tests").with_binds(vec![BindConfig::new("main")]);
    let first = RepositoryExtension::init_app(&mut app).unwrap();
    let second = RepositoryExtension::init_app(&mut app).unwrap();

    assert!(!Arc::ptr_eq(&first, &second));
    assert!(Arc::ptr_eq(&app.manager().unwrap(), &second));
}
