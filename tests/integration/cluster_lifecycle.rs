use corvid::codec::{ResultSet, WireValue};
use corvid::config::ClientConfig;
use corvid::context::{self, Context};
use corvid::exec::{self, ExecuteOptions};
use corvid::session::memory::MemoryClusterFactory;
use corvid::session::{ClusterFactory, ClusterOptions, Session};
use corvid::{Consistency, DriverErrorKind, Error, Result};
use parking_lot::Mutex;
use serde::Deserialize;
use std::fs;
use tempfile::tempdir;

static GLOBAL_SLOTS: Mutex<()> = Mutex::new(());

#[derive(Debug, Deserialize, PartialEq)]
struct User {
    userid: i32,
    display_name: String,
}

fn users_factory(seen: std::sync::Arc<Mutex<Vec<Consistency>>>) -> MemoryClusterFactory {
    MemoryClusterFactory::with_handler(move |statement| {
        seen.lock().push(statement.consistency());
        Ok(ResultSet::new(
            vec!["UserId", "Display Name"],
            vec![
                vec![WireValue::Int(1), WireValue::Text("Ada".into())],
                vec![WireValue::Int(2), WireValue::Text("Grace".into())],
            ],
        ))
    })
}

#[test]
fn cluster_connect_execute_shutdown() -> Result<()> {
    let seen = std::sync::Arc::new(Mutex::new(Vec::new()));
    let factory = users_factory(seen.clone());
    let options = ClusterOptions::new(["127.0.0.1", "127.0.0.2"]);
    let cluster = exec::cluster(&factory, &options)?;
    let session = exec::connect(cluster.as_ref(), Some("accounts"))?;
    assert_eq!(session.keyspace().as_deref(), Some("accounts"));

    let users: Vec<User> = Context::new()
        .with_session(session.clone())
        .execute("SELECT * FROM users", ExecuteOptions::new())?
        .iter()
        .map(|record| record.decode())
        .collect::<Result<_>>()?;
    assert_eq!(
        users,
        vec![
            User { userid: 1, display_name: "Ada".into() },
            User { userid: 2, display_name: "Grace".into() },
        ]
    );

    exec::shutdown_session(session.as_ref());
    let err = Context::new()
        .with_session(session)
        .execute("SELECT * FROM users", ExecuteOptions::new())
        .unwrap_err();
    assert_eq!(err.as_driver().map(|d| &d.kind), Some(&DriverErrorKind::Connection));

    exec::shutdown_cluster(cluster.as_ref());
    assert!(exec::connect(cluster.as_ref(), None).is_err());
    Ok(())
}

#[test]
fn factory_rejects_options_without_contact_points() {
    let factory = MemoryClusterFactory::new();
    let err = exec::cluster(&factory, &ClusterOptions::default()).err();
    assert!(matches!(err, Some(Error::Driver(_))));
    assert!(factory.clusters().is_empty());
}

#[test]
fn config_file_drives_cluster_and_defaults() -> Result<()> {
    let _guard = GLOBAL_SLOTS.lock();
    let dir = tempdir().unwrap();
    let path = dir.path().join("client.toml");
    fs::write(
        &path,
        r#"
        [defaults]
        consistency = "local_quorum"

        [cluster]
        contact_points = ["10.1.0.5"]
        keyspace = "accounts"

        [cluster.options]
        datacenter = "eu-west"
        "#,
    )
    .unwrap();

    let config = ClientConfig::load(Some(path)).unwrap();
    let seen = std::sync::Arc::new(Mutex::new(Vec::new()));
    let factory = users_factory(seen.clone());
    let (cluster, session) = config.connect(&factory)?;
    assert_eq!(
        factory.clusters()[0].options().options.get("datacenter"),
        Some(&toml::Value::String("eu-west".into()))
    );

    config.apply_globals();
    let rows = context::with_session(session, || {
        exec::execute("SELECT * FROM users", ExecuteOptions::new())
    });
    context::reset_consistency();
    assert_eq!(rows?.len(), 2);
    assert_eq!(*seen.lock(), vec![Consistency::LocalQuorum]);

    exec::shutdown_cluster(cluster.as_ref());
    assert!(factory.clusters()[0].is_shut_down());
    Ok(())
}

#[test]
fn cluster_options_survive_the_factory_untouched() {
    let mut options = ClusterOptions::new(["db.internal"]);
    options.port = Some(19042);
    options
        .options
        .insert("compression".into(), toml::Value::String("lz4".into()));
    let factory = MemoryClusterFactory::new();
    factory.build(&options).unwrap();
    assert_eq!(factory.clusters()[0].options(), &options);
}
