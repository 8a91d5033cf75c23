//! Unit tests for the state store.

use rstest::{fixture, rstest};
use tempfile::TempDir;

use super::*;

struct Store {
    _temp: TempDir,
    root: Utf8PathBuf,
    store: StateStore,
}

impl Store {
    fn record(&self, name: &str, body: &str) {
        let paths = DevicePaths::new(&self.root, "ios0");
        paths.prepare().expect("prepare");
        fs::write(paths.state_file(name), body).expect("write state");
    }

    fn record_disabled(&self, name: &str, body: &str) {
        let paths = DevicePaths::new(&self.root, "ios0");
        paths.prepare().expect("prepare");
        fs::write(paths.disabled_state_file(name), body).expect("write state");
    }
}

#[fixture]
fn store() -> Store {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).expect("utf-8 path");
    let store = StateStore::new(DevicePaths::new(&root, "ios0"), "ios0");
    Store {
        _temp: temp,
        root,
        store,
    }
}

#[rstest]
fn empty_store_lists_nothing(store: Store) {
    assert!(store.store.list().expect("list").is_empty());
    assert_eq!(
        store.store.render_listing().expect("render"),
        "No states recorded"
    );
}

#[rstest]
fn listing_marks_disabled_states(store: Store) {
    store.record("beta", "b");
    store.record("alpha", "a");
    store.record_disabled("gamma", "g");

    assert_eq!(
        store.store.render_listing().expect("render"),
        "alpha\nbeta\ngamma (disabled)"
    );
}

#[rstest]
fn listing_ignores_unrelated_files(store: Store) {
    store.record("alpha", "a");
    let states_dir = DevicePaths::new(&store.root, "ios0").states_dir().to_owned();
    fs::write(states_dir.join("notes.txt"), "x").expect("write stray file");

    let names: Vec<String> = store
        .store
        .list()
        .expect("list")
        .into_iter()
        .map(|entry| entry.name)
        .collect();

    assert_eq!(names, vec!["alpha".to_owned()]);
}

#[rstest]
fn view_reads_enabled_and_disabled_states(store: Store) {
    store.record("alpha", "interface Gi0/1\n");
    store.record_disabled("beta", "hostname r1\n");

    assert_eq!(store.store.view("alpha").expect("view"), "interface Gi0/1\n");
    assert_eq!(store.store.view("beta").expect("view"), "hostname r1\n");
}

#[rstest]
fn missing_state_is_reported(store: Store) {
    let error = store.store.view("ghost").expect_err("missing state");
    assert!(matches!(
        error,
        ActionError::StateNotFound { ref state, .. } if state == "ghost"
    ));
}

#[rstest]
fn disable_and_enable_round_trip(store: Store) {
    store.record("alpha", "a");

    assert!(store.store.disable("alpha").expect("disable"));
    assert!(!store.store.disable("alpha").expect("disable again"));
    assert_eq!(
        store.store.list().expect("list"),
        vec![StateEntry {
            name: "alpha".into(),
            disabled: true
        }]
    );

    assert!(store.store.enable("alpha").expect("enable"));
    assert!(!store.store.enable("alpha").expect("enable again"));
    assert_eq!(store.store.view("alpha").expect("view"), "a");
}

#[rstest]
fn delete_removes_the_state(store: Store) {
    store.record_disabled("alpha", "a");

    store.store.delete("alpha").expect("delete");

    assert!(store.store.list().expect("list").is_empty());
    assert!(matches!(
        store.store.delete("alpha"),
        Err(ActionError::StateNotFound { .. })
    ));
}

#[rstest]
fn path_like_names_are_rejected(store: Store) {
    let error = store.store.view("../devices").expect_err("invalid name");
    assert!(matches!(error, ActionError::InvalidParameter { .. }));
}

#[rstest]
fn import_copies_a_single_file(store: Store) {
    let source = store.root.join("base.state.cfg");
    fs::write(&source, "config").expect("write source");

    let imported = store.store.import(&source, false).expect("import");

    assert_eq!(imported, vec!["base".to_owned()]);
    assert_eq!(store.store.view("base").expect("view"), "config");
}

#[rstest]
fn import_copies_every_file_in_a_directory(store: Store) {
    let source = store.root.join("incoming");
    fs::create_dir(&source).expect("create source dir");
    fs::write(source.join("b.cfg"), "b").expect("write b");
    fs::write(source.join("a.state.cfg"), "a").expect("write a");
    fs::create_dir(source.join("nested")).expect("create nested dir");

    let imported = store.store.import(&source, false).expect("import");

    assert_eq!(imported, vec!["a".to_owned(), "b".to_owned()]);
}

#[rstest]
#[case(false)]
#[case(true)]
fn import_respects_overwrite(store: Store, #[case] overwrite: bool) {
    store.record_disabled("base", "old");
    let source = store.root.join("base.cfg");
    fs::write(&source, "new").expect("write source");

    let outcome = store.store.import(&source, overwrite);

    if overwrite {
        outcome.expect("import with overwrite");
        assert_eq!(
            store.store.list().expect("list"),
            vec![StateEntry {
                name: "base".into(),
                disabled: false
            }]
        );
        assert_eq!(store.store.view("base").expect("view"), "new");
    } else {
        assert!(matches!(outcome, Err(ActionError::StateExists { .. })));
        assert_eq!(store.store.view("base").expect("view"), "old");
    }
}

#[rstest]
#[case(false)]
#[case(true)]
fn import_refuses_files_sharing_a_state_name(store: Store, #[case] overwrite: bool) {
    let source = store.root.join("incoming");
    fs::create_dir(&source).expect("create source dir");
    fs::write(source.join("a.state.cfg"), "first").expect("write a.state.cfg");
    fs::write(source.join("a.cfg"), "second").expect("write a.cfg");

    let error = store
        .store
        .import(&source, overwrite)
        .expect_err("clashing names");

    assert!(matches!(
        error,
        ActionError::StateExists { ref device, ref state } if device == "ios0" && state == "a"
    ));
    assert!(store.store.list().expect("list").is_empty());
}

#[rstest]
fn import_of_missing_source_is_a_storage_error(store: Store) {
    let error = store
        .store
        .import(&store.root.join("absent.cfg"), false)
        .expect_err("missing source");
    assert!(matches!(error, ActionError::Storage { .. }));
}

#[rstest]
fn provider_reads_the_same_store(store: Store) {
    store.record("alpha", "a");
    let provider = StoreStatesProvider::new(store.root.clone());

    let states = provider.recorded_states("ios0").expect("states");

    assert_eq!(
        states,
        vec![StateEntry {
            name: "alpha".into(),
            disabled: false
        }]
    );
    assert!(provider.recorded_states("ios1").expect("states").is_empty());
}
