use chrono::NaiveDate;

use ecfident::{
    engine::{
        IdentityError,
        binder::{
            bind_grading, bind_master, bindings_for, grading_code_for_person,
            master_code_for_person, person_for_alias, register_new_master, unbind_grading,
            unbind_master,
        },
        details::person_details,
        import::{EventImport, PlayerEntry, import_event},
        merge::merge,
        resolve::Resolution,
    },
    records::{GradingPlayerRecord, MasterMapRecord, MasterPlayerRecord},
    store::{RecordStoreExt, Transaction, memory::MemoryStore},
    types::{Origin, Recno},
};

fn setup(names: &[&str]) -> (MemoryStore, Vec<Recno>) {
    let mut store = MemoryStore::new();
    let day = NaiveDate::from_ymd_opt(2024, 9, 21).expect("date");
    let imported = import_event(
        &mut store,
        &EventImport {
            name: "County Match".to_string(),
            startdate: day,
            enddate: day,
            sections: vec!["Board".to_string()],
            entries: names
                .iter()
                .enumerate()
                .map(|(i, name)| PlayerEntry {
                    name: name.to_string(),
                    section: "Board".to_string(),
                    pin: i as u32 + 1,
                    affiliation: None,
                    reported_codes: Vec::new(),
                })
                .collect(),
            origin: Origin::Local,
            pending_groups: Vec::new(),
        },
    )
    .expect("import");
    (store, imported.aliases)
}

fn seed_master(store: &mut MemoryStore, code: &str, name: &str, merged_into: Option<&str>) {
    let mut txn = Transaction::start(store).expect("start");
    txn.insert(&MasterPlayerRecord {
        code: code.to_string(),
        active: Some(true),
        merged_into: merged_into.map(str::to_string),
        name: Some(name.to_string()),
        club_codes: vec!["C123".to_string()],
    })
    .expect("insert master entry");
    txn.commit().expect("commit");
}

#[test]
fn unmerged_alias_cannot_be_bound() {
    let (mut store, a) = setup(&["Brown, A"]);

    let err = bind_master(&mut store, a[0], "123456A").expect_err("not a person");
    assert!(matches!(err, IdentityError::Precondition(_)));
    let err = bind_grading(&mut store, a[0], "123456A").expect_err("not a person");
    assert!(matches!(err, IdentityError::Precondition(_)));
}

#[test]
fn code_bound_to_one_person_only() {
    let (mut store, a) = setup(&["Brown, A", "Brown, Alan", "Green, B", "Green, Bob"]);
    merge(&mut store, a[0], &[a[1]]).expect("merge brown");
    merge(&mut store, a[2], &[a[3]]).expect("merge green");

    bind_master(&mut store, a[0], " 345678E ").expect("bind");
    assert_eq!(
        master_code_for_person(&store, a[0]).expect("code"),
        Some("345678E".to_string())
    );

    let err = bind_master(&mut store, a[2], "345678E").expect_err("taken");
    assert!(matches!(err, IdentityError::Precondition(_)));
    assert!(err.to_string().contains("Brown, A"), "{err}");

    let err = bind_master(&mut store, a[0], "111111A").expect_err("second binding");
    assert!(matches!(err, IdentityError::Precondition(_)));

    let err = bind_master(&mut store, a[2], "   ").expect_err("empty");
    assert!(matches!(err, IdentityError::Precondition(_)));
}

#[test]
fn master_binding_takes_catalogue_name() {
    let (mut store, a) = setup(&["Brown, A", "Brown, Alan"]);
    merge(&mut store, a[0], &[a[1]]).expect("merge");
    seed_master(&mut store, "345678E", "Brown, Alan J", None);

    let map_recno = bind_master(&mut store, a[0], "345678E").expect("bind");
    let map = store
        .fetch_required::<MasterMapRecord>(map_recno)
        .expect("map");
    assert_eq!(map.playerkey, a[0]);
    assert_eq!(map.playername, "Brown, A");
    assert_eq!(map.playerecfname.as_deref(), Some("Brown, Alan J"));
}

#[test]
fn new_registration_has_no_code() {
    let (mut store, a) = setup(&["Brown, A", "Brown, Alan"]);
    merge(&mut store, a[0], &[a[1]]).expect("merge");

    let err = register_new_master(&mut store, a[0], "  ").expect_err("empty name");
    assert!(matches!(err, IdentityError::Precondition(_)));

    register_new_master(&mut store, a[0], "Brown, Alan").expect("register");
    assert_eq!(master_code_for_person(&store, a[0]).expect("code"), None);
    let bindings = bindings_for(&store, a[0]).expect("bindings");
    assert_eq!(
        bindings.describe(),
        vec!["ECF master list registration as a new player".to_string()]
    );

    let err = bind_master(&mut store, a[0], "345678E").expect_err("already registered");
    assert!(matches!(err, IdentityError::Precondition(_)));
}

#[test]
fn unbind_then_rebind() {
    let (mut store, a) = setup(&["Brown, A", "Brown, Alan", "Green, B"]);
    merge(&mut store, a[0], &[a[1]]).expect("merge");
    bind_grading(&mut store, a[0], "123456A").expect("bind grading");

    assert_eq!(
        grading_code_for_person(&store, a[0]).expect("code"),
        Some("123456A".to_string())
    );
    let err = bind_grading(&mut store, a[0], "234567C").expect_err("second code");
    assert!(matches!(err, IdentityError::Precondition(_)));

    unbind_grading(&mut store, a[0]).expect("unbind");
    assert_eq!(grading_code_for_person(&store, a[0]).expect("code"), None);
    let err = unbind_grading(&mut store, a[0]).expect_err("nothing bound");
    assert!(matches!(err, IdentityError::Precondition(_)));
    let err = unbind_master(&mut store, a[0]).expect_err("nothing bound");
    assert!(matches!(err, IdentityError::Precondition(_)));

    bind_grading(&mut store, a[0], "234567C").expect("rebind");
    assert_eq!(
        grading_code_for_person(&store, a[0]).expect("code"),
        Some("234567C".to_string())
    );
}

#[test]
fn codes_are_looked_up_through_the_person() {
    let (mut store, a) = setup(&["Brown, A", "Brown, Alan", "Green, B"]);
    merge(&mut store, a[0], &[a[1]]).expect("merge");
    bind_master(&mut store, a[0], "345678E").expect("bind");

    assert_eq!(person_for_alias(&store, a[1]).expect("person"), Some(a[0]));
    assert_eq!(person_for_alias(&store, a[2]).expect("person"), None);
    assert_eq!(master_code_for_person(&store, a[2]).expect("code"), None);
}

#[test]
fn person_details_show_catalogue_state() {
    let (mut store, a) = setup(&["Brown, A", "Brown, Alan", "Green, B"]);
    merge(&mut store, a[0], &[a[1]]).expect("merge");
    seed_master(&mut store, "345678E", "Brown, Alan J", Some("456789H"));
    bind_master(&mut store, a[0], "345678E").expect("bind master");
    bind_grading(&mut store, a[0], "123456A").expect("bind grading");
    let mut txn = Transaction::start(&mut store).expect("start");
    txn.insert(&GradingPlayerRecord {
        code: "123456A".to_string(),
        name: Some("Brown, Alan".to_string()),
        clubs: vec!["Hastings".to_string()],
    })
    .expect("insert grading entry");
    txn.commit().expect("commit");

    let details = person_details(&store, a[1]).expect("details");
    assert_eq!(details.resolution, Resolution::Person(a[0]));
    assert_eq!(details.selected.name, "Brown, Alan");
    assert_eq!(
        details.representative.as_ref().map(|r| r.recno),
        Some(a[0])
    );
    assert_eq!(details.members.len(), 1);

    let master = details.master.expect("master binding");
    assert_eq!(master.code.as_deref(), Some("345678E"));
    assert_eq!(master.active, Some(true));
    assert_eq!(master.merged_into.as_deref(), Some("456789H"));
    let grading = details.grading.expect("grading binding");
    assert_eq!(grading.name.as_deref(), Some("Brown, Alan"));
    assert_eq!(grading.clubs, vec!["Hastings".to_string()]);

    let lone = person_details(&store, a[2]).expect("details");
    assert_eq!(lone.resolution, Resolution::Unidentified);
    assert!(lone.master.is_none());
    assert!(lone.members.is_empty());
}
