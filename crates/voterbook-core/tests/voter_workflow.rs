//! End-to-end workflow over the in-memory store: seed files on disk, user
//! approval, CSV import, scoped listing, export and dashboard counts.

use std::sync::Arc;

use voterbook_core::export::{parse_field_list, to_csv_string};
use voterbook_core::import::{parse_csv, ImportError};
use voterbook_core::models::{AppUser, LocationLevel, LocationPath, Role, VoterData, VoterField, VoterPatch};
use voterbook_core::repository::{RepositoryError, VOTERS_COLLECTION};
use voterbook_core::stats::{by_child_location, VoterStats};
use voterbook_core::{
    LocationHierarchy, MemoryStore, SmsCampaign, UserRepository, VoterFilter, VoterRepository,
};

const DIVISIONS: &str = r#"[{"id": 6, "name": "Dhaka", "bn_name": "ঢাকা"}, {"id": 1, "name": "Chattogram"}]"#;

const DISTRICTS: &str = r#"[
  {"type": "header", "version": "5.1"},
  {"type": "table", "name": "districts", "data": [
    {"id": "47", "division_id": "6", "name": "Dhaka"},
    {"id": "41", "division_id": "6", "name": "Gazipur"},
    {"id": "9", "division_id": "1", "name": "Chattogram"}
  ]}
]"#;

const UPAZILAS: &str = r#"[
  {"id": "367", "district_id": "47", "name": "Dhamrai"},
  {"id": "368", "district_id": "47", "name": "Savar"},
  {"id": "330", "district_id": "41", "name": "Kaliakair"}
]"#;

const UNIONS: &str = r#"[
  {"id": "3701", "upazila_id": "367", "name": "Kushura"},
  {"id": "3702", "upazila_id": "367", "name": "Sombhag"}
]"#;

const VOTERS_CSV: &str = "\
Voter Name,Age,Gender,Phone,Voting Intent,Division,District,Upazila,Union
Rahima Begum,34,female,01712345678,Yes,Dhaka,Dhaka,Dhamrai,Kushura
,40,Male,,,Dhaka,Dhaka,Dhamrai,Kushura
Abdul Karim,61,Male,8801811000000,undecided,Dhaka,Dhaka,Dhamrai,Sombhag
Nasima Akter,27,Female,,No,Dhaka,Gazipur,Kaliakair,
";

fn hierarchy() -> LocationHierarchy {
    let dir = tempfile::tempdir().unwrap();
    for (file, contents) in [
        ("divisions.json", DIVISIONS),
        ("districts.json", DISTRICTS),
        ("upazilas.json", UPAZILAS),
        ("unions.json", UNIONS),
    ] {
        std::fs::write(dir.path().join(file), contents).unwrap();
    }
    LocationHierarchy::load_dir(dir.path()).unwrap()
}

#[tokio::test]
async fn test_branch_workflow() {
    let hierarchy = Arc::new(hierarchy());
    assert_eq!(hierarchy.count(LocationLevel::Village), 0);

    let store = Arc::new(MemoryStore::new());
    let users = UserRepository::new(store.clone());
    let voters = VoterRepository::new(store.clone()).with_hierarchy(hierarchy.clone());

    let mut root = AppUser::new("root", "root@example.com", Role::SuperAdmin, LocationPath::default());
    root.approved = true;
    store.seed("users", "root", &root).unwrap();
    let admin = users.principal("root").await.unwrap();

    // A union admin signs up and cannot act until approved.
    users
        .register(
            "u-kushura",
            "kushura@example.com",
            Some("Kushura Desk"),
            Role::UnionAdmin,
            LocationPath::from_ids(&["6", "47", "367", "3701"]),
        )
        .await
        .unwrap();
    assert!(users.principal("u-kushura").await.is_err());
    users.approve(&admin, "u-kushura").await.unwrap();
    let union_admin = users.principal("u-kushura").await.unwrap();

    // Import: the nameless row is skipped, the rest are written in one batch.
    let report = voters.import_csv(&admin, VOTERS_CSV.as_bytes(), None).await.unwrap();
    assert_eq!(report.imported, 3);
    assert_eq!(report.skipped, vec![3]);
    assert_eq!(report.batches, 1);
    assert_eq!(store.len(VOTERS_COLLECTION), 3);

    // The union admin only sees Kushura.
    let mine = voters.list(&union_admin, &VoterFilter::default()).await.unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].voter_name, "Rahima Begum");
    assert_eq!(mine[0].gender.as_deref(), Some("Female"));
    assert_eq!(mine[0].phone.as_deref(), Some("01712345678"));

    // Out-of-scope import from the union admin writes nothing.
    let writes_before = store.write_count();
    let err = voters
        .import_csv(&union_admin, VOTERS_CSV.as_bytes(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, RepositoryError::Import(ImportError::Rejected(ref rows)) if rows.len() == 2));
    assert_eq!(store.write_count(), writes_before);

    // Update within scope.
    let patch = VoterPatch {
        priority_level: Some("High".to_string()),
        ..Default::default()
    };
    let updated = voters.update(&union_admin, &mine[0].id, &patch).await.unwrap();
    assert_eq!(updated.priority_level.as_deref(), Some("High"));

    // Export what the admin sees under Dhaka district and read it back.
    let filter = VoterFilter::at(LocationPath::from_ids(&["6", "47"]));
    let dhaka = voters.list(&admin, &filter).await.unwrap();
    assert_eq!(dhaka.len(), 2);
    let fields = parse_field_list("voter_name,age,voting_intent,priority_level,division,district,upazila,union").unwrap();
    let csv = to_csv_string(&dhaka, &fields, Some(&hierarchy)).unwrap();
    let plan = parse_csv(csv.as_bytes(), Some(&hierarchy), &LocationPath::default()).unwrap();
    assert!(plan.is_valid());
    for (row, voter) in plan.rows.iter().zip(&dhaka) {
        for field in &fields {
            assert_eq!(field.text(&row.voter), field.text(voter));
        }
    }

    let all = voters.list(&admin, &VoterFilter::default()).await.unwrap();
    let stats = VoterStats::compute(&all);
    assert_eq!(stats.total, 3);
    assert_eq!(stats.intent("Undecided"), 1);
    let upazilas = by_child_location(&all, &hierarchy, Some(LocationLevel::District), Some("47"));
    assert_eq!((upazilas[0].name.as_str(), upazilas[0].count), ("Dhamrai", 2));

    let campaign = SmsCampaign::draft("Vote on Friday", &all);
    assert_eq!(campaign.recipients.len(), 2);
    assert_eq!(campaign.skipped.len(), 1);

    // Delete and confirm it is gone.
    voters.delete(&union_admin, &mine[0].id).await.unwrap();
    assert_eq!(voters.count(&admin, &VoterFilter::default()).await.unwrap(), 2);
}

#[tokio::test]
async fn test_form_entries_are_stored_canonical_and_export_by_subset() {
    let hierarchy = Arc::new(hierarchy());
    let store = Arc::new(MemoryStore::new());
    let users = UserRepository::new(store.clone());
    let voters = VoterRepository::new(store.clone()).with_hierarchy(hierarchy.clone());

    let mut root = AppUser::new("root", "root@example.com", Role::SuperAdmin, LocationPath::default());
    root.approved = true;
    store.seed("users", "root", &root).unwrap();
    let admin = users.principal("root").await.unwrap();

    // Hand-entered values in mixed case and Bengali digits.
    let mut entry = VoterData::new("  Shirin Akter ", LocationPath::from_ids(&["6", "47", "368"]));
    entry.gender = Some("female".into());
    entry.voting_intent = Some("undecided".into());
    entry.phone = Some("+৮৮০ ১৭১২-৩৪৫৬৭৮".into());
    let created = voters.create(&admin, entry).await.unwrap();
    assert_eq!(created.voter_name, "Shirin Akter");
    assert_eq!(created.phone.as_deref(), Some("01712345678"));

    let filter = VoterFilter {
        gender: Some("Female".into()),
        voting_intent: Some("Undecided".into()),
        ..Default::default()
    };
    assert_eq!(voters.count(&admin, &filter).await.unwrap(), 1);

    let patch = VoterPatch {
        priority_level: Some("LOW".into()),
        ..Default::default()
    };
    let updated = voters.update(&admin, &created.id, &patch).await.unwrap();
    assert_eq!(updated.priority_level.as_deref(), Some("Low"));
    let low = VoterFilter {
        priority_level: Some("Low".into()),
        ..Default::default()
    };
    assert_eq!(voters.count(&admin, &low).await.unwrap(), 1);

    // A two-column selection still exports a file the importer accepts.
    let all = voters.list(&admin, &VoterFilter::default()).await.unwrap();
    let csv = to_csv_string(&all, &[VoterField::Phone, VoterField::Upazila], Some(&hierarchy)).unwrap();
    assert!(csv.starts_with("Voter Name,Phone,Division,District,Upazila\n"));
    let plan = parse_csv(csv.as_bytes(), Some(&hierarchy), &LocationPath::default()).unwrap();
    assert!(plan.is_valid(), "{:?}", plan.errors);
    assert_eq!(plan.rows[0].voter.voter_name, "Shirin Akter");
    assert_eq!(plan.rows[0].voter.location, LocationPath::from_ids(&["6", "47", "368"]));
}
