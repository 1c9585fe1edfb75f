use super::*;
use crate::error::ErrorKind;
use crate::identity::model::Account;
use crate::store::MemoryStore;
use chrono::Utc;

fn account(uuid: &str, t: AccountType) -> Account {
    Account {
        uuid: uuid.into(),
        name: format!("name-{}", uuid),
        description: None,
        password_hash: String::new(),
        account_type: t,
        created_at: Utc::now(),
    }
}

fn setup() -> (Arc<MemoryStore>, OwnershipResolver) {
    let store = Arc::new(MemoryStore::new());
    store.insert_account(account("admin", AccountType::SystemAdmin)).unwrap();
    store.insert_account(account("a", AccountType::Normal)).unwrap();
    store.insert_account(account("b", AccountType::Normal)).unwrap();
    let r = OwnershipResolver::new(store.clone(), &["VmInstance".to_string(), "Image".to_string()]);
    (store, r)
}

fn v(list: &[&str]) -> Vec<String> { list.iter().map(|s| s.to_string()).collect() }

#[test]
fn register_and_lookup_owner() {
    let (_s, r) = setup();
    r.register_ownership("a", "vm-1", "VmInstance").unwrap();
    assert_eq!(r.owner_of("vm-1").unwrap(), "a");
    assert_eq!(r.owner_of("vm-2").unwrap_err().kind(), ErrorKind::NotFound);
}

#[test]
fn register_refuses_untracked_type() {
    let (_s, r) = setup();
    let err = r.register_ownership("a", "z-1", "Zone").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
    assert!(!r.is_ownership_tracked("Zone"));
}

#[test]
fn second_owner_is_rejected() {
    let (_s, r) = setup();
    r.register_ownership("a", "vm-1", "VmInstance").unwrap();
    assert_eq!(r.register_ownership("b", "vm-1", "VmInstance").unwrap_err().kind(), ErrorKind::Internal);
    assert_eq!(r.owner_of("vm-1").unwrap(), "a");
}

#[test]
fn visibility_is_three_valued() {
    let (_s, r) = setup();
    r.register_ownership("a", "img-1", "Image").unwrap();
    r.register_ownership("a", "img-2", "Image").unwrap();
    r.share(&v(&["img-2"]), false, &v(&["b"])).unwrap();

    assert_eq!(r.visible_resources("admin", "Image").unwrap(), Visibility::Unrestricted);
    assert_eq!(r.visible_resources("a", "Image").unwrap(), Visibility::Restricted(["img-1", "img-2"].iter().map(|s| s.to_string()).collect()));
    let for_b = r.visible_resources("b", "Image").unwrap();
    assert!(for_b.allows("img-2"));
    assert!(!for_b.allows("img-1"));
    assert_eq!(r.visible_resources("b", "VmInstance").unwrap(), Visibility::None);
    assert_eq!(r.visible_resources("ghost", "Image").unwrap_err().kind(), ErrorKind::InvalidArgument);
}

#[test]
fn public_share_satisfies_plain_ref_only() {
    let (_s, r) = setup();
    r.register_ownership("a", "img-1", "Image").unwrap();
    r.share(&v(&["img-1"]), true, &[]).unwrap();

    assert!(r.check_field_ownership("b", &[ResourceRef::plain("imageUuid", v(&["img-1"]))]).is_ok());
    let err = r.check_field_ownership("b", &[ResourceRef::target("uuid", v(&["img-1"]))]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
    assert_eq!(
        err.message(),
        "operation denied. The resource[uuid: img-1, type: Image] doesn't belong to the account[uuid: b]"
    );
}

#[test]
fn same_uuid_as_plain_and_target_still_needs_ownership() {
    let (_s, r) = setup();
    r.register_ownership("a", "img-1", "Image").unwrap();
    r.share(&v(&["img-1"]), true, &[]).unwrap();
    let refs = [ResourceRef::plain("imageUuid", v(&["img-1"])), ResourceRef::target("uuid", v(&["img-1"]))];
    assert!(r.check_field_ownership("b", &refs).is_err());
}

#[test]
fn direct_share_only_helps_its_receiver() {
    let (store, r) = setup();
    store.insert_account(account("c", AccountType::Normal)).unwrap();
    r.register_ownership("a", "img-1", "Image").unwrap();
    r.share(&v(&["img-1"]), false, &v(&["b"])).unwrap();
    let refs = [ResourceRef::plain("imageUuid", v(&["img-1"]))];
    assert!(r.check_field_ownership("b", &refs).is_ok());
    assert!(r.check_field_ownership("c", &refs).is_err());
}

#[test]
fn owner_and_unrecorded_refs_pass() {
    let (_s, r) = setup();
    r.register_ownership("a", "vm-1", "VmInstance").unwrap();
    let refs = [ResourceRef::target("uuid", v(&["vm-1"])), ResourceRef::plain("l3NetworkUuids", v(&["unknown"]))];
    assert!(r.check_field_ownership("a", &refs).is_ok());
    assert!(r.check_field_ownership("a", &[]).is_ok());
}

#[test]
fn resharing_counts_only_new_records() {
    let (store, r) = setup();
    r.register_ownership("a", "img-1", "Image").unwrap();
    assert_eq!(r.share(&v(&["img-1"]), true, &[]).unwrap(), 1);
    assert_eq!(r.share(&v(&["img-1"]), true, &[]).unwrap(), 0);
    assert_eq!(r.share(&v(&["img-1"]), false, &v(&["b", "admin"])).unwrap(), 2);
    assert_eq!(r.share(&v(&["img-1"]), false, &v(&["b"])).unwrap(), 0);
    assert_eq!(store.shares_of(&v(&["img-1"])).unwrap().len(), 3);
}

#[test]
fn share_requires_known_owner() {
    let (_s, r) = setup();
    assert_eq!(r.share(&v(&["nothing"]), true, &[]).unwrap_err().kind(), ErrorKind::NotFound);
}

#[test]
fn revoke_variants() {
    let (store, r) = setup();
    r.register_ownership("a", "img-1", "Image").unwrap();
    r.share(&v(&["img-1"]), true, &[]).unwrap();
    r.share(&v(&["img-1"]), false, &v(&["b"])).unwrap();

    assert_eq!(r.revoke(&v(&["img-1"]), false, false, &v(&["b"])).unwrap(), 1);
    assert_eq!(store.shares_of(&v(&["img-1"])).unwrap().len(), 1);

    r.share(&v(&["img-1"]), false, &v(&["b"])).unwrap();
    assert_eq!(r.revoke(&v(&["img-1"]), true, false, &v(&["b"])).unwrap(), 2);
    assert!(store.shares_of(&v(&["img-1"])).unwrap().is_empty());

    r.share(&v(&["img-1"]), true, &[]).unwrap();
    r.share(&v(&["img-1"]), false, &v(&["b"])).unwrap();
    assert_eq!(r.revoke(&v(&["img-1"]), false, true, &[]).unwrap(), 2);
}

#[test]
fn account_removal_drops_shares_and_reassigns_resources() {
    let (store, r) = setup();
    r.register_ownership("a", "img-1", "Image").unwrap();
    r.register_ownership("b", "img-2", "Image").unwrap();
    r.share(&v(&["img-1"]), true, &[]).unwrap();
    r.share(&v(&["img-2"]), false, &v(&["a"])).unwrap();

    assert_eq!(r.on_account_deleted("a", "admin").unwrap(), (2, 1));
    store.delete_account("a").unwrap();

    assert_eq!(r.visible_resources("b", "Image").unwrap(), Visibility::Restricted(["img-2".to_string()].into_iter().collect()));
    assert_eq!(r.owner_of("img-1").unwrap(), "admin");
    let err = r.check_field_ownership("b", &[ResourceRef::plain("imageUuid", v(&["img-1"]))]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PermissionDenied);
}

#[test]
fn deleting_resources_cleans_records() {
    let (store, r) = setup();
    r.register_ownership("a", "img-1", "Image").unwrap();
    r.share(&v(&["img-1"]), true, &[]).unwrap();
    r.on_resources_deleted("Image", &v(&["img-1"])).unwrap();
    assert_eq!(r.owner_of("img-1").unwrap_err().kind(), ErrorKind::NotFound);
    assert!(store.shares_of(&v(&["img-1"])).unwrap().is_empty());
}
